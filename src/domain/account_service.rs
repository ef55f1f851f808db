//! Securities account provisioning and fund account linkage.
//!
//! Every operation here touches more than one table, so each runs as a single
//! store transaction.

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::domain::account::{
    CorporateAccount, FundAccount, OpenedAccount, PersonalAccount, SecuritiesKind,
};
use crate::domain::credentials::hash_password;
use crate::domain::error::StsError;
use crate::domain::predicate::{FundFilter, SecuritiesFilter};
use crate::ports::store_port::{Gateway, StorePort, transact};

/// Result of an interest accrual run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterestAccrual {
    pub rate: f64,
    pub accounts: usize,
    pub total: f64,
}

pub fn create_personal_account(
    store: &dyn StorePort,
    account: &PersonalAccount,
    fund_password: &str,
) -> Result<OpenedAccount, StsError> {
    let opened = open_account(store, fund_password, |gw, securities_id, today| {
        gw.insert_personal(&PersonalAccount {
            securities_id,
            open_date: Some(account.open_date.unwrap_or(today)),
            ..account.clone()
        })
    })?;
    info!(
        securities_id = opened.securities_id,
        fund_id = opened.fund_id,
        "personal account opened"
    );
    Ok(opened)
}

pub fn create_corporate_account(
    store: &dyn StorePort,
    account: &CorporateAccount,
    fund_password: &str,
) -> Result<OpenedAccount, StsError> {
    let opened = open_account(store, fund_password, |gw, securities_id, today| {
        gw.insert_corporate(&CorporateAccount {
            securities_id,
            open_date: Some(account.open_date.unwrap_or(today)),
            ..account.clone()
        })
    })?;
    info!(
        securities_id = opened.securities_id,
        fund_id = opened.fund_id,
        "corporate account opened"
    );
    Ok(opened)
}

fn open_account(
    store: &dyn StorePort,
    fund_password: &str,
    insert_securities: impl Fn(&dyn Gateway, i64, NaiveDate) -> Result<(), StsError>,
) -> Result<OpenedAccount, StsError> {
    let password_hash = hash_password(fund_password)?;
    let today = Utc::now().date_naive();

    transact(store, |gw| {
        gw.lock_account_ids()?;
        let securities_id = next_securities_id(gw)?;
        insert_securities(gw, securities_id, today)?;

        let fund_id = gw.max_fund_id()? + 1;
        gw.insert_fund(&FundAccount::opened(
            fund_id,
            securities_id,
            password_hash.clone(),
        ))?;

        Ok(OpenedAccount {
            securities_id,
            fund_id,
        })
    })
}

/// Securities ids are unique across personal and corporate accounts.
fn next_securities_id(gw: &dyn Gateway) -> Result<i64, StsError> {
    let personal = gw.max_securities_id(SecuritiesKind::Personal)?;
    let corporate = gw.max_securities_id(SecuritiesKind::Corporate)?;
    Ok(personal.max(corporate) + 1)
}

fn securities_kind_of(
    gw: &dyn Gateway,
    securities_id: i64,
) -> Result<Option<SecuritiesKind>, StsError> {
    let filter = SecuritiesFilter {
        securities_id: Some(securities_id),
    };
    if !gw.select_personal(&filter)?.is_empty() {
        return Ok(Some(SecuritiesKind::Personal));
    }
    if !gw.select_corporate(&filter)?.is_empty() {
        return Ok(Some(SecuritiesKind::Corporate));
    }
    Ok(None)
}

/// Re-key a securities account and move its fund accounts along with it.
///
/// Returns the number of fund accounts relinked.
pub fn alter_securities_id(
    store: &dyn StorePort,
    old_id: i64,
    new_id: i64,
) -> Result<usize, StsError> {
    if new_id <= 0 {
        return Err(StsError::validation(
            "securitiesId",
            format!("{new_id} is not a positive id"),
        ));
    }
    if old_id == new_id {
        return Err(StsError::validation(
            "securitiesId",
            "old and new ids are the same",
        ));
    }

    let moved = transact(store, |gw| {
        gw.lock_account_ids()?;
        let kind = securities_kind_of(gw, old_id)?
            .ok_or_else(|| StsError::not_found("securities account", old_id))?;
        if securities_kind_of(gw, new_id)?.is_some() {
            return Err(StsError::validation(
                "securitiesId",
                format!("{new_id} is already in use"),
            ));
        }
        gw.rekey_securities(kind, old_id, new_id)?;
        gw.relink_securities_id(old_id, new_id)
    })?;

    info!(old_id, new_id, moved, "securities id altered");
    Ok(moved)
}

/// Fund accounts joined to a securities account.
pub fn fund_accounts_of(
    store: &dyn StorePort,
    securities_id: i64,
) -> Result<Vec<FundAccount>, StsError> {
    transact(store, |gw| {
        let kind = securities_kind_of(gw, securities_id)?
            .ok_or_else(|| StsError::not_found("securities account", securities_id))?;

        let mut funds = Vec::new();
        for fund_id in gw.fund_ids_linked_to_securities(kind, securities_id)? {
            funds.extend(gw.select_funds(&FundFilter {
                fund_id: Some(fund_id),
                ..FundFilter::default()
            })?);
        }
        Ok(funds)
    })
}

/// Credit `balance * rate` to the interest of every active fund account.
pub fn accrue_interest(store: &dyn StorePort) -> Result<InterestAccrual, StsError> {
    let accrual = transact(store, |gw| {
        let rate = gw.get_rate()?;
        let active = gw.select_funds(&FundFilter {
            active_only: true,
            ..FundFilter::default()
        })?;

        let mut total = 0.0;
        for mut fund in active.iter().cloned() {
            let credit = fund.balance * rate;
            fund.interest += credit;
            total += credit;
            gw.update_fund(&fund)?;
        }
        Ok(InterestAccrual {
            rate,
            accounts: active.len(),
            total,
        })
    })?;

    info!(
        rate = accrual.rate,
        accounts = accrual.accounts,
        total = accrual.total,
        "interest accrued"
    );
    Ok(accrual)
}
