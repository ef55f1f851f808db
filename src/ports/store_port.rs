//! Persistence port: per-entity gateway operations run inside a transaction.

use crate::domain::account::{CorporateAccount, FundAccount, PersonalAccount, SecuritiesKind};
use crate::domain::error::StsError;
use crate::domain::predicate::{FundFilter, SecuritiesFilter, StockFilter};
use crate::domain::stock::Stock;

/// Row-level operations against the backing store.
///
/// Every method runs on the connection of the enclosing transaction. Updates
/// report [`StsError::NotFound`] when no row matched; deletes of an absent key
/// return `Ok(false)`.
pub trait Gateway {
    fn insert_stock(&self, stock: &Stock) -> Result<(), StsError>;
    fn update_stock(&self, stock: &Stock) -> Result<(), StsError>;
    fn delete_stock(&self, code: &str) -> Result<bool, StsError>;
    fn select_stocks(&self, filter: &StockFilter) -> Result<Vec<Stock>, StsError>;

    fn insert_personal(&self, account: &PersonalAccount) -> Result<(), StsError>;
    fn update_personal(&self, account: &PersonalAccount) -> Result<(), StsError>;
    fn delete_personal(&self, securities_id: i64) -> Result<bool, StsError>;
    fn select_personal(&self, filter: &SecuritiesFilter)
    -> Result<Vec<PersonalAccount>, StsError>;

    fn insert_corporate(&self, account: &CorporateAccount) -> Result<(), StsError>;
    fn update_corporate(&self, account: &CorporateAccount) -> Result<(), StsError>;
    fn delete_corporate(&self, securities_id: i64) -> Result<bool, StsError>;
    fn select_corporate(
        &self,
        filter: &SecuritiesFilter,
    ) -> Result<Vec<CorporateAccount>, StsError>;

    fn insert_fund(&self, account: &FundAccount) -> Result<(), StsError>;
    fn update_fund(&self, account: &FundAccount) -> Result<(), StsError>;
    fn delete_fund(&self, fund_id: i64) -> Result<bool, StsError>;
    fn select_funds(&self, filter: &FundFilter) -> Result<Vec<FundAccount>, StsError>;

    /// Largest securities id in one table, 0 when empty.
    fn max_securities_id(&self, kind: SecuritiesKind) -> Result<i64, StsError>;
    /// Largest fund id, 0 when empty.
    fn max_fund_id(&self) -> Result<i64, StsError>;

    /// Fund ids joined to a securities row of the given kind.
    fn fund_ids_linked_to_securities(
        &self,
        kind: SecuritiesKind,
        securities_id: i64,
    ) -> Result<Vec<i64>, StsError>;
    /// Point every fund account on `old_id` at `new_id`; returns rows moved.
    fn relink_securities_id(&self, old_id: i64, new_id: i64) -> Result<usize, StsError>;
    /// Change the primary key of a securities row.
    fn rekey_securities(
        &self,
        kind: SecuritiesKind,
        old_id: i64,
        new_id: i64,
    ) -> Result<(), StsError>;

    /// The singleton interest rate. Zero or several rows is an error.
    fn get_rate(&self) -> Result<f64, StsError>;

    /// Serialize id assignment with other writers until the transaction ends.
    fn lock_account_ids(&self) -> Result<(), StsError>;
}

/// A pooled store able to run gateway work atomically.
pub trait StorePort: Send + Sync {
    /// Run `work` in one transaction: commit on `Ok`, roll back on `Err`.
    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn Gateway) -> Result<(), StsError>,
    ) -> Result<(), StsError>;
}

/// [`StorePort::atomically`] for work that produces a value.
pub fn transact<T>(
    store: &dyn StorePort,
    mut work: impl FnMut(&dyn Gateway) -> Result<T, StsError>,
) -> Result<T, StsError> {
    let mut out = None;
    store.atomically(&mut |gw| {
        out = Some(work(gw)?);
        Ok(())
    })?;
    out.ok_or_else(|| StsError::Database {
        reason: "transaction committed without producing a result".into(),
    })
}
