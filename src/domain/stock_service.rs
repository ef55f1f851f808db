//! Stock catalog queries and bulk updates.

use tracing::{info, warn};

use crate::domain::error::StsError;
use crate::domain::predicate::StockFilter;
use crate::domain::stock::{PriceLimit, Stock, StockState, parse_limit_percent};
use crate::ports::store_port::{StorePort, transact};

pub fn fetch_all_stock(store: &dyn StorePort) -> Result<Vec<Stock>, StsError> {
    fetch_certain_stock(store, &StockFilter::all())
}

pub fn fetch_certain_stock(
    store: &dyn StorePort,
    filter: &StockFilter,
) -> Result<Vec<Stock>, StsError> {
    transact(store, |gw| gw.select_stocks(filter))
}

pub fn fetch_one_stock(store: &dyn StorePort, code: &str) -> Result<Stock, StsError> {
    fetch_certain_stock(store, &StockFilter::by_code(code))?
        .into_iter()
        .next()
        .ok_or_else(|| StsError::not_found("stock", code))
}

pub fn update_stock(store: &dyn StorePort, stock: &Stock) -> Result<(), StsError> {
    update_stock_list(store, std::slice::from_ref(stock))
}

/// Overwrite every stock by code in one transaction.
pub fn update_stock_list(store: &dyn StorePort, stocks: &[Stock]) -> Result<(), StsError> {
    for stock in stocks {
        ensure_persistable(stock)?;
    }
    store.atomically(&mut |gw| {
        for stock in stocks {
            gw.update_stock(stock)?;
        }
        Ok(())
    })?;
    info!(count = stocks.len(), "stocks updated");
    Ok(())
}

/// Apply a state token (`stop`, `restore`, `stop3`) to every stock.
pub fn update_stock_list_state(
    store: &dyn StorePort,
    mut stocks: Vec<Stock>,
    token: &str,
) -> Result<(), StsError> {
    let state = StockState::from_token(token);
    if !state.is_valid() {
        warn!(token, "rejected unknown stock state token");
        return Err(StsError::validation(
            "newState",
            format!("unknown state token '{token}', expected stop, restore or stop3"),
        ));
    }
    for stock in &mut stocks {
        stock.state = state;
    }
    update_stock_list(store, &stocks)
}

/// Apply a percentage limit (or `-1` for none) to every stock.
pub fn update_stock_list_limit(
    store: &dyn StorePort,
    mut stocks: Vec<Stock>,
    percent: &str,
) -> Result<(), StsError> {
    let limit: PriceLimit = parse_limit_percent(percent).inspect_err(|_| {
        warn!(percent, "rejected price limit");
    })?;
    for stock in &mut stocks {
        stock.limit = limit;
    }
    update_stock_list(store, &stocks)
}

/// Insert new catalog rows in one transaction.
pub fn import_stocks(store: &dyn StorePort, stocks: &[Stock]) -> Result<usize, StsError> {
    for stock in stocks {
        ensure_persistable(stock)?;
    }
    store.atomically(&mut |gw| {
        for stock in stocks {
            gw.insert_stock(stock)?;
        }
        Ok(())
    })?;
    info!(count = stocks.len(), "stocks imported");
    Ok(stocks.len())
}

fn ensure_persistable(stock: &Stock) -> Result<(), StsError> {
    if stock.code.trim().is_empty() {
        return Err(StsError::validation("stockCode", "must not be empty"));
    }
    if !stock.state.is_valid() {
        return Err(StsError::validation(
            "stockState",
            format!("stock {} has no valid trading state", stock.code),
        ));
    }
    Ok(())
}
