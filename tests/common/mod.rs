#![allow(dead_code)]

use chrono::NaiveDate;
use stsserver::adapters::sqlite_adapter::SqliteStore;
use stsserver::domain::account::{CorporateAccount, PersonalAccount};
use stsserver::domain::stock::{PriceLimit, Stock, StockState};
use stsserver::domain::stock_service;
use stsserver::ports::store_port::StorePort;
use std::io::Write;

pub const SEED_RATE: f64 = 0.0035;

pub fn make_stock(code: &str, name: &str, privilege: u32) -> Stock {
    Stock {
        code: code.to_string(),
        name: name.to_string(),
        price: 10.0,
        last_close: 9.8,
        volume: 100_000,
        privilege,
        state: StockState::Normal,
        limit: PriceLimit::Fraction(0.1),
    }
}

/// Four listings across three privilege levels.
pub fn sample_stocks() -> Vec<Stock> {
    vec![
        make_stock("600000", "PF Bank", 1),
        make_stock("600001", "Handan Steel", 2),
        make_stock("600036", "CM Bank", 3),
        make_stock("000001", "100% Bank", 1),
    ]
}

pub fn personal_account(name: &str, id_number: &str) -> PersonalAccount {
    PersonalAccount {
        securities_id: 0,
        name: name.to_string(),
        gender: "F".to_string(),
        id_number: id_number.to_string(),
        phone: "13800000000".to_string(),
        address: "Hangzhou".to_string(),
        occupation: "engineer".to_string(),
        education: "bachelor".to_string(),
        work_unit: "ZJU".to_string(),
        agent_id_number: None,
        open_date: None,
    }
}

pub fn corporate_account(name: &str, register_number: &str) -> CorporateAccount {
    CorporateAccount {
        securities_id: 0,
        corporate_name: name.to_string(),
        register_number: register_number.to_string(),
        license_number: format!("LIC-{register_number}"),
        legal_person_name: "Wang Wu".to_string(),
        legal_person_id_number: "330106198001010022".to_string(),
        legal_person_phone: "13900000000".to_string(),
        legal_person_address: "Shanghai".to_string(),
        authorizer_name: "Zhao Liu".to_string(),
        authorizer_id_number: "330106198501010033".to_string(),
        authorizer_phone: "13700000000".to_string(),
        authorizer_address: "Shanghai".to_string(),
        open_date: Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
    }
}

/// In-memory store with the schema in place and no rows besides the rate.
pub fn empty_store() -> SqliteStore {
    let store = SqliteStore::in_memory().unwrap();
    store.initialize_schema(SEED_RATE).unwrap();
    store
}

/// In-memory store holding [`sample_stocks`].
pub fn seeded_store() -> SqliteStore {
    let store = empty_store();
    stock_service::import_stocks(&store as &dyn StorePort, &sample_stocks()).unwrap();
    store
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn codes(stocks: &[Stock]) -> Vec<&str> {
    stocks.iter().map(|s| s.code.as_str()).collect()
}
