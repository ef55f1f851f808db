//! SQLite store adapter.

use crate::domain::account::{CorporateAccount, FundAccount, PersonalAccount, SecuritiesKind};
use crate::domain::error::StsError;
use crate::domain::predicate::{
    FundFilter, Placeholder, SecuritiesFilter, SqlArg, SqlPredicate, StockFilter,
};
use crate::domain::stock::{PriceLimit, Stock, StockState};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{Gateway, StorePort};
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{ToSqlOutput, Type};
use rusqlite::{Connection, Row, ToSql, TransactionBehavior, params, params_from_iter};
use std::time::Duration;
use tracing::{debug, error};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS stock (
    stock_code TEXT PRIMARY KEY,
    stock_name TEXT NOT NULL,
    stock_price REAL NOT NULL DEFAULT 0,
    stock_last_close REAL NOT NULL DEFAULT 0,
    stock_volume INTEGER NOT NULL DEFAULT 0,
    stock_priv INTEGER NOT NULL CHECK (stock_priv >= 0),
    stock_state TEXT NOT NULL,
    stock_limit REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stock_priv ON stock(stock_priv);

CREATE TABLE IF NOT EXISTS personal_account (
    securities_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    gender TEXT NOT NULL,
    id_number TEXT NOT NULL UNIQUE,
    phone TEXT NOT NULL,
    address TEXT NOT NULL,
    occupation TEXT NOT NULL,
    education TEXT NOT NULL,
    work_unit TEXT NOT NULL,
    agent_id_number TEXT,
    open_date TEXT
);

CREATE TABLE IF NOT EXISTS corporate_account (
    securities_id INTEGER PRIMARY KEY,
    corporate_name TEXT NOT NULL,
    register_number TEXT NOT NULL UNIQUE,
    license_number TEXT NOT NULL,
    legal_person_name TEXT NOT NULL,
    legal_person_id_number TEXT NOT NULL,
    legal_person_phone TEXT NOT NULL,
    legal_person_address TEXT NOT NULL,
    authorizer_name TEXT NOT NULL,
    authorizer_id_number TEXT NOT NULL,
    authorizer_phone TEXT NOT NULL,
    authorizer_address TEXT NOT NULL,
    open_date TEXT
);

CREATE TABLE IF NOT EXISTS fund_account (
    fund_id INTEGER PRIMARY KEY,
    securities_id INTEGER NOT NULL,
    password TEXT NOT NULL,
    balance REAL NOT NULL DEFAULT 0,
    interest REAL NOT NULL DEFAULT 0,
    state INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_fund_securities ON fund_account(securities_id);

CREATE TABLE IF NOT EXISTS interest_rate (
    rate REAL NOT NULL
);";

const STOCK_COLUMNS: &str = "stock_code, stock_name, stock_price, stock_last_close, \
                             stock_volume, stock_priv, stock_state, stock_limit";

const PERSONAL_COLUMNS: &str = "securities_id, name, gender, id_number, phone, address, \
                                occupation, education, work_unit, agent_id_number, open_date";

const CORPORATE_COLUMNS: &str = "securities_id, corporate_name, register_number, license_number, \
                                 legal_person_name, legal_person_id_number, legal_person_phone, \
                                 legal_person_address, authorizer_name, authorizer_id_number, \
                                 authorizer_phone, authorizer_address, open_date";

const FUND_COLUMNS: &str = "fund_id, securities_id, password, balance, interest, state";

fn pool_error(e: r2d2::Error) -> StsError {
    error!(error = %e, "sqlite pool failure");
    StsError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> StsError {
    StsError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn conversion_error(column: usize, e: StsError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e))
}

impl ToSql for SqlArg {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlArg::Int(v) => v.to_sql(),
            SqlArg::Text(s) => s.to_sql(),
        }
    }
}

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StsError> {
        let db_path = config.require_string("sqlite", "path")?;
        let pool_size = config.get_int("sqlite", "pool_size", 4) as u32;
        let busy_timeout =
            Duration::from_millis(config.get_int("sqlite", "busy_timeout_ms", 5000) as u64);

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(move |conn| conn.busy_timeout(busy_timeout));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        debug!(path = %db_path, pool_size, "sqlite pool ready");
        Ok(Self { pool })
    }

    /// A private in-memory database. Single connection, since every SQLite
    /// memory connection is its own database.
    pub fn in_memory() -> Result<Self, StsError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>, StsError> {
        self.pool.get().map_err(pool_error)
    }

    /// Create all tables and seed the interest rate row when it is missing.
    pub fn initialize_schema(&self, interest_rate: f64) -> Result<(), StsError> {
        let conn = self.connection()?;
        conn.execute_batch(SCHEMA).map_err(query_error)?;
        conn.execute(
            "INSERT INTO interest_rate (rate)
             SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM interest_rate)",
            params![interest_rate],
        )
        .map_err(query_error)?;
        Ok(())
    }

    /// Run raw SQL outside any gateway operation (maintenance scripts, fixtures).
    pub fn execute_batch(&self, sql: &str) -> Result<(), StsError> {
        self.connection()?.execute_batch(sql).map_err(query_error)
    }
}

impl StorePort for SqliteStore {
    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn Gateway) -> Result<(), StsError>,
    ) -> Result<(), StsError> {
        let mut conn = self.connection()?;
        // IMMEDIATE takes the write lock up front, serializing max-id reads
        // with the inserts that follow them.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_error)?;

        let outcome = {
            let gw = SqliteGateway { conn: &tx };
            work(&gw)
        };

        match outcome {
            Ok(()) => tx.commit().map_err(query_error),
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    error!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

struct SqliteGateway<'c> {
    conn: &'c Connection,
}

impl SqliteGateway<'_> {
    fn select<T>(
        &self,
        columns: &str,
        table: &str,
        predicate: &SqlPredicate,
        order_by: &str,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StsError> {
        let sql = format!(
            "SELECT {columns} FROM {table}{} ORDER BY {order_by}",
            predicate.where_clause()
        );
        let mut stmt = self.conn.prepare(&sql).map_err(query_error)?;
        let rows = stmt
            .query_map(params_from_iter(predicate.args.iter()), map)
            .map_err(query_error)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(query_error)?);
        }
        Ok(out)
    }

    fn expect_one_row(
        affected: usize,
        entity: &'static str,
        key: impl ToString,
    ) -> Result<(), StsError> {
        if affected == 0 {
            Err(StsError::not_found(entity, key))
        } else {
            Ok(())
        }
    }

    fn max_of(&self, column: &str, table: &str) -> Result<i64, StsError> {
        let max: Option<i64> = self
            .conn
            .query_row(&format!("SELECT MAX({column}) FROM {table}"), [], |row| {
                row.get(0)
            })
            .map_err(query_error)?;
        Ok(max.unwrap_or(0))
    }
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn parse_date(row: &Row<'_>, column: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| {
        NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
            conversion_error(column, StsError::validation("openDate", e.to_string()))
        })
    })
    .transpose()
}

fn stock_from_row(row: &Row<'_>) -> rusqlite::Result<Stock> {
    let privilege: i64 = row.get(5)?;
    let state: String = row.get(6)?;
    let limit: f64 = row.get(7)?;
    Ok(Stock {
        code: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
        last_close: row.get(3)?,
        volume: row.get(4)?,
        privilege: u32::try_from(privilege).map_err(|_| {
            conversion_error(
                5,
                StsError::validation("stockPriv", format!("{privilege} out of range")),
            )
        })?,
        state: state
            .parse::<StockState>()
            .map_err(|e| conversion_error(6, e))?,
        limit: PriceLimit::try_from(limit).map_err(|e| conversion_error(7, e))?,
    })
}

fn personal_from_row(row: &Row<'_>) -> rusqlite::Result<PersonalAccount> {
    Ok(PersonalAccount {
        securities_id: row.get(0)?,
        name: row.get(1)?,
        gender: row.get(2)?,
        id_number: row.get(3)?,
        phone: row.get(4)?,
        address: row.get(5)?,
        occupation: row.get(6)?,
        education: row.get(7)?,
        work_unit: row.get(8)?,
        agent_id_number: row.get(9)?,
        open_date: parse_date(row, 10)?,
    })
}

fn corporate_from_row(row: &Row<'_>) -> rusqlite::Result<CorporateAccount> {
    Ok(CorporateAccount {
        securities_id: row.get(0)?,
        corporate_name: row.get(1)?,
        register_number: row.get(2)?,
        license_number: row.get(3)?,
        legal_person_name: row.get(4)?,
        legal_person_id_number: row.get(5)?,
        legal_person_phone: row.get(6)?,
        legal_person_address: row.get(7)?,
        authorizer_name: row.get(8)?,
        authorizer_id_number: row.get(9)?,
        authorizer_phone: row.get(10)?,
        authorizer_address: row.get(11)?,
        open_date: parse_date(row, 12)?,
    })
}

fn fund_from_row(row: &Row<'_>) -> rusqlite::Result<FundAccount> {
    Ok(FundAccount {
        fund_id: row.get(0)?,
        securities_id: row.get(1)?,
        password: row.get(2)?,
        balance: row.get(3)?,
        interest: row.get(4)?,
        active: row.get(5)?,
    })
}

impl Gateway for SqliteGateway<'_> {
    fn insert_stock(&self, stock: &Stock) -> Result<(), StsError> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO stock ({STOCK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    stock.code,
                    stock.name,
                    stock.price,
                    stock.last_close,
                    stock.volume,
                    stock.privilege,
                    stock.state.as_str(),
                    f64::from(stock.limit),
                ],
            )
            .map_err(query_error)?;
        Ok(())
    }

    fn update_stock(&self, stock: &Stock) -> Result<(), StsError> {
        let affected = self
            .conn
            .execute(
                "UPDATE stock SET stock_name = ?1, stock_price = ?2, stock_last_close = ?3,
                        stock_volume = ?4, stock_priv = ?5, stock_state = ?6, stock_limit = ?7
                 WHERE stock_code = ?8",
                params![
                    stock.name,
                    stock.price,
                    stock.last_close,
                    stock.volume,
                    stock.privilege,
                    stock.state.as_str(),
                    f64::from(stock.limit),
                    stock.code,
                ],
            )
            .map_err(query_error)?;
        Self::expect_one_row(affected, "stock", &stock.code)
    }

    fn delete_stock(&self, code: &str) -> Result<bool, StsError> {
        let affected = self
            .conn
            .execute("DELETE FROM stock WHERE stock_code = ?1", params![code])
            .map_err(query_error)?;
        Ok(affected > 0)
    }

    fn select_stocks(&self, filter: &StockFilter) -> Result<Vec<Stock>, StsError> {
        self.select(
            STOCK_COLUMNS,
            "stock",
            &filter.to_predicate(Placeholder::Question),
            "stock_code",
            stock_from_row,
        )
    }

    fn insert_personal(&self, account: &PersonalAccount) -> Result<(), StsError> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO personal_account ({PERSONAL_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    account.securities_id,
                    account.name,
                    account.gender,
                    account.id_number,
                    account.phone,
                    account.address,
                    account.occupation,
                    account.education,
                    account.work_unit,
                    account.agent_id_number,
                    format_date(account.open_date),
                ],
            )
            .map_err(query_error)?;
        Ok(())
    }

    fn update_personal(&self, account: &PersonalAccount) -> Result<(), StsError> {
        let affected = self
            .conn
            .execute(
                "UPDATE personal_account SET name = ?1, gender = ?2, id_number = ?3, phone = ?4,
                        address = ?5, occupation = ?6, education = ?7, work_unit = ?8,
                        agent_id_number = ?9, open_date = ?10
                 WHERE securities_id = ?11",
                params![
                    account.name,
                    account.gender,
                    account.id_number,
                    account.phone,
                    account.address,
                    account.occupation,
                    account.education,
                    account.work_unit,
                    account.agent_id_number,
                    format_date(account.open_date),
                    account.securities_id,
                ],
            )
            .map_err(query_error)?;
        Self::expect_one_row(affected, "personal account", account.securities_id)
    }

    fn delete_personal(&self, securities_id: i64) -> Result<bool, StsError> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM personal_account WHERE securities_id = ?1",
                params![securities_id],
            )
            .map_err(query_error)?;
        Ok(affected > 0)
    }

    fn select_personal(
        &self,
        filter: &SecuritiesFilter,
    ) -> Result<Vec<PersonalAccount>, StsError> {
        self.select(
            PERSONAL_COLUMNS,
            "personal_account",
            &filter.to_predicate(Placeholder::Question),
            "securities_id",
            personal_from_row,
        )
    }

    fn insert_corporate(&self, account: &CorporateAccount) -> Result<(), StsError> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO corporate_account ({CORPORATE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    account.securities_id,
                    account.corporate_name,
                    account.register_number,
                    account.license_number,
                    account.legal_person_name,
                    account.legal_person_id_number,
                    account.legal_person_phone,
                    account.legal_person_address,
                    account.authorizer_name,
                    account.authorizer_id_number,
                    account.authorizer_phone,
                    account.authorizer_address,
                    format_date(account.open_date),
                ],
            )
            .map_err(query_error)?;
        Ok(())
    }

    fn update_corporate(&self, account: &CorporateAccount) -> Result<(), StsError> {
        let affected = self
            .conn
            .execute(
                "UPDATE corporate_account SET corporate_name = ?1, register_number = ?2,
                        license_number = ?3, legal_person_name = ?4, legal_person_id_number = ?5,
                        legal_person_phone = ?6, legal_person_address = ?7, authorizer_name = ?8,
                        authorizer_id_number = ?9, authorizer_phone = ?10,
                        authorizer_address = ?11, open_date = ?12
                 WHERE securities_id = ?13",
                params![
                    account.corporate_name,
                    account.register_number,
                    account.license_number,
                    account.legal_person_name,
                    account.legal_person_id_number,
                    account.legal_person_phone,
                    account.legal_person_address,
                    account.authorizer_name,
                    account.authorizer_id_number,
                    account.authorizer_phone,
                    account.authorizer_address,
                    format_date(account.open_date),
                    account.securities_id,
                ],
            )
            .map_err(query_error)?;
        Self::expect_one_row(affected, "corporate account", account.securities_id)
    }

    fn delete_corporate(&self, securities_id: i64) -> Result<bool, StsError> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM corporate_account WHERE securities_id = ?1",
                params![securities_id],
            )
            .map_err(query_error)?;
        Ok(affected > 0)
    }

    fn select_corporate(
        &self,
        filter: &SecuritiesFilter,
    ) -> Result<Vec<CorporateAccount>, StsError> {
        self.select(
            CORPORATE_COLUMNS,
            "corporate_account",
            &filter.to_predicate(Placeholder::Question),
            "securities_id",
            corporate_from_row,
        )
    }

    fn insert_fund(&self, account: &FundAccount) -> Result<(), StsError> {
        self.conn
            .execute(
                &format!("INSERT INTO fund_account ({FUND_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    account.fund_id,
                    account.securities_id,
                    account.password,
                    account.balance,
                    account.interest,
                    account.active,
                ],
            )
            .map_err(query_error)?;
        Ok(())
    }

    fn update_fund(&self, account: &FundAccount) -> Result<(), StsError> {
        let affected = self
            .conn
            .execute(
                "UPDATE fund_account SET securities_id = ?1, password = ?2, balance = ?3,
                        interest = ?4, state = ?5
                 WHERE fund_id = ?6",
                params![
                    account.securities_id,
                    account.password,
                    account.balance,
                    account.interest,
                    account.active,
                    account.fund_id,
                ],
            )
            .map_err(query_error)?;
        Self::expect_one_row(affected, "fund account", account.fund_id)
    }

    fn delete_fund(&self, fund_id: i64) -> Result<bool, StsError> {
        let affected = self
            .conn
            .execute("DELETE FROM fund_account WHERE fund_id = ?1", params![fund_id])
            .map_err(query_error)?;
        Ok(affected > 0)
    }

    fn select_funds(&self, filter: &FundFilter) -> Result<Vec<FundAccount>, StsError> {
        self.select(
            FUND_COLUMNS,
            "fund_account",
            &filter.to_predicate(Placeholder::Question),
            "fund_id",
            fund_from_row,
        )
    }

    fn max_securities_id(&self, kind: SecuritiesKind) -> Result<i64, StsError> {
        self.max_of("securities_id", kind.table())
    }

    fn max_fund_id(&self) -> Result<i64, StsError> {
        self.max_of("fund_id", "fund_account")
    }

    fn fund_ids_linked_to_securities(
        &self,
        kind: SecuritiesKind,
        securities_id: i64,
    ) -> Result<Vec<i64>, StsError> {
        let sql = format!(
            "SELECT fund_id FROM {} INNER JOIN fund_account USING (securities_id)
             WHERE securities_id = ?1 ORDER BY fund_id",
            kind.table()
        );
        let mut stmt = self.conn.prepare(&sql).map_err(query_error)?;
        let rows = stmt
            .query_map(params![securities_id], |row| row.get(0))
            .map_err(query_error)?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(query_error)?);
        }
        Ok(ids)
    }

    fn relink_securities_id(&self, old_id: i64, new_id: i64) -> Result<usize, StsError> {
        self.conn
            .execute(
                "UPDATE fund_account SET securities_id = ?1 WHERE securities_id = ?2",
                params![new_id, old_id],
            )
            .map_err(query_error)
    }

    fn rekey_securities(
        &self,
        kind: SecuritiesKind,
        old_id: i64,
        new_id: i64,
    ) -> Result<(), StsError> {
        let affected = self
            .conn
            .execute(
                &format!(
                    "UPDATE {} SET securities_id = ?1 WHERE securities_id = ?2",
                    kind.table()
                ),
                params![new_id, old_id],
            )
            .map_err(query_error)?;
        Self::expect_one_row(affected, "securities account", old_id)
    }

    fn get_rate(&self) -> Result<f64, StsError> {
        let mut stmt = self
            .conn
            .prepare("SELECT rate FROM interest_rate")
            .map_err(query_error)?;
        let rates = stmt
            .query_map([], |row| row.get::<_, f64>(0))
            .map_err(query_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;

        match rates.as_slice() {
            [rate] => Ok(*rate),
            other => Err(StsError::DatabaseQuery {
                reason: format!(
                    "expected exactly one interest_rate row, found {}",
                    other.len()
                ),
            }),
        }
    }

    fn lock_account_ids(&self) -> Result<(), StsError> {
        // Already held: every transaction here begins IMMEDIATE.
        Ok(())
    }
}
