//! PostgreSQL store adapter.

use crate::domain::account::{CorporateAccount, FundAccount, PersonalAccount, SecuritiesKind};
use crate::domain::error::StsError;
use crate::domain::predicate::{
    FundFilter, Placeholder, SecuritiesFilter, SqlArg, SqlPredicate, StockFilter,
};
use crate::domain::stock::{PriceLimit, Stock, StockState};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{Gateway, StorePort};
use postgres::types::ToSql;
use postgres::{NoTls, Row, Transaction};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use std::cell::RefCell;
use tracing::{debug, error};

/// Key for the transaction-scoped advisory lock guarding id assignment.
const ACCOUNT_ID_LOCK: i64 = 0x5354_5341;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS stock (
    stock_code TEXT PRIMARY KEY,
    stock_name TEXT NOT NULL,
    stock_price DOUBLE PRECISION NOT NULL DEFAULT 0,
    stock_last_close DOUBLE PRECISION NOT NULL DEFAULT 0,
    stock_volume BIGINT NOT NULL DEFAULT 0,
    stock_priv BIGINT NOT NULL CHECK (stock_priv >= 0),
    stock_state TEXT NOT NULL,
    stock_limit DOUBLE PRECISION NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stock_priv ON stock(stock_priv);

CREATE TABLE IF NOT EXISTS personal_account (
    securities_id BIGINT PRIMARY KEY,
    name TEXT NOT NULL,
    gender TEXT NOT NULL,
    id_number TEXT NOT NULL UNIQUE,
    phone TEXT NOT NULL,
    address TEXT NOT NULL,
    occupation TEXT NOT NULL,
    education TEXT NOT NULL,
    work_unit TEXT NOT NULL,
    agent_id_number TEXT,
    open_date DATE
);

CREATE TABLE IF NOT EXISTS corporate_account (
    securities_id BIGINT PRIMARY KEY,
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
    open_date DATE
);

CREATE TABLE IF NOT EXISTS fund_account (
    fund_id BIGINT PRIMARY KEY,
    securities_id BIGINT NOT NULL,
    password TEXT NOT NULL,
    balance DOUBLE PRECISION NOT NULL DEFAULT 0,
    interest DOUBLE PRECISION NOT NULL DEFAULT 0,
    state BOOLEAN NOT NULL DEFAULT TRUE
);
CREATE INDEX IF NOT EXISTS idx_fund_securities ON fund_account(securities_id);

CREATE TABLE IF NOT EXISTS interest_rate (
    rate DOUBLE PRECISION NOT NULL
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
    error!(error = %e, "postgres pool failure");
    StsError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: postgres::Error) -> StsError {
    StsError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn bind(args: &[SqlArg]) -> Vec<&(dyn ToSql + Sync)> {
    args.iter()
        .map(|arg| match arg {
            SqlArg::Int(v) => v as &(dyn ToSql + Sync),
            SqlArg::Text(s) => s as &(dyn ToSql + Sync),
        })
        .collect()
}

pub struct PostgresStore {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StsError> {
        let connection_string = config.require_string("postgres", "connection_string")?;
        let pool_size = config.get_int("postgres", "pool_size", 8) as u32;

        let pg_config = connection_string
            .parse::<postgres::Config>()
            .map_err(|e| StsError::ConfigInvalid {
                section: "postgres".into(),
                key: "connection_string".into(),
                reason: e.to_string(),
            })?;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        debug!(pool_size, "postgres pool ready");
        Ok(Self { pool })
    }

    pub fn initialize_schema(&self, interest_rate: f64) -> Result<(), StsError> {
        let mut client = self.pool.get().map_err(pool_error)?;
        client.batch_execute(SCHEMA).map_err(query_error)?;
        client
            .execute(
                "INSERT INTO interest_rate (rate)
                 SELECT $1 WHERE NOT EXISTS (SELECT 1 FROM interest_rate)",
                &[&interest_rate],
            )
            .map_err(query_error)?;
        Ok(())
    }
}

impl StorePort for PostgresStore {
    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn Gateway) -> Result<(), StsError>,
    ) -> Result<(), StsError> {
        let mut client = self.pool.get().map_err(pool_error)?;
        let tx = client.transaction().map_err(query_error)?;

        let gw = PostgresGateway {
            tx: RefCell::new(tx),
        };
        let outcome = work(&gw);
        let tx = gw.tx.into_inner();

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

struct PostgresGateway<'c> {
    tx: RefCell<Transaction<'c>>,
}

impl PostgresGateway<'_> {
    fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64, StsError> {
        self.tx
            .borrow_mut()
            .execute(sql, params)
            .map_err(query_error)
    }

    fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>, StsError> {
        self.tx.borrow_mut().query(sql, params).map_err(query_error)
    }

    fn select<T>(
        &self,
        columns: &str,
        table: &str,
        predicate: &SqlPredicate,
        order_by: &str,
        map: fn(&Row) -> Result<T, StsError>,
    ) -> Result<Vec<T>, StsError> {
        let sql = format!(
            "SELECT {columns} FROM {table}{} ORDER BY {order_by}",
            predicate.where_clause()
        );
        self.query(&sql, &bind(&predicate.args))?
            .iter()
            .map(map)
            .collect()
    }

    fn expect_one_row(
        affected: u64,
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
        let rows = self.query(&format!("SELECT MAX({column}) FROM {table}"), &[])?;
        let max: Option<i64> = match rows.first() {
            Some(row) => row.try_get(0).map_err(query_error)?,
            None => None,
        };
        Ok(max.unwrap_or(0))
    }
}

fn stock_from_row(row: &Row) -> Result<Stock, StsError> {
    let privilege: i64 = row.try_get(5).map_err(query_error)?;
    let state: String = row.try_get(6).map_err(query_error)?;
    let limit: f64 = row.try_get(7).map_err(query_error)?;
    Ok(Stock {
        code: row.try_get(0).map_err(query_error)?,
        name: row.try_get(1).map_err(query_error)?,
        price: row.try_get(2).map_err(query_error)?,
        last_close: row.try_get(3).map_err(query_error)?,
        volume: row.try_get(4).map_err(query_error)?,
        privilege: u32::try_from(privilege).map_err(|_| StsError::DatabaseQuery {
            reason: format!("stock_priv {privilege} out of range"),
        })?,
        state: state.parse::<StockState>()?,
        limit: PriceLimit::try_from(limit)?,
    })
}

fn personal_from_row(row: &Row) -> Result<PersonalAccount, StsError> {
    Ok(PersonalAccount {
        securities_id: row.try_get(0).map_err(query_error)?,
        name: row.try_get(1).map_err(query_error)?,
        gender: row.try_get(2).map_err(query_error)?,
        id_number: row.try_get(3).map_err(query_error)?,
        phone: row.try_get(4).map_err(query_error)?,
        address: row.try_get(5).map_err(query_error)?,
        occupation: row.try_get(6).map_err(query_error)?,
        education: row.try_get(7).map_err(query_error)?,
        work_unit: row.try_get(8).map_err(query_error)?,
        agent_id_number: row.try_get(9).map_err(query_error)?,
        open_date: row.try_get(10).map_err(query_error)?,
    })
}

fn corporate_from_row(row: &Row) -> Result<CorporateAccount, StsError> {
    Ok(CorporateAccount {
        securities_id: row.try_get(0).map_err(query_error)?,
        corporate_name: row.try_get(1).map_err(query_error)?,
        register_number: row.try_get(2).map_err(query_error)?,
        license_number: row.try_get(3).map_err(query_error)?,
        legal_person_name: row.try_get(4).map_err(query_error)?,
        legal_person_id_number: row.try_get(5).map_err(query_error)?,
        legal_person_phone: row.try_get(6).map_err(query_error)?,
        legal_person_address: row.try_get(7).map_err(query_error)?,
        authorizer_name: row.try_get(8).map_err(query_error)?,
        authorizer_id_number: row.try_get(9).map_err(query_error)?,
        authorizer_phone: row.try_get(10).map_err(query_error)?,
        authorizer_address: row.try_get(11).map_err(query_error)?,
        open_date: row.try_get(12).map_err(query_error)?,
    })
}

fn fund_from_row(row: &Row) -> Result<FundAccount, StsError> {
    Ok(FundAccount {
        fund_id: row.try_get(0).map_err(query_error)?,
        securities_id: row.try_get(1).map_err(query_error)?,
        password: row.try_get(2).map_err(query_error)?,
        balance: row.try_get(3).map_err(query_error)?,
        interest: row.try_get(4).map_err(query_error)?,
        active: row.try_get(5).map_err(query_error)?,
    })
}

impl Gateway for PostgresGateway<'_> {
    fn insert_stock(&self, stock: &Stock) -> Result<(), StsError> {
        self.execute(
            &format!("INSERT INTO stock ({STOCK_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"),
            &[
                &stock.code,
                &stock.name,
                &stock.price,
                &stock.last_close,
                &stock.volume,
                &i64::from(stock.privilege),
                &stock.state.as_str(),
                &f64::from(stock.limit),
            ],
        )?;
        Ok(())
    }

    fn update_stock(&self, stock: &Stock) -> Result<(), StsError> {
        let affected = self.execute(
            "UPDATE stock SET stock_name = $1, stock_price = $2, stock_last_close = $3,
                    stock_volume = $4, stock_priv = $5, stock_state = $6, stock_limit = $7
             WHERE stock_code = $8",
            &[
                &stock.name,
                &stock.price,
                &stock.last_close,
                &stock.volume,
                &i64::from(stock.privilege),
                &stock.state.as_str(),
                &f64::from(stock.limit),
                &stock.code,
            ],
        )?;
        Self::expect_one_row(affected, "stock", &stock.code)
    }

    fn delete_stock(&self, code: &str) -> Result<bool, StsError> {
        Ok(self.execute("DELETE FROM stock WHERE stock_code = $1", &[&code])? > 0)
    }

    fn select_stocks(&self, filter: &StockFilter) -> Result<Vec<Stock>, StsError> {
        self.select(
            STOCK_COLUMNS,
            "stock",
            &filter.to_predicate(Placeholder::Dollar),
            "stock_code",
            stock_from_row,
        )
    }

    fn insert_personal(&self, account: &PersonalAccount) -> Result<(), StsError> {
        self.execute(
            &format!(
                "INSERT INTO personal_account ({PERSONAL_COLUMNS})
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
            ),
            &[
                &account.securities_id,
                &account.name,
                &account.gender,
                &account.id_number,
                &account.phone,
                &account.address,
                &account.occupation,
                &account.education,
                &account.work_unit,
                &account.agent_id_number,
                &account.open_date,
            ],
        )?;
        Ok(())
    }

    fn update_personal(&self, account: &PersonalAccount) -> Result<(), StsError> {
        let affected = self.execute(
            "UPDATE personal_account SET name = $1, gender = $2, id_number = $3, phone = $4,
                    address = $5, occupation = $6, education = $7, work_unit = $8,
                    agent_id_number = $9, open_date = $10
             WHERE securities_id = $11",
            &[
                &account.name,
                &account.gender,
                &account.id_number,
                &account.phone,
                &account.address,
                &account.occupation,
                &account.education,
                &account.work_unit,
                &account.agent_id_number,
                &account.open_date,
                &account.securities_id,
            ],
        )?;
        Self::expect_one_row(affected, "personal account", account.securities_id)
    }

    fn delete_personal(&self, securities_id: i64) -> Result<bool, StsError> {
        Ok(self.execute(
            "DELETE FROM personal_account WHERE securities_id = $1",
            &[&securities_id],
        )? > 0)
    }

    fn select_personal(
        &self,
        filter: &SecuritiesFilter,
    ) -> Result<Vec<PersonalAccount>, StsError> {
        self.select(
            PERSONAL_COLUMNS,
            "personal_account",
            &filter.to_predicate(Placeholder::Dollar),
            "securities_id",
            personal_from_row,
        )
    }

    fn insert_corporate(&self, account: &CorporateAccount) -> Result<(), StsError> {
        self.execute(
            &format!(
                "INSERT INTO corporate_account ({CORPORATE_COLUMNS})
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
            ),
            &[
                &account.securities_id,
                &account.corporate_name,
                &account.register_number,
                &account.license_number,
                &account.legal_person_name,
                &account.legal_person_id_number,
                &account.legal_person_phone,
                &account.legal_person_address,
                &account.authorizer_name,
                &account.authorizer_id_number,
                &account.authorizer_phone,
                &account.authorizer_address,
                &account.open_date,
            ],
        )?;
        Ok(())
    }

    fn update_corporate(&self, account: &CorporateAccount) -> Result<(), StsError> {
        let affected = self.execute(
            "UPDATE corporate_account SET corporate_name = $1, register_number = $2,
                    license_number = $3, legal_person_name = $4, legal_person_id_number = $5,
                    legal_person_phone = $6, legal_person_address = $7, authorizer_name = $8,
                    authorizer_id_number = $9, authorizer_phone = $10,
                    authorizer_address = $11, open_date = $12
             WHERE securities_id = $13",
            &[
                &account.corporate_name,
                &account.register_number,
                &account.license_number,
                &account.legal_person_name,
                &account.legal_person_id_number,
                &account.legal_person_phone,
                &account.legal_person_address,
                &account.authorizer_name,
                &account.authorizer_id_number,
                &account.authorizer_phone,
                &account.authorizer_address,
                &account.open_date,
                &account.securities_id,
            ],
        )?;
        Self::expect_one_row(affected, "corporate account", account.securities_id)
    }

    fn delete_corporate(&self, securities_id: i64) -> Result<bool, StsError> {
        Ok(self.execute(
            "DELETE FROM corporate_account WHERE securities_id = $1",
            &[&securities_id],
        )? > 0)
    }

    fn select_corporate(
        &self,
        filter: &SecuritiesFilter,
    ) -> Result<Vec<CorporateAccount>, StsError> {
        self.select(
            CORPORATE_COLUMNS,
            "corporate_account",
            &filter.to_predicate(Placeholder::Dollar),
            "securities_id",
            corporate_from_row,
        )
    }

    fn insert_fund(&self, account: &FundAccount) -> Result<(), StsError> {
        self.execute(
            &format!("INSERT INTO fund_account ({FUND_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"),
            &[
                &account.fund_id,
                &account.securities_id,
                &account.password,
                &account.balance,
                &account.interest,
                &account.active,
            ],
        )?;
        Ok(())
    }

    fn update_fund(&self, account: &FundAccount) -> Result<(), StsError> {
        let affected = self.execute(
            "UPDATE fund_account SET securities_id = $1, password = $2, balance = $3,
                    interest = $4, state = $5
             WHERE fund_id = $6",
            &[
                &account.securities_id,
                &account.password,
                &account.balance,
                &account.interest,
                &account.active,
                &account.fund_id,
            ],
        )?;
        Self::expect_one_row(affected, "fund account", account.fund_id)
    }

    fn delete_fund(&self, fund_id: i64) -> Result<bool, StsError> {
        Ok(self.execute("DELETE FROM fund_account WHERE fund_id = $1", &[&fund_id])? > 0)
    }

    fn select_funds(&self, filter: &FundFilter) -> Result<Vec<FundAccount>, StsError> {
        self.select(
            FUND_COLUMNS,
            "fund_account",
            &filter.to_predicate(Placeholder::Dollar),
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
             WHERE securities_id = $1 ORDER BY fund_id",
            kind.table()
        );
        self.query(&sql, &[&securities_id])?
            .iter()
            .map(|row| row.try_get(0).map_err(query_error))
            .collect()
    }

    fn relink_securities_id(&self, old_id: i64, new_id: i64) -> Result<usize, StsError> {
        let moved = self.execute(
            "UPDATE fund_account SET securities_id = $1 WHERE securities_id = $2",
            &[&new_id, &old_id],
        )?;
        Ok(moved as usize)
    }

    fn rekey_securities(
        &self,
        kind: SecuritiesKind,
        old_id: i64,
        new_id: i64,
    ) -> Result<(), StsError> {
        let affected = self.execute(
            &format!(
                "UPDATE {} SET securities_id = $1 WHERE securities_id = $2",
                kind.table()
            ),
            &[&new_id, &old_id],
        )?;
        Self::expect_one_row(affected, "securities account", old_id)
    }

    fn get_rate(&self) -> Result<f64, StsError> {
        let rows = self.query("SELECT rate FROM interest_rate", &[])?;
        match rows.as_slice() {
            [row] => row.try_get(0).map_err(query_error),
            other => Err(StsError::DatabaseQuery {
                reason: format!(
                    "expected exactly one interest_rate row, found {}",
                    other.len()
                ),
            }),
        }
    }

    fn lock_account_ids(&self) -> Result<(), StsError> {
        self.execute("SELECT pg_advisory_xact_lock($1)", &[&ACCOUNT_ID_LOCK])?;
        Ok(())
    }
}
