//! CSV stock catalog reader.
//!
//! Expected header: `code,name,price,last_close,volume,privilege,state,limit`.
//! `state` uses the stored names (`normal`, `suspended`, `suspended_3_days`);
//! `limit` is a fraction, or `-1` for no limit.

use crate::domain::error::StsError;
use crate::domain::stock::{PriceLimit, Stock, StockState};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

const COLUMNS: [&str; 8] = [
    "code",
    "name",
    "price",
    "last_close",
    "volume",
    "privilege",
    "state",
    "limit",
];

pub struct CsvStockReader {
    path: PathBuf,
}

impl CsvStockReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read_stocks(&self) -> Result<Vec<Stock>, StsError> {
        let content = fs::read_to_string(&self.path)?;
        let stocks = parse_stocks(&content)?;
        debug!(path = %self.path.display(), rows = stocks.len(), "stock csv read");
        Ok(stocks)
    }
}

/// Parse catalog rows from CSV text. Line numbers in errors count the header.
pub fn parse_stocks(content: &str) -> Result<Vec<Stock>, StsError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| StsError::validation("csv", e.to_string()))?;
    if headers.len() != COLUMNS.len() || headers.iter().zip(COLUMNS).any(|(h, c)| h != c) {
        return Err(StsError::validation(
            "csv",
            format!("header must be {}", COLUMNS.join(",")),
        ));
    }

    let mut stocks = Vec::new();
    for (index, result) in rdr.records().enumerate() {
        let line = index + 2;
        let record = result.map_err(|e| StsError::validation("csv", e.to_string()))?;
        let field = |column: usize| record.get(column).unwrap_or_default();

        let code = field(0).to_string();
        if code.is_empty() {
            return Err(StsError::validation(
                format!("line {line} code"),
                "must not be empty",
            ));
        }

        let state_name = field(6);
        let state = state_name
            .parse::<StockState>()
            .ok()
            .filter(StockState::is_valid)
            .ok_or_else(|| {
                StsError::validation(
                    format!("line {line} state"),
                    format!("unknown state '{state_name}'"),
                )
            })?;

        stocks.push(Stock {
            code,
            name: field(1).to_string(),
            price: parse_column(field(2), line, "price")?,
            last_close: parse_column(field(3), line, "last_close")?,
            volume: parse_column(field(4), line, "volume")?,
            privilege: parse_column(field(5), line, "privilege")?,
            state,
            limit: PriceLimit::try_from(parse_column::<f64>(field(7), line, "limit")?)
                .map_err(|e| StsError::validation(format!("line {line} limit"), e.to_string()))?,
        });
    }

    Ok(stocks)
}

fn parse_column<T>(raw: &str, line: usize, column: &str) -> Result<T, StsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| {
        StsError::validation(format!("line {line} {column}"), format!("'{raw}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CATALOG: &str = "code,name,price,last_close,volume,privilege,state,limit\n\
        600000,PF Bank,10.5,10.2,120000,1,normal,0.1\n\
        600001,Handan Steel,4.2,4.3,90000,3,suspended,-1\n";

    #[test]
    fn parses_catalog_rows() {
        let stocks = parse_stocks(CATALOG).unwrap();
        assert_eq!(stocks.len(), 2);
        assert_eq!(stocks[0].code, "600000");
        assert_eq!(stocks[0].name, "PF Bank");
        assert_eq!(stocks[0].volume, 120000);
        assert_eq!(stocks[0].limit, PriceLimit::Fraction(0.1));
        assert_eq!(stocks[1].state, StockState::Suspended);
        assert_eq!(stocks[1].privilege, 3);
        assert_eq!(stocks[1].limit, PriceLimit::NoLimit);
    }

    #[test]
    fn rejects_wrong_header() {
        let err = parse_stocks("code,name\n600000,PF Bank\n").unwrap_err();
        assert!(matches!(err, StsError::Validation { .. }));
    }

    #[test]
    fn reports_line_of_bad_value() {
        let content = "code,name,price,last_close,volume,privilege,state,limit\n\
            600000,PF Bank,ten,10.2,1,1,normal,0.1\n";
        match parse_stocks(content) {
            Err(StsError::Validation { field, .. }) => assert_eq!(field, "line 2 price"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_state() {
        let content = "code,name,price,last_close,volume,privilege,state,limit\n\
            600000,PF Bank,1,1,1,1,invalid,0.1\n";
        assert!(parse_stocks(content).is_err());
    }

    #[test]
    fn negative_privilege_rejected() {
        let content = "code,name,price,last_close,volume,privilege,state,limit\n\
            600000,PF Bank,1,1,1,-2,normal,0.1\n";
        assert!(parse_stocks(content).is_err());
    }

    #[test]
    fn negative_limit_other_than_minus_one_rejected() {
        let content = "code,name,price,last_close,volume,privilege,state,limit\n\
            600000,PF Bank,1,1,1,1,normal,-5\n";
        match parse_stocks(content) {
            Err(StsError::Validation { field, .. }) => assert_eq!(field, "line 2 limit"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn reads_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.csv");
        fs::write(&path, CATALOG).unwrap();
        let stocks = CsvStockReader::new(&path).read_stocks().unwrap();
        assert_eq!(stocks.len(), 2);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let reader = CsvStockReader::new(dir.path().join("absent.csv"));
        assert!(matches!(reader.read_stocks(), Err(StsError::Io(_))));
    }
}
