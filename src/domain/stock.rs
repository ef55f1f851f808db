//! Stock catalog records: trading state and price limit.

use crate::domain::error::StsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading status of a stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockState {
    Normal,
    Suspended,
    #[serde(rename = "suspended_3_days")]
    SuspendedThreeDays,
    /// Produced by an unrecognised state token; never written to the store.
    Invalid,
}

impl StockState {
    /// Map a short request token onto a state.
    ///
    /// `stop` suspends, `restore` resumes, `stop3` suspends for three days.
    /// Anything else yields [`StockState::Invalid`].
    pub fn from_token(token: &str) -> Self {
        match token {
            "stop" => StockState::Suspended,
            "restore" => StockState::Normal,
            "stop3" => StockState::SuspendedThreeDays,
            _ => StockState::Invalid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockState::Normal => "normal",
            StockState::Suspended => "suspended",
            StockState::SuspendedThreeDays => "suspended_3_days",
            StockState::Invalid => "invalid",
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, StockState::Invalid)
    }
}

impl fmt::Display for StockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockState {
    type Err = StsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(StockState::Normal),
            "suspended" => Ok(StockState::Suspended),
            "suspended_3_days" => Ok(StockState::SuspendedThreeDays),
            "invalid" => Ok(StockState::Invalid),
            other => Err(StsError::validation(
                "stockState",
                format!("unknown state '{other}'"),
            )),
        }
    }
}

/// Bound on daily price movement.
///
/// Stored and serialized as a plain number where `-1` means no limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum PriceLimit {
    NoLimit,
    Fraction(f64),
}

pub const NO_LIMIT_SENTINEL: f64 = -1.0;

/// `-1` is the only accepted negative; fractions must be finite.
impl TryFrom<f64> for PriceLimit {
    type Error = StsError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value == NO_LIMIT_SENTINEL {
            Ok(PriceLimit::NoLimit)
        } else if value.is_finite() && value >= 0.0 {
            Ok(PriceLimit::Fraction(value))
        } else {
            Err(StsError::validation(
                "stockLimit",
                format!("{value} must be a non-negative fraction or -1"),
            ))
        }
    }
}

impl From<PriceLimit> for f64 {
    fn from(limit: PriceLimit) -> Self {
        match limit {
            PriceLimit::NoLimit => NO_LIMIT_SENTINEL,
            PriceLimit::Fraction(f) => f,
        }
    }
}

/// Parse a percentage path segment into a price limit.
///
/// `"-1"` clears the limit; any other finite non-negative number is divided
/// by 100.
pub fn parse_limit_percent(raw: &str) -> Result<PriceLimit, StsError> {
    let trimmed = raw.trim();
    let value: f64 = trimmed.parse().map_err(|_| {
        StsError::validation("stockLimit", format!("'{raw}' is not a number"))
    })?;
    if value == NO_LIMIT_SENTINEL {
        return Ok(PriceLimit::NoLimit);
    }
    if !value.is_finite() || value < 0.0 {
        return Err(StsError::validation(
            "stockLimit",
            format!("'{raw}' must be a non-negative percentage or -1"),
        ));
    }
    Ok(PriceLimit::Fraction(value / 100.0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    #[serde(rename = "stockCode")]
    pub code: String,
    #[serde(rename = "stockName")]
    pub name: String,
    #[serde(rename = "stockPrice", default)]
    pub price: f64,
    #[serde(rename = "stockLastClose", default)]
    pub last_close: f64,
    #[serde(rename = "stockVolume", default)]
    pub volume: i64,
    #[serde(rename = "stockPriv")]
    pub privilege: u32,
    #[serde(rename = "stockState")]
    pub state: StockState,
    #[serde(rename = "stockLimit")]
    pub limit: PriceLimit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn tokens_map_to_states() {
        assert_eq!(StockState::from_token("stop"), StockState::Suspended);
        assert_eq!(StockState::from_token("restore"), StockState::Normal);
        assert_eq!(StockState::from_token("stop3"), StockState::SuspendedThreeDays);
        assert_eq!(StockState::from_token("STOP"), StockState::Invalid);
        assert_eq!(StockState::from_token(""), StockState::Invalid);
    }

    #[test]
    fn state_round_trips_through_column_text() {
        for state in [
            StockState::Normal,
            StockState::Suspended,
            StockState::SuspendedThreeDays,
            StockState::Invalid,
        ] {
            assert_eq!(state.as_str().parse::<StockState>().unwrap(), state);
        }
        assert!("halted".parse::<StockState>().is_err());
    }

    #[test]
    fn limit_minus_one_clears() {
        assert_eq!(parse_limit_percent("-1").unwrap(), PriceLimit::NoLimit);
    }

    #[test]
    fn limit_percent_becomes_fraction() {
        match parse_limit_percent("10").unwrap() {
            PriceLimit::Fraction(f) => assert_relative_eq!(f, 0.1),
            other => panic!("expected fraction, got {other:?}"),
        }
        match parse_limit_percent("0").unwrap() {
            PriceLimit::Fraction(f) => assert_relative_eq!(f, 0.0),
            other => panic!("expected fraction, got {other:?}"),
        }
    }

    #[test]
    fn limit_rejects_garbage() {
        for raw in ["abc", "", "-5", "NaN", "inf", "10%"] {
            let err = parse_limit_percent(raw).unwrap_err();
            assert!(matches!(err, StsError::Validation { .. }), "{raw}: {err}");
        }
    }

    #[test]
    fn stock_json_uses_wire_names() {
        let json = r#"{"stockCode":"600000","stockName":"PF Bank","stockPrice":10.5,
            "stockLastClose":10.2,"stockVolume":1000,"stockPriv":2,
            "stockState":"suspended_3_days","stockLimit":-1}"#;
        let stock: Stock = serde_json::from_str(json).unwrap();
        assert_eq!(stock.code, "600000");
        assert_eq!(stock.state, StockState::SuspendedThreeDays);
        assert_eq!(stock.limit, PriceLimit::NoLimit);

        let back = serde_json::to_value(&stock).unwrap();
        assert_eq!(back["stockLimit"], serde_json::json!(-1.0));
        assert_eq!(back["stockPriv"], serde_json::json!(2));
    }

    #[test]
    fn limit_number_accepts_sentinel_and_fractions() {
        assert_eq!(PriceLimit::try_from(-1.0).unwrap(), PriceLimit::NoLimit);
        assert_eq!(PriceLimit::try_from(0.0).unwrap(), PriceLimit::Fraction(0.0));
        assert_eq!(PriceLimit::try_from(0.1).unwrap(), PriceLimit::Fraction(0.1));
    }

    #[test]
    fn limit_number_rejects_other_negatives() {
        for value in [-0.5, -5.0, -1.5, f64::NAN, f64::INFINITY] {
            let err = PriceLimit::try_from(value).unwrap_err();
            assert!(matches!(err, StsError::Validation { .. }), "{value}: {err}");
        }
    }

    #[test]
    fn negative_limit_in_json_is_rejected() {
        let json = r#"{"stockCode":"600000","stockName":"PF Bank","stockPriv":1,
            "stockState":"normal","stockLimit":-0.5}"#;
        let err = serde_json::from_str::<Stock>(json).unwrap_err();
        assert!(err.to_string().contains("stockLimit"), "{err}");
    }

    proptest! {
        #[test]
        fn any_percent_in_range_divides_by_100(p in 0u32..=10_000u32) {
            let percent = p as f64 / 100.0;
            match parse_limit_percent(&percent.to_string()).unwrap() {
                PriceLimit::Fraction(f) => prop_assert!((f - percent / 100.0).abs() < 1e-12),
                PriceLimit::NoLimit => prop_assert!(false, "unexpected no-limit"),
            }
        }

        #[test]
        fn unknown_tokens_are_invalid(token in "[a-z0-9]{0,8}") {
            prop_assume!(!["stop", "restore", "stop3"].contains(&token.as_str()));
            prop_assert_eq!(StockState::from_token(&token), StockState::Invalid);
        }
    }
}
