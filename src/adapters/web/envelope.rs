//! Response envelope and request body decoding.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::error::StsError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultInfo {
    pub success: bool,
    pub message: Option<String>,
    /// Machine-readable error category, absent on success.
    pub kind: Option<String>,
}

/// `{"result": {...}, "data": ...}`, the body of every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub result: ResultInfo,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            result: ResultInfo {
                success: true,
                message: None,
                kind: None,
            },
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    /// Success with no payload.
    pub fn done() -> Self {
        Self {
            result: ResultInfo {
                success: true,
                message: None,
                kind: None,
            },
            data: None,
        }
    }

    pub fn failure(err: &StsError) -> Self {
        Self {
            result: ResultInfo {
                success: false,
                message: Some(err.to_string()),
                kind: Some(err.kind().as_str().to_string()),
            },
            data: None,
        }
    }
}

/// Decode a request body sent as a JSON string literal wrapping the payload.
///
/// The wire body `"{\"stockCode\":\"600000\"}"` decodes to the JSON document
/// `{"stockCode":"600000"}`, which is then parsed as `T`. A body that is not a
/// single string literal is rejected.
pub fn unwrap_double_encoded<T: DeserializeOwned>(body: &[u8]) -> Result<T, StsError> {
    let inner: String = serde_json::from_slice(body).map_err(|e| {
        StsError::validation("body", format!("expected a JSON string literal: {e}"))
    })?;
    serde_json::from_str(&inner)
        .map_err(|e| StsError::validation("body", format!("malformed payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stock::{PriceLimit, Stock, StockState};

    #[test]
    fn unwraps_string_payload() {
        let code: String = unwrap_double_encoded(br#""\"600000\"""#).unwrap();
        assert_eq!(code, "600000");
    }

    #[test]
    fn unwraps_record_payload() {
        let body = serde_json::to_string(
            r#"{"stockCode":"600000","stockName":"PF Bank","stockPriv":1,
                "stockState":"normal","stockLimit":0.1}"#,
        )
        .unwrap();
        let stock: Stock = unwrap_double_encoded(body.as_bytes()).unwrap();
        assert_eq!(stock.code, "600000");
        assert_eq!(stock.state, StockState::Normal);
        assert_eq!(stock.limit, PriceLimit::Fraction(0.1));
    }

    #[test]
    fn bare_json_is_rejected() {
        let err = unwrap_double_encoded::<String>(br#"{"stockCode":"600000"}"#).unwrap_err();
        assert!(matches!(err, StsError::Validation { .. }));
    }

    #[test]
    fn inner_garbage_is_rejected() {
        let err = unwrap_double_encoded::<Vec<Stock>>(br#""[{oops""#).unwrap_err();
        assert!(err.to_string().contains("malformed payload"));
    }

    #[test]
    fn failure_carries_kind_and_message() {
        let env = Envelope::failure(&StsError::not_found("stock", "600999"));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["result"]["success"], false);
        assert_eq!(json["result"]["kind"], "not_found");
        assert_eq!(json["result"]["message"], "stock 600999 not found");
        assert!(json["data"].is_null());
    }

    #[test]
    fn done_has_null_data() {
        let json = serde_json::to_value(Envelope::done()).unwrap();
        assert_eq!(json["result"]["success"], true);
        assert!(json["result"]["message"].is_null());
        assert!(json["data"].is_null());
    }
}
