//! Securities and fund account records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which securities table an id lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecuritiesKind {
    Personal,
    Corporate,
}

impl SecuritiesKind {
    pub fn table(&self) -> &'static str {
        match self {
            SecuritiesKind::Personal => "personal_account",
            SecuritiesKind::Corporate => "corporate_account",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalAccount {
    /// Assigned on creation; any value sent by the client is ignored.
    #[serde(default)]
    pub securities_id: i64,
    pub name: String,
    pub gender: String,
    pub id_number: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub education: String,
    #[serde(default)]
    pub work_unit: String,
    #[serde(default)]
    pub agent_id_number: Option<String>,
    #[serde(default)]
    pub open_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorporateAccount {
    #[serde(default)]
    pub securities_id: i64,
    pub corporate_name: String,
    pub register_number: String,
    pub license_number: String,
    pub legal_person_name: String,
    pub legal_person_id_number: String,
    pub legal_person_phone: String,
    pub legal_person_address: String,
    pub authorizer_name: String,
    pub authorizer_id_number: String,
    pub authorizer_phone: String,
    pub authorizer_address: String,
    #[serde(default)]
    pub open_date: Option<NaiveDate>,
}

/// Cash ledger linked to one securities account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundAccount {
    pub fund_id: i64,
    pub securities_id: i64,
    /// argon2 PHC string.
    #[serde(skip_serializing, default)]
    pub password: String,
    pub balance: f64,
    pub interest: f64,
    #[serde(rename = "state")]
    pub active: bool,
}

impl FundAccount {
    /// A freshly provisioned ledger: empty and active.
    pub fn opened(fund_id: i64, securities_id: i64, password_hash: String) -> Self {
        Self {
            fund_id,
            securities_id,
            password: password_hash,
            balance: 0.0,
            interest: 0.0,
            active: true,
        }
    }
}

/// Body of `/securities/new/personal`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPersonalAccount {
    #[serde(flatten)]
    pub account: PersonalAccount,
    #[serde(rename = "fundPassword")]
    pub fund_password: String,
}

/// Body of `/securities/new/corporate`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCorporateAccount {
    #[serde(flatten)]
    pub account: CorporateAccount,
    #[serde(rename = "fundPassword")]
    pub fund_password: String,
}

/// Ids handed out by an account creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedAccount {
    pub securities_id: i64,
    pub fund_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_personal_account_reads_flattened_body() {
        let json = r#"{"name":"Li Lei","gender":"M","idNumber":"110101199001010011",
            "phone":"13800000000","address":"Beijing","fundPassword":"s3cret"}"#;
        let req: NewPersonalAccount = serde_json::from_str(json).unwrap();
        assert_eq!(req.account.name, "Li Lei");
        assert_eq!(req.account.securities_id, 0);
        assert_eq!(req.account.agent_id_number, None);
        assert_eq!(req.fund_password, "s3cret");
    }

    #[test]
    fn fund_password_is_never_serialized() {
        let fund = FundAccount::opened(3, 7, "$argon2id$v=19$...".into());
        let value = serde_json::to_value(&fund).unwrap();
        assert!(value.get("password").is_none());
        assert_eq!(value["state"], serde_json::json!(true));
        assert_eq!(value["fundId"], serde_json::json!(3));
    }
}
