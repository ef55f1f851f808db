//! Domain error types.

/// Machine-readable error category, reported next to the human message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Persistence,
    Validation,
    NotFound,
    Config,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Persistence => "persistence",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        }
    }
}

/// Top-level error type for stsserver.
#[derive(Debug, thiserror::Error)]
pub enum StsError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StsError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        StsError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StsError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StsError::Database { .. } | StsError::DatabaseQuery { .. } => ErrorKind::Persistence,
            StsError::Validation { .. } => ErrorKind::Validation,
            StsError::NotFound { .. } => ErrorKind::NotFound,
            StsError::ConfigParse { .. }
            | StsError::ConfigMissing { .. }
            | StsError::ConfigInvalid { .. } => ErrorKind::Config,
            StsError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<&StsError> for std::process::ExitCode {
    fn from(err: &StsError) -> Self {
        let code: u8 = match err.kind() {
            ErrorKind::Io => 1,
            ErrorKind::Config => 2,
            ErrorKind::Persistence => 3,
            ErrorKind::Validation => 4,
            ErrorKind::NotFound => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_taxonomy() {
        assert_eq!(
            StsError::DatabaseQuery { reason: "x".into() }.kind(),
            ErrorKind::Persistence
        );
        assert_eq!(
            StsError::validation("stockLimit", "not a number").kind(),
            ErrorKind::Validation
        );
        assert_eq!(StsError::not_found("stock", "600000").kind(), ErrorKind::NotFound);
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
    }

    #[test]
    fn messages_carry_cause() {
        let err = StsError::not_found("securities account", 42);
        assert_eq!(err.to_string(), "securities account 42 not found");

        let err = StsError::validation("privilege", "must be a non-negative integer");
        assert_eq!(
            err.to_string(),
            "invalid privilege: must be a non-negative integer"
        );
    }
}
