use thiserror::Error;

/// Error type for the alert cache.
///
/// Storage failures are surfaced to the immediate caller and never retried by
/// the store; retry policy belongs to whoever ingests alerts.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The durable medium is unavailable or rejected a write.
    #[error("Storage I/O failure: {0}")]
    IoFailure(String),

    /// The on-disk layout does not match what this build expects.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The caller cancelled a long-running read.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The background worker pool is gone or the task panicked.
    #[error("Alert store is closed: {0}")]
    Closed(String),
}

impl CacheError {
    /// Whether the error came from caller-initiated cancellation rather than
    /// a storage fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CacheError::Cancelled)
    }
}

impl From<toml::de::Error> for CacheError {
    fn from(err: toml::de::Error) -> Self {
        CacheError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CacheError {
    fn from(err: toml::ser::Error) -> Self {
        CacheError::Config(err.to_string())
    }
}

/// A specialized `Result` type for alert cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let cases: Vec<(CacheError, &str)> = vec![
            (
                CacheError::IoFailure("disk full".to_string()),
                "Storage I/O failure: disk full",
            ),
            (
                CacheError::SchemaMismatch("unknown version 7".to_string()),
                "Schema mismatch: unknown version 7",
            ),
            (CacheError::Cancelled, "Operation cancelled"),
            (
                CacheError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                CacheError::Closed("runtime shut down".to_string()),
                "Alert store is closed: runtime shut down",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: CacheError = io_err.into();
        match &err {
            CacheError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
            _ => panic!("Expected Io variant"),
        }
        assert!(err.to_string().starts_with("I/O error:"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let cache_err: CacheError = err.unwrap_err().into();
        assert!(matches!(cache_err, CacheError::Config(_)));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(CacheError::Cancelled.is_cancelled());
        assert!(!CacheError::IoFailure("x".into()).is_cancelled());
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
