//! Unified error type for the network model
//!
//! [`GridError`] covers everything that can go wrong while loading, saving
//! or mutating a [`crate::Network`]. Higher layers wrap it into their own
//! error enums with `#[from]`.

use thiserror::Error;

/// Error type for network model operations.
#[derive(Error, Debug)]
pub enum GridError {
    /// I/O errors (reading or writing network state)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors (dangling references, series length mismatch)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network structure errors (unknown component, missing line type)
    #[error("Network error: {0}")]
    Network(String),
}

/// Convenience type alias for Results using GridError.
pub type GridResult<T> = Result<T, GridError>;

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GridError::Network("line type 'Al/St 240/40' not found".into());
        assert!(err.to_string().contains("Network error"));
        assert!(err.to_string().contains("Al/St 240/40"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GridError = io_err.into();
        assert!(matches!(err, GridError::Io(_)));
    }

    #[test]
    fn test_json_error_is_parse() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: GridError = bad.into();
        assert!(matches!(err, GridError::Parse(_)));
    }

    #[test]
    fn test_every_variant_has_a_prefix() {
        let errors = [
            GridError::Io(std::io::Error::other("disk")),
            GridError::Parse("bad".into()),
            GridError::Validation("bad".into()),
            GridError::Network("bad".into()),
        ];
        for err in errors {
            let prefix = match &err {
                GridError::Io(_) => "I/O error",
                GridError::Parse(_) => "Parse error",
                GridError::Validation(_) => "Validation error",
                GridError::Network(_) => "Network error",
            };
            assert!(err.to_string().starts_with(prefix));
        }
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> GridResult<()> {
            Err(GridError::Validation("test".into()))
        }

        fn outer() -> GridResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
