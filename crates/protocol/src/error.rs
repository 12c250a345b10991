//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering malformed or incomplete request bodies.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A required field was missing or empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Two paths that must differ were identical.
    #[error("Paths cannot be the same")]
    SamePath,
}

/// Result type alias using ProtocolError.
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ProtocolError::MissingField("fromPath").to_string(),
            "fromPath is required"
        );
        assert_eq!(ProtocolError::SamePath.to_string(), "Paths cannot be the same");
    }
}
