//! Unified error types for the GSD ecosystem
//!
//! This module provides a common error type [`GsdError`] that can represent
//! errors from any part of the system. Domain-specific error types can be
//! converted to `GsdError` for uniform error handling at API boundaries.
//!
//! # Example
//!
//! ```ignore
//! use gsd_core::{GsdError, GsdResult};
//!
//! fn screen_measurements(set: &MeasurementSet) -> GsdResult<()> {
//!     let id = set.find(kind, element).ok_or_else(|| {
//!         GsdError::Validation("no such measurement".into())
//!     })?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all GSD operations.
///
/// This enum provides a common error representation for the diagnostics
/// pipeline, allowing errors from configuration, measurement validation,
/// estimation, and manifest I/O to be handled uniformly.
#[derive(Error, Debug)]
pub enum GsdError {
    /// I/O errors (manifest files, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Measurement or input data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// External estimator errors (non-convergence, alignment failures)
    #[error("Estimation error: {0}")]
    Estimation(String),

    /// Detector/analyzer configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Observability violations (redundancy or coverage loss)
    #[error("Observability error: {0}")]
    Unobservable(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using GsdError.
pub type GsdResult<T> = Result<T, GsdError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for GsdError {
    fn from(err: anyhow::Error) -> Self {
        GsdError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for GsdError {
    fn from(s: String) -> Self {
        GsdError::Other(s)
    }
}

impl From<&str> for GsdError {
    fn from(s: &str) -> Self {
        GsdError::Other(s.to_string())
    }
}

// JSON parsing errors
impl From<serde_json::Error> for GsdError {
    fn from(err: serde_json::Error) -> Self {
        GsdError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GsdError::Estimation("WLS did not converge".into());
        assert!(err.to_string().contains("Estimation error"));
        assert!(err.to_string().contains("WLS did not converge"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let gsd_err: GsdError = io_err.into();
        assert!(matches!(gsd_err, GsdError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> GsdResult<()> {
            Err(GsdError::Config("unsupported confidence level".into()))
        }

        fn outer() -> GsdResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
