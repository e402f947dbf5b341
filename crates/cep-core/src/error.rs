//! Unified error types for the CEP ecosystem
//!
//! This module provides a common error type [`CepError`] that can represent
//! errors from any part of the system. Domain-specific failures are mapped
//! onto a small set of variants so that callers can handle configuration,
//! data and solver problems uniformly at API boundaries.
//!
//! # Example
//!
//! ```ignore
//! use cep_core::{CepError, CepResult};
//!
//! fn build_model(system: &System) -> CepResult<()> {
//!     let sets = build_sets(system)?;
//!     assemble(&sets)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all CEP operations.
///
/// Configuration and data errors are fatal at construction time and abort
/// assembly; solver *outcomes* (infeasible, unbounded, time limit) are not
/// errors and are reported through the solve status instead. The
/// [`CepError::Solver`] variant is reserved for failures of the solving
/// machinery itself.
#[derive(Error, Debug)]
pub enum CepError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unknown set, missing required attribute, inconsistent declared kind
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wrong index shape, non-finite value where a finite one is required,
    /// mismatched existing capacities on reverse edges
    #[error("Data error: {0}")]
    Data(String),

    /// A constraint is provably inconsistent with variable bounds at
    /// assembly time
    #[error("Infeasible model: {0}")]
    Infeasible(String),

    /// Solver machinery failure (not a solve outcome)
    #[error("Solver error: {0}")]
    Solver(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using CepError.
pub type CepResult<T> = Result<T, CepError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for CepError {
    fn from(err: anyhow::Error) -> Self {
        CepError::Other(err.to_string())
    }
}

// Conversion from string-like types for convenience
impl From<String> for CepError {
    fn from(s: String) -> Self {
        CepError::Other(s)
    }
}

impl From<&str> for CepError {
    fn from(s: &str) -> Self {
        CepError::Other(s.to_string())
    }
}

// JSON parsing errors
impl From<serde_json::Error> for CepError {
    fn from(err: serde_json::Error) -> Self {
        CepError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CepError::Config("unknown set 'set_foo'".into());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("set_foo"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cep_err: CepError = io_err.into();
        assert!(matches!(cep_err, CepError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> CepResult<()> {
            Err(CepError::Data("bad shape".into()))
        }

        fn outer() -> CepResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
