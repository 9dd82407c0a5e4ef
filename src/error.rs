//! # Error Types
//!
//! This module defines the error type shared by every stage of a refinement run.
//!
//! Two classes of failure exist. Local failures (a response that never matches the
//! schema, an evaluation that reports failure) are recorded on the candidate itself
//! through [`Outcome::from_error`](crate::candidate::Outcome::from_error) and never leave
//! the pipeline. Fatal failures (the oracle transport giving up, a broken
//! configuration) are returned from [`Orchestrator::run`](crate::evolution::Orchestrator::run)
//! and abort the run.
//!
//! ## Examples
//!
//! Using the `OptionExt` trait to convert `Option` to `Result`:
//!
//! ```rust
//! use lineage::error::{EvolutionError, OptionExt};
//!
//! fn first_score(scores: &[f64]) -> lineage::error::Result<f64> {
//!     scores.first().copied().ok_or_else_evolution(|| EvolutionError::EmptyPopulation)
//! }
//!
//! assert!(first_score(&[]).is_err());
//! ```
//!
//! Using the `?` operator with automatic error conversion:
//!
//! ```rust
//! use lineage::error::Result;
//! use std::fs::File;
//! use std::io::Read;
//!
//! fn read_task(path: &str) -> Result<String> {
//!     let mut file = File::open(path)?;
//!     let mut contents = String::new();
//!     file.read_to_string(&mut contents)?;
//!     Ok(contents)
//! }
//! ```

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Represents errors that can occur while driving a refinement run.
#[derive(Error, Debug)]
pub enum EvolutionError {
    /// The oracle response never matched the response schema within the attempt budget.
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// The evaluator reported failure, produced a non-finite value or timed out.
    #[error("Evaluation failure: {0}")]
    EvaluationFailure(String),

    /// The oracle transport gave up after exhausting its own retries.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// An invalid configuration was provided.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A selection was requested from an empty population.
    #[error("Empty population error: Cannot operate on an empty population")]
    EmptyPopulation,

    /// A selection strategy received inconsistent input.
    #[error("Selection error: {0}")]
    Selection(String),

    /// The embedding function failed or returned an unusable vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Error that occurs when an I/O operation fails.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error that occurs when a persisted record cannot be (de)serialized.
    #[cfg(feature = "serde")]
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A generic error with a custom message.
    #[error("{0}")]
    Other(String),
}

/// A specialized Result type for refinement operations.
pub type Result<T> = std::result::Result<T, EvolutionError>;

/// Extension trait for Result to add context to errors.
///
/// ## Examples
///
/// ```rust
/// use lineage::error::ResultExt;
/// use std::fs::File;
///
/// fn open_snapshot(path: &str) -> lineage::error::Result<()> {
///     File::open(path).context("Failed to open snapshot")?;
///     Ok(())
/// }
/// ```
pub trait ResultExt<T, E> {
    /// Converts the error to an [`EvolutionError::Other`] prefixed with `context`.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| EvolutionError::Other(format!("{}: {}", context, e)))
    }
}

/// Extension trait for Option to convert to Result with a custom error.
pub trait OptionExt<T> {
    /// Converts an `Option<T>` to a `Result<T, EvolutionError>` using `err_fn` for `None`.
    fn ok_or_else_evolution<F>(self, err_fn: F) -> Result<T>
    where
        F: FnOnce() -> EvolutionError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_else_evolution<F>(self, err_fn: F) -> Result<T>
    where
        F: FnOnce() -> EvolutionError,
    {
        self.ok_or_else(err_fn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_message() {
        let io: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = io.context("Failed to read population").unwrap_err();
        assert_eq!(err.to_string(), "Failed to read population: missing");
    }
}
