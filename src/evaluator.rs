//! # Evaluator
//!
//! The numeric objective function that scores a candidate's evaluated representation.
//! Evaluators report success or failure through [`Evaluation`]; they are expected never
//! to panic, but [`EvaluationGuard`] contains panics anyway, rejects non-finite fitness
//! values and enforces an optional per-call timeout. Every failure comes back as
//! [`EvolutionError::EvaluationFailure`], which the caller records on the candidate.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use lineage::evaluator::{Evaluation, EvaluationGuard};
//!
//! let guard = EvaluationGuard::new(Arc::new(|code: &str| {
//!     Evaluation::success(vec![code.len() as f64, 0.01], "scored by length")
//! }));
//!
//! let outcome = guard.evaluate("x = 1");
//! assert!(matches!(outcome, Ok(lineage::candidate::Outcome::Evaluated { .. })));
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::candidate::{FitnessVector, Outcome};
use crate::error::{EvolutionError, Result};

/// What an evaluator reports for one representation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub fitness: Vec<f64>,
    pub summary: String,
    pub success: bool,
}

impl Evaluation {
    pub fn success(fitness: Vec<f64>, summary: impl Into<String>) -> Self {
        Self {
            fitness,
            summary: summary.into(),
            success: true,
        }
    }

    pub fn failure(summary: impl Into<String>) -> Self {
        Self {
            fitness: Vec::new(),
            summary: summary.into(),
            success: false,
        }
    }
}

/// Scores the content of a candidate's evaluated representation slot.
///
/// Any numeric data the task needs is owned by the implementation.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, representation: &str) -> Evaluation;
}

impl<F> Evaluator for F
where
    F: Fn(&str) -> Evaluation + Send + Sync,
{
    fn evaluate(&self, representation: &str) -> Evaluation {
        self(representation)
    }
}

/// Runs an [`Evaluator`] and turns whatever happens into a fitness or an evaluation failure.
#[derive(Clone)]
pub struct EvaluationGuard {
    evaluator: Arc<dyn Evaluator>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for EvaluationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationGuard")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl EvaluationGuard {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            evaluator,
            timeout: None,
        }
    }

    /// Fails evaluations that take longer than `timeout`.
    ///
    /// The timed-out call is not cancelled; its result is discarded when it arrives.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Evaluates `representation`. Never panics and never retries.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::EvaluationFailure`] when the evaluator reports failure,
    /// panics, times out or produces no usable fitness.
    pub fn evaluate(&self, representation: &str) -> Result<Outcome> {
        let evaluation = match self.timeout {
            None => call_contained(self.evaluator.as_ref(), representation),
            Some(limit) => self.call_with_timeout(representation, limit),
        };
        into_outcome(evaluation)
    }

    fn call_with_timeout(&self, representation: &str, limit: Duration) -> Evaluation {
        let (sender, receiver) = mpsc::channel();
        let evaluator = Arc::clone(&self.evaluator);
        let content = representation.to_string();

        let spawned = thread::Builder::new()
            .name("lineage-evaluation".to_string())
            .spawn(move || {
                // the receiver is gone once the call timed out
                let _ = sender.send(call_contained(evaluator.as_ref(), &content));
            });
        if let Err(err) = spawned {
            return Evaluation::failure(format!("Could not start evaluation: {}", err));
        }

        match receiver.recv_timeout(limit) {
            Ok(evaluation) => evaluation,
            Err(_) => {
                warn!(timeout_secs = limit.as_secs_f64(), "evaluation timed out");
                Evaluation::failure(format!(
                    "Evaluation timed out after {:.1} seconds",
                    limit.as_secs_f64()
                ))
            }
        }
    }
}

fn call_contained(evaluator: &dyn Evaluator, representation: &str) -> Evaluation {
    match panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(representation))) {
        Ok(evaluation) => evaluation,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(%reason, "evaluator panicked");
            Evaluation::failure(format!("Evaluation crashed: {}", reason))
        }
    }
}

fn into_outcome(evaluation: Evaluation) -> Result<Outcome> {
    if !evaluation.success {
        return Err(EvolutionError::EvaluationFailure(evaluation.summary));
    }
    let fitness = FitnessVector::new(evaluation.fitness);
    if fitness.is_empty() {
        return Err(EvolutionError::EvaluationFailure(
            "Evaluator returned no fitness values".to_string(),
        ));
    }
    if !fitness.is_finite() {
        return Err(EvolutionError::EvaluationFailure(format!(
            "Non-finite fitness {}: {}",
            fitness, evaluation.summary
        )));
    }
    Ok(Outcome::Evaluated {
        fitness,
        summary: evaluation.summary,
    })
}
