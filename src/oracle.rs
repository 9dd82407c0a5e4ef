//! # Oracle
//!
//! The generative text service consumed by the pipeline. A request is an ordered list of
//! role-tagged messages, a response is a single text blob.
//!
//! Implementations own their transport: they retry and time out on their own and only
//! surface [`EvolutionError::Transport`] once their retry budget is spent. Malformed but
//! successful responses are *not* errors at this level; they are handled by the
//! extraction retry loop.
//!
//! [`RetryingOracle`] adds a fixed retry budget around any oracle whose calls may fail
//! transiently.

use std::fmt;
use std::time::Duration;

use tracing::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{EvolutionError, Result};

/// Who authored a message.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One role-tagged message of an oracle request.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A generative text service.
pub trait Oracle: Send + Sync {
    /// Sends `messages` and returns the response text.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Transport`] when the service stays unreachable.
    fn complete(&self, messages: &[Message]) -> Result<String>;
}

impl<F> Oracle for F
where
    F: Fn(&[Message]) -> Result<String> + Send + Sync,
{
    fn complete(&self, messages: &[Message]) -> Result<String> {
        self(messages)
    }
}

/// Retries a flaky oracle a fixed number of times before giving up.
#[derive(Debug, Clone)]
pub struct RetryingOracle<O> {
    inner: O,
    max_attempts: usize,
    backoff: Duration,
}

impl<O: Oracle> RetryingOracle<O> {
    /// Wraps `inner` with the default budget of 10 attempts and no backoff.
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            max_attempts: 10,
            backoff: Duration::ZERO,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sleeps `backoff` between failed attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }
}

impl<O: Oracle> Oracle for RetryingOracle<O> {
    fn complete(&self, messages: &[Message]) -> Result<String> {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.inner.complete(messages) {
                Ok(text) => return Ok(text),
                Err(err) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "oracle call failed"
                    );
                    last_error = Some(err);
                    if attempt < self.max_attempts && !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                }
            }
        }
        Err(EvolutionError::Transport(format!(
            "oracle unreachable after {} attempts: {}",
            self.max_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_retrying_oracle_recovers() {
        let calls = AtomicUsize::new(0);
        let flaky = |_: &[Message]| -> Result<String> {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(EvolutionError::Other("connection reset".into()))
            } else {
                Ok("fine".into())
            }
        };

        let oracle = RetryingOracle::new(flaky);
        assert_eq!(oracle.complete(&[Message::user("hi")]).unwrap(), "fine");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retrying_oracle_surfaces_transport_failure() {
        let calls = AtomicUsize::new(0);
        let down = |_: &[Message]| -> Result<String> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EvolutionError::Other("timeout".into()))
        };

        let oracle = RetryingOracle::new(down).with_max_attempts(3);
        let err = oracle.complete(&[Message::user("hi")]).unwrap_err();

        assert!(matches!(err, EvolutionError::Transport(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
