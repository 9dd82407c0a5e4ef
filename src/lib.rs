pub mod candidate;
pub mod error;
pub mod evaluator;
pub mod evolution;
pub mod extract;
pub mod inspiration;
pub mod oracle;
#[cfg(feature = "serde")]
pub mod persistence;
pub mod prompt;
pub mod rng;
pub mod selection;

// Re-export commonly used types for convenience
pub use candidate::{Candidate, FitnessVector, Idea, Lineage, ObjectiveLayout, Outcome};
pub use error::{EvolutionError, OptionExt, Result, ResultExt};
pub use evaluator::{Evaluation, Evaluator};
pub use evolution::{EvolutionOptions, EvolutionResult, Orchestrator, OrchestratorBuilder};
pub use extract::{Representation, ResponseSchema};
pub use oracle::{Message, Oracle, RetryingOracle};
