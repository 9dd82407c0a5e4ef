pub mod builder;
pub mod launcher;
pub mod observer;
pub mod options;
pub mod pipeline;
pub mod report;

pub use builder::OrchestratorBuilder;
pub use launcher::{EvolutionResult, Orchestrator};
pub use observer::{EvolutionObserver, RunStatistics, TracingObserver};
pub use options::{EvolutionOptions, InspirationOptions, LogLevel};
pub use pipeline::{improves_on_all, should_extend, CandidatePipeline, GrownLineage, Origin, Seed};
pub use report::GenerationReport;
