//! # Observers
//!
//! Observers receive every finished lineage and a report after every survivor selection.
//! They are only ever called from the orchestrator thread, between generations.
//!
//! To read an observer back after a run, share it through `Arc<Mutex<_>>`:
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use lineage::evolution::observer::RunStatistics;
//!
//! let stats = Arc::new(Mutex::new(RunStatistics::default()));
//! // builder.with_observer(Arc::clone(&stats));
//! assert_eq!(stats.lock().unwrap().lineages(), 0);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::candidate::{Lineage, ObjectiveLayout};
use crate::error::Result;
use crate::evolution::options::LogLevel;
use crate::evolution::pipeline::{GrownLineage, Origin};
use crate::evolution::report::GenerationReport;
use crate::inspiration::InspirationMemory;

pub trait EvolutionObserver: Send {
    /// Called once per lineage created in `generation`, before survivor selection.
    fn on_lineage(&mut self, _generation: usize, _grown: &GrownLineage) {}

    /// Called after survivor selection.
    ///
    /// # Errors
    ///
    /// An error aborts the run.
    fn on_generation(
        &mut self,
        _report: &GenerationReport,
        _population: &[Lineage],
        _memory: Option<&InspirationMemory>,
    ) -> Result<()> {
        Ok(())
    }
}

impl<T: EvolutionObserver> EvolutionObserver for Arc<Mutex<T>> {
    fn on_lineage(&mut self, generation: usize, grown: &GrownLineage) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_lineage(generation, grown);
    }

    fn on_generation(
        &mut self,
        report: &GenerationReport,
        population: &[Lineage],
        memory: Option<&InspirationMemory>,
    ) -> Result<()> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_generation(report, population, memory)
    }
}

/// Reports progress through `tracing` at the configured [`LogLevel`].
#[derive(Debug, Clone, Copy)]
pub struct TracingObserver {
    level: LogLevel,
}

impl TracingObserver {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }
}

impl EvolutionObserver for TracingObserver {
    fn on_lineage(&mut self, generation: usize, grown: &GrownLineage) {
        if self.level == LogLevel::Verbose {
            info!(
                generation,
                origin = %grown.origin,
                layers = grown.lineage.len(),
                ok = grown.lineage.is_ok(),
                distilled = grown.distilled.len(),
                "lineage finished"
            );
        }
    }

    fn on_generation(
        &mut self,
        report: &GenerationReport,
        _population: &[Lineage],
        memory: Option<&InspirationMemory>,
    ) -> Result<()> {
        match self.level {
            LogLevel::None => {}
            LogLevel::Minimal => {
                let best = report.best().map(|f| f.to_string()).unwrap_or_default();
                info!(
                    generation = report.generation,
                    created = report.created,
                    valid = report.created_ok,
                    %best,
                    "generation complete"
                );
            }
            LogLevel::Verbose => {
                info!(
                    generation = report.generation,
                    inspirations = memory.map_or(0, InspirationMemory::len),
                    "generation complete\n{}",
                    report
                );
            }
        }
        Ok(())
    }
}

/// Per-origin tallies kept by [`RunStatistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OriginCounts {
    pub created: usize,
    pub valid: usize,
    /// Lineages that produced distilled inspirations.
    pub distilled: usize,
}

/// Counters over every lineage of a run.
#[derive(Debug, Clone, Default)]
pub struct RunStatistics {
    layout: ObjectiveLayout,
    valid_per_layer: Vec<usize>,
    invalid_per_layer: Vec<usize>,
    best_per_objective: Vec<f64>,
    per_origin: HashMap<Origin, OriginCounts>,
    generations: usize,
}

impl RunStatistics {
    pub fn new(layout: ObjectiveLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn lineages(&self) -> usize {
        self.per_origin.values().map(|c| c.created).sum()
    }

    pub fn generations(&self) -> usize {
        self.generations
    }

    /// Error-free layers, indexed by layer depth.
    pub fn valid_per_layer(&self) -> &[usize] {
        &self.valid_per_layer
    }

    /// Failed layers, indexed by layer depth.
    pub fn invalid_per_layer(&self) -> &[usize] {
        &self.invalid_per_layer
    }

    /// Lowest value seen for every ranked objective, most significant first.
    pub fn best_per_objective(&self) -> &[f64] {
        &self.best_per_objective
    }

    pub fn origin(&self, origin: Origin) -> OriginCounts {
        self.per_origin.get(&origin).copied().unwrap_or_default()
    }
}

impl EvolutionObserver for RunStatistics {
    fn on_lineage(&mut self, _generation: usize, grown: &GrownLineage) {
        for (depth, layer) in grown.lineage.layers().iter().enumerate() {
            let counter = if layer.is_ok() {
                &mut self.valid_per_layer
            } else {
                &mut self.invalid_per_layer
            };
            if counter.len() <= depth {
                counter.resize(depth + 1, 0);
            }
            counter[depth] += 1;

            if let Some(fitness) = layer.fitness() {
                let objectives = fitness.ranked_objectives(self.layout);
                for (idx, value) in objectives.into_iter().enumerate() {
                    match self.best_per_objective.get_mut(idx) {
                        Some(best) => *best = best.min(value),
                        None => self.best_per_objective.push(value),
                    }
                }
            }
        }

        let counts = self.per_origin.entry(grown.origin).or_default();
        counts.created += 1;
        counts.valid += usize::from(grown.lineage.is_ok());
        counts.distilled += usize::from(!grown.distilled.is_empty());
    }

    fn on_generation(
        &mut self,
        report: &GenerationReport,
        _population: &[Lineage],
        _memory: Option<&InspirationMemory>,
    ) -> Result<()> {
        self.generations += 1;
        debug!(generation = report.generation, lineages = self.lineages(), "statistics updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Candidate;
    use crate::inspiration::InspirationRecord;
    use crate::prompt::OffspringMode;

    #[test]
    fn test_statistics_count_layers_and_origins() {
        let mut stats = RunStatistics::new(ObjectiveLayout::with_cost());

        let mut lineage = Lineage::new(Candidate::scored(vec![3.0, 1.0, 0.2]));
        lineage.push(Candidate::failed("x"));
        stats.on_lineage(
            0,
            &GrownLineage {
                origin: Origin::Fresh,
                lineage,
                distilled: Vec::new(),
            },
        );
        stats.on_lineage(
            1,
            &GrownLineage {
                origin: Origin::Offspring(OffspringMode::MutationPositive),
                lineage: Lineage::new(Candidate::scored(vec![4.0, 0.5, 9.0])),
                distilled: vec![InspirationRecord::new("n", "d", "e")],
            },
        );

        assert_eq!(stats.valid_per_layer(), &[2]);
        assert_eq!(stats.invalid_per_layer(), &[0, 1]);
        assert_eq!(stats.best_per_objective(), &[0.5, 3.0]);
        assert_eq!(stats.lineages(), 2);
        assert_eq!(
            stats.origin(Origin::Fresh),
            OriginCounts {
                created: 1,
                valid: 0,
                distilled: 0
            }
        );
        assert_eq!(
            stats
                .origin(Origin::Offspring(OffspringMode::MutationPositive))
                .distilled,
            1
        );
    }
}
