//! # EvolutionOptions
//!
//! The `EvolutionOptions` struct holds the configuration of a refinement run: how many
//! generations to run, how large the population is, how deep lineages may grow, how the
//! oracle is retried and how the inspiration memory behaves.
//!
//! ## Example
//!
//! ```rust
//! use lineage::evolution::options::{EvolutionOptions, LogLevel};
//!
//! let options = EvolutionOptions::builder()
//!     .num_generations(20)
//!     .population_size(8)
//!     .max_layers(3)
//!     .log_level(LogLevel::Minimal)
//!     .build();
//! assert!(options.validate().is_ok());
//!
//! let default_options = EvolutionOptions::default();
//! assert_eq!(default_options.improvement_epsilon(), 1e-8);
//! ```
//!
//! ## Fields
//!
//! - `num_generations`: generations to run, generation 0 included.
//! - `population_size`: the population capacity kept after every survivor selection.
//! - `initial_multiplier`: generation 0 creates `initial_multiplier × population_size` lineages.
//! - `fresh_per_generation`: brand-new lineages added in every later generation.
//! - `max_layers`: the maximum number of layers of a lineage, root included.
//! - `ideas_per_layer`: minimum number of ideas requested per layer (the last entry repeats).
//! - `improvement_epsilon`: how much the primary objective must improve to count.
//! - `oracle_attempts`: oracle requests per layer before a parse failure is recorded.
//! - `num_threads`: worker pool size; `None` uses every available core.
//! - `crossover_parents`: parents drawn for crossover offspring.
//! - `offspring_modes`: one offspring per listed mode is created each generation.
//! - `evaluation_timeout`: optional per-evaluation time limit.
//! - `objective_layout`: whether fitness vectors end with an unranked cost entry.
//! - `log_level`: what the tracing observer reports.
//! - `inspiration`: see [`InspirationOptions`].

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::candidate::ObjectiveLayout;
use crate::error::{EvolutionError, Result};
use crate::prompt::OffspringMode;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Verbose,
    Minimal,
    None,
}

/// Configuration of the inspiration memory.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct InspirationOptions {
    /// Retrieve inspirations into prompts.
    pub enabled: bool,
    /// Distill new inspirations from improving lineages.
    pub distill: bool,
    pub capacity: usize,
    /// Records retrieved per prompt.
    pub retrieve_count: usize,
    /// Group similar records before retrieval.
    pub clustering: bool,
    /// DBSCAN radius in cosine distance.
    pub cluster_eps: f32,
}

impl Default for InspirationOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            distill: true,
            capacity: 100,
            retrieve_count: 5,
            clustering: true,
            cluster_eps: 0.6,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionOptions {
    num_generations: usize,
    population_size: usize,
    initial_multiplier: usize,
    fresh_per_generation: usize,
    max_layers: usize,
    ideas_per_layer: Vec<usize>,
    improvement_epsilon: f64,
    oracle_attempts: usize,
    num_threads: Option<usize>,
    crossover_parents: usize,
    offspring_modes: Vec<OffspringMode>,
    evaluation_timeout: Option<Duration>,
    objective_layout: ObjectiveLayout,
    log_level: LogLevel,
    inspiration: InspirationOptions,
}

impl EvolutionOptions {
    pub fn new(num_generations: usize, log_level: LogLevel, population_size: usize) -> Self {
        Self {
            num_generations,
            log_level,
            population_size,
            ..Self::default()
        }
    }

    /// Checks that the options describe a runnable configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Configuration`] naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(EvolutionError::Configuration(msg.to_string()));

        if self.num_generations == 0 {
            return fail("At least one generation is required");
        }
        if self.population_size == 0 {
            return fail("Population size cannot be zero");
        }
        if self.initial_multiplier == 0 {
            return fail("Initial population multiplier cannot be zero");
        }
        if self.max_layers == 0 {
            return fail("A lineage needs at least one layer");
        }
        if self.oracle_attempts == 0 {
            return fail("Oracle attempts cannot be zero");
        }
        if !self.improvement_epsilon.is_finite() || self.improvement_epsilon < 0.0 {
            return fail("Improvement epsilon must be a non-negative number");
        }
        if self.num_threads == Some(0) {
            return fail("Worker pool size cannot be zero");
        }
        if self.crossover_parents < 2
            && self.offspring_modes.iter().any(OffspringMode::is_crossover)
        {
            return fail("Crossover needs at least two parents");
        }
        if self.evaluation_timeout == Some(Duration::ZERO) {
            return fail("Evaluation timeout cannot be zero");
        }
        if self.inspiration.enabled && self.inspiration.retrieve_count == 0 {
            return fail("Inspiration retrieval count cannot be zero");
        }
        if self.inspiration.cluster_eps.is_nan() || self.inspiration.cluster_eps <= 0.0 {
            return fail("Cluster radius must be positive");
        }
        Ok(())
    }

    pub fn num_generations(&self) -> usize {
        self.num_generations
    }

    pub fn population_size(&self) -> usize {
        self.population_size
    }

    pub fn initial_multiplier(&self) -> usize {
        self.initial_multiplier
    }

    pub fn fresh_per_generation(&self) -> usize {
        self.fresh_per_generation
    }

    pub fn max_layers(&self) -> usize {
        self.max_layers
    }

    pub fn ideas_per_layer(&self) -> &[usize] {
        &self.ideas_per_layer
    }

    /// Minimum number of ideas requested for `layer`.
    pub fn ideas_for_layer(&self, layer: usize) -> usize {
        self.ideas_per_layer
            .get(layer)
            .or_else(|| self.ideas_per_layer.last())
            .copied()
            .unwrap_or(3)
    }

    pub fn improvement_epsilon(&self) -> f64 {
        self.improvement_epsilon
    }

    pub fn oracle_attempts(&self) -> usize {
        self.oracle_attempts
    }

    pub fn num_threads(&self) -> Option<usize> {
        self.num_threads
    }

    pub fn crossover_parents(&self) -> usize {
        self.crossover_parents
    }

    pub fn offspring_modes(&self) -> &[OffspringMode] {
        &self.offspring_modes
    }

    pub fn evaluation_timeout(&self) -> Option<Duration> {
        self.evaluation_timeout
    }

    pub fn objective_layout(&self) -> ObjectiveLayout {
        self.objective_layout
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn inspiration(&self) -> &InspirationOptions {
        &self.inspiration
    }

    pub fn set_num_generations(&mut self, num_generations: usize) {
        self.num_generations = num_generations;
    }

    pub fn set_population_size(&mut self, population_size: usize) {
        self.population_size = population_size;
    }

    pub fn set_log_level(&mut self, log_level: LogLevel) {
        self.log_level = log_level;
    }

    pub fn set_offspring_modes(&mut self, modes: Vec<OffspringMode>) {
        self.offspring_modes = modes;
    }

    pub fn set_inspiration(&mut self, inspiration: InspirationOptions) {
        self.inspiration = inspiration;
    }

    /// Returns a builder for creating an `EvolutionOptions` instance.
    pub fn builder() -> EvolutionOptionsBuilder {
        EvolutionOptionsBuilder::default()
    }
}

impl Default for EvolutionOptions {
    fn default() -> Self {
        Self {
            num_generations: 10,
            population_size: 10,
            initial_multiplier: 2,
            fresh_per_generation: 1,
            max_layers: 3,
            ideas_per_layer: vec![3],
            improvement_epsilon: 1e-8,
            oracle_attempts: 4,
            num_threads: None,
            crossover_parents: 2,
            offspring_modes: OffspringMode::ALL.to_vec(),
            evaluation_timeout: None,
            objective_layout: ObjectiveLayout::default(),
            log_level: LogLevel::None,
            inspiration: InspirationOptions::default(),
        }
    }
}

/// Builder for `EvolutionOptions`.
///
/// Unset fields keep their default value.
#[derive(Debug, Clone, Default)]
pub struct EvolutionOptionsBuilder {
    options: EvolutionOptions,
}

impl EvolutionOptionsBuilder {
    pub fn num_generations(mut self, value: usize) -> Self {
        self.options.num_generations = value;
        self
    }

    pub fn population_size(mut self, value: usize) -> Self {
        self.options.population_size = value;
        self
    }

    pub fn initial_multiplier(mut self, value: usize) -> Self {
        self.options.initial_multiplier = value;
        self
    }

    pub fn fresh_per_generation(mut self, value: usize) -> Self {
        self.options.fresh_per_generation = value;
        self
    }

    pub fn max_layers(mut self, value: usize) -> Self {
        self.options.max_layers = value;
        self
    }

    pub fn ideas_per_layer(mut self, value: Vec<usize>) -> Self {
        self.options.ideas_per_layer = value;
        self
    }

    pub fn improvement_epsilon(mut self, value: f64) -> Self {
        self.options.improvement_epsilon = value;
        self
    }

    pub fn oracle_attempts(mut self, value: usize) -> Self {
        self.options.oracle_attempts = value;
        self
    }

    pub fn num_threads(mut self, value: usize) -> Self {
        self.options.num_threads = Some(value);
        self
    }

    pub fn crossover_parents(mut self, value: usize) -> Self {
        self.options.crossover_parents = value;
        self
    }

    pub fn offspring_modes(mut self, value: Vec<OffspringMode>) -> Self {
        self.options.offspring_modes = value;
        self
    }

    pub fn evaluation_timeout(mut self, value: Duration) -> Self {
        self.options.evaluation_timeout = Some(value);
        self
    }

    pub fn objective_layout(mut self, value: ObjectiveLayout) -> Self {
        self.options.objective_layout = value;
        self
    }

    pub fn log_level(mut self, value: LogLevel) -> Self {
        self.options.log_level = value;
        self
    }

    pub fn inspiration(mut self, value: InspirationOptions) -> Self {
        self.options.inspiration = value;
        self
    }

    /// Builds the `EvolutionOptions` instance. Call [`EvolutionOptions::validate`] to check it.
    pub fn build(self) -> EvolutionOptions {
        self.options
    }
}
