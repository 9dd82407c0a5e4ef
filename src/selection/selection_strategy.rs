use std::fmt::Debug;

use crate::candidate::Lineage;
use crate::error::Result;
use crate::rng::RandomNumberGenerator;

/// Decides which lineages survive into the next generation.
///
/// Strategies are chosen when the orchestrator is built and may be swapped for custom
/// implementations.
///
/// # Examples
///
/// ```
/// use lineage::candidate::{Candidate, Lineage, ObjectiveLayout};
/// use lineage::selection::{ParetoSurvivors, SurvivorSelection};
/// use lineage::error::Result;
///
/// fn main() -> Result<()> {
///     let population = vec![
///         Lineage::new(Candidate::scored(vec![2.0])),
///         Lineage::new(Candidate::scored(vec![1.0])),
///         Lineage::new(Candidate::failed("SyntaxError")),
///     ];
///
///     let strategy = ParetoSurvivors::new(ObjectiveLayout::without_cost());
///     let survivors = strategy.select(population, 2)?;
///
///     assert_eq!(survivors.len(), 2);
///     assert!(survivors.iter().all(|l| l.is_ok()));
///
///     Ok(())
/// }
/// ```
pub trait SurvivorSelection: Debug + Send + Sync {
    /// Reduces `population` to at most `capacity` lineages, best first.
    ///
    /// Discarded lineages are dropped whole.
    ///
    /// # Errors
    ///
    /// Returns an error if the strategy cannot rank the population.
    fn select(&self, population: Vec<Lineage>, capacity: usize) -> Result<Vec<Lineage>>;
}

/// Draws parents out of a ranked population.
///
/// Implementations work on positions only: position 0 is the best ranked lineage.
pub trait ParentSelection: Debug + Send + Sync {
    /// Returns `count` distinct positions in `0..population_size`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The population is empty
    /// - `count` exceeds the population size
    fn sample(
        &self,
        population_size: usize,
        count: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<usize>>;
}
