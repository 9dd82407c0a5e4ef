use crate::error::{EvolutionError, Result};
use crate::rng::RandomNumberGenerator;
use crate::selection::selection_strategy::ParentSelection;

/// Rank-biased parent sampling without replacement.
///
/// The lineage at rank `r` (0-based, best first) in a population of `N` is included with
/// probability proportional to `1 / (r + 1 + N)`. Every lineage gets one independent
/// trial. If fewer than `count` lineages were picked, the rest is drawn uniformly from the
/// ones left out; if more were picked, `count` of them are kept uniformly at random.
///
/// The bias is deliberately mild: rank 0 is at most about twice as likely as the last rank.
///
/// # Examples
///
/// ```
/// use lineage::rng::RandomNumberGenerator;
/// use lineage::selection::{ParentSelection, RankBiasedSelection};
/// use lineage::error::Result;
///
/// fn main() -> Result<()> {
///     let mut rng = RandomNumberGenerator::from_seed(11);
///     let parents = RankBiasedSelection::new().sample(8, 2, &mut rng)?;
///
///     assert_eq!(parents.len(), 2);
///     assert_ne!(parents[0], parents[1]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RankBiasedSelection;

impl RankBiasedSelection {
    pub fn new() -> Self {
        Self
    }

    /// Normalized inclusion probability of every rank.
    pub fn probabilities(population_size: usize) -> Vec<f64> {
        let n = population_size as f64;
        let weights: Vec<f64> = (0..population_size)
            .map(|rank| 1.0 / (rank as f64 + 1.0 + n))
            .collect();
        let total: f64 = weights.iter().sum();
        weights.into_iter().map(|w| w / total).collect()
    }
}

impl ParentSelection for RankBiasedSelection {
    fn sample(
        &self,
        population_size: usize,
        count: usize,
        rng: &mut RandomNumberGenerator,
    ) -> Result<Vec<usize>> {
        if population_size == 0 {
            return Err(EvolutionError::EmptyPopulation);
        }
        if count > population_size {
            return Err(EvolutionError::Selection(format!(
                "Cannot draw {} distinct parents from a population of {}",
                count, population_size
            )));
        }

        let mut picked = Vec::with_capacity(count);
        let mut left_out = Vec::with_capacity(population_size);
        for (rank, p) in Self::probabilities(population_size).into_iter().enumerate() {
            if rng.gen_bool(p) {
                picked.push(rank);
            } else {
                left_out.push(rank);
            }
        }

        if picked.len() < count {
            let deficit = count - picked.len();
            let extra = rng.sample_indices(left_out.len(), deficit);
            picked.extend(extra.into_iter().map(|i| left_out[i]));
        } else if picked.len() > count {
            let keep = rng.sample_indices(picked.len(), count);
            picked = keep.into_iter().map(|i| picked[i]).collect();
        }

        picked.sort_unstable();
        Ok(picked)
    }
}
