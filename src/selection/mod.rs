pub mod pareto;
pub mod rank;
pub mod selection_strategy;

pub use pareto::{dominates, non_dominated_fronts, ParetoSurvivors};
pub use rank::RankBiasedSelection;
pub use selection_strategy::{ParentSelection, SurvivorSelection};
