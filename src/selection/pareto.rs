//! Pareto ranking of lineages.
//!
//! All objectives are minimized. Survivors are taken front by front; a front that does not
//! fit entirely is cut keeping the lineages' original relative order. There is no
//! crowding-distance tie-break.

use tracing::debug;

use crate::candidate::{Lineage, ObjectiveLayout};
use crate::error::Result;
use crate::selection::selection_strategy::SurvivorSelection;

/// Whether `a` Pareto-dominates `b`: no worse on every objective and better on one.
///
/// Vectors of different lengths are compared on their common prefix.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if x > y {
            return false;
        }
        if x < y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Fast non-dominated sort.
///
/// Partitions the indices of `objectives` into fronts. Front 0 holds the indices no one
/// dominates; front `i + 1` holds those whose dominators all lie in fronts `0..=i`. Indices
/// inside a front are ascending. Runs in `O(n² · m)`.
pub fn non_dominated_fronts(objectives: &[Vec<f64>]) -> Vec<Vec<usize>> {
    let n = objectives.len();
    let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut dominator_count = vec![0usize; n];

    for p in 0..n {
        for q in (p + 1)..n {
            if dominates(&objectives[p], &objectives[q]) {
                dominated[p].push(q);
                dominator_count[q] += 1;
            } else if dominates(&objectives[q], &objectives[p]) {
                dominated[q].push(p);
                dominator_count[p] += 1;
            }
        }
    }

    let mut fronts = Vec::new();
    let mut current: Vec<usize> = (0..n).filter(|&i| dominator_count[i] == 0).collect();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &p in &current {
            for &q in &dominated[p] {
                dominator_count[q] -= 1;
                if dominator_count[q] == 0 {
                    next.push(q);
                }
            }
        }
        next.sort_unstable();
        fronts.push(current);
        current = next;
    }

    fronts
}

/// Survivor selection by non-dominated sorting of each lineage's last layer.
///
/// When fewer lineages than `capacity` are error-free, no ranking happens at all: the
/// error-free lineages are kept, followed by as many failed ones as fit, in their original
/// order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParetoSurvivors {
    layout: ObjectiveLayout,
}

impl ParetoSurvivors {
    pub fn new(layout: ObjectiveLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> ObjectiveLayout {
        self.layout
    }
}

impl SurvivorSelection for ParetoSurvivors {
    fn select(&self, population: Vec<Lineage>, capacity: usize) -> Result<Vec<Lineage>> {
        let (mut ok, failed): (Vec<Lineage>, Vec<Lineage>) =
            population.into_iter().partition(Lineage::is_ok);

        if ok.len() < capacity {
            let missing = capacity - ok.len();
            ok.extend(failed.into_iter().take(missing));
            return Ok(ok);
        }

        let objectives: Vec<Vec<f64>> = ok
            .iter()
            .map(|lineage| {
                lineage
                    .last()
                    .fitness()
                    .map(|fitness| fitness.ranked_objectives(self.layout))
                    .unwrap_or_default()
            })
            .collect();
        let fronts = non_dominated_fronts(&objectives);
        debug!(
            candidates = ok.len(),
            fronts = fronts.len(),
            capacity,
            "ranked population"
        );

        let mut slots: Vec<Option<Lineage>> = ok.into_iter().map(Some).collect();
        let survivors = fronts
            .into_iter()
            .flatten()
            .take(capacity)
            .filter_map(|idx| slots[idx].take())
            .collect();
        Ok(survivors)
    }
}
