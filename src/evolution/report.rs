use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::candidate::{FitnessVector, Lineage, Outcome};

/// One survivor's line in a [`GenerationReport`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    /// Position in the ranked population.
    pub rank: usize,
    pub layers: usize,
    pub result: Result<FitnessVector, String>,
}

/// Compact rank/objective summary of a population after survivor selection.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub generation: usize,
    /// Lineages created during this generation.
    pub created: usize,
    /// Created lineages whose last layer is error-free.
    pub created_ok: usize,
    pub entries: Vec<ReportEntry>,
}

impl GenerationReport {
    pub fn new(generation: usize, population: &[Lineage]) -> Self {
        let entries = population
            .iter()
            .enumerate()
            .map(|(rank, lineage)| ReportEntry {
                rank,
                layers: lineage.len(),
                result: match &lineage.last().outcome {
                    Outcome::Evaluated { fitness, .. } => Ok(fitness.clone()),
                    Outcome::Failed { message, .. } => Err(message.clone()),
                },
            })
            .collect();

        Self {
            generation,
            created: 0,
            created_ok: 0,
            entries,
        }
    }

    pub fn with_created(mut self, created: usize, created_ok: usize) -> Self {
        self.created = created;
        self.created_ok = created_ok;
        self
    }

    /// The top ranked fitness, if the best survivor is error-free.
    pub fn best(&self) -> Option<&FitnessVector> {
        self.entries.first().and_then(|e| e.result.as_ref().ok())
    }
}

impl fmt::Display for GenerationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Generation {} ({} of {} new lineages valid)",
            self.generation, self.created_ok, self.created
        )?;
        writeln!(f, "{:<6}{:<8}Obj.", "Idx.", "Layers")?;
        for entry in &self.entries {
            match &entry.result {
                Ok(fitness) => writeln!(f, "{:<6}{:<8}{}", entry.rank, entry.layers, fitness)?,
                Err(message) => {
                    let first_line = message.lines().next().unwrap_or_default();
                    writeln!(f, "{:<6}{:<8}ERROR: {}", entry.rank, entry.layers, first_line)?
                }
            }
        }
        Ok(())
    }
}
