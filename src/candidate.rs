//! # Candidates and Lineages
//!
//! A [`Candidate`] is one generated artifact (its ideas, rationale and named
//! representations) together with the outcome of evaluating it. A [`Lineage`] is the
//! append-only chain of candidates refined from one another, layer 0 being the root.
//!
//! The outcome is a sum type: a candidate either carries a fitness vector or a failure,
//! never both and never neither. Serialized candidates carry the outcome's keys inline,
//! `fitness` and `summary` or `error_kind` and `error`.
//!
//! ## Fitness layout
//!
//! Every fitness entry is minimized. The entry appended last by the evaluator is the most
//! significant one, and evaluators may append a trailing cost entry (wall-clock time, for
//! example) that never takes part in ranking. [`ObjectiveLayout`] captures whether that
//! cost entry is present.

use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{EvolutionError, Result};

/// One idea proposed by the oracle.
///
/// Root layers carry `name`, `rationale` and `definition`. Continuation layers also cite
/// the material they build on (`quote`) and what they derived from it (`implication`).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Idea {
    pub name: String,
    pub rationale: String,
    pub definition: String,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub quote: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub implication: Option<String>,
}

impl Idea {
    pub fn new(
        name: impl Into<String>,
        rationale: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            rationale: rationale.into(),
            definition: definition.into(),
            quote: None,
            implication: None,
        }
    }

    pub fn with_citation(
        mut self,
        quote: impl Into<String>,
        implication: impl Into<String>,
    ) -> Self {
        self.quote = Some(quote.into());
        self.implication = Some(implication.into());
        self
    }
}

/// Why a candidate failed.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No schema-conforming response within the attempt budget.
    ParseFailure,
    /// The evaluator reported failure (including non-finite values and timeouts).
    EvaluationFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ParseFailure => write!(f, "ParseFailure"),
            FailureKind::EvaluationFailure => write!(f, "EvaluationFailure"),
        }
    }
}

/// Ordered fitness values, all minimized.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FitnessVector(Vec<f64>);

impl FitnessVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// The values that take part in ranking, most significant first.
    ///
    /// The trailing cost entry (if the layout has one) is dropped and the remaining
    /// entries are reversed.
    pub fn ranked_objectives(&self, layout: ObjectiveLayout) -> Vec<f64> {
        let end = self.0.len().saturating_sub(layout.cost_entries());
        self.0[..end].iter().rev().copied().collect()
    }

    /// The most significant ranked objective.
    pub fn primary(&self, layout: ObjectiveLayout) -> Option<f64> {
        let end = self.0.len().checked_sub(layout.cost_entries())?;
        end.checked_sub(1).map(|idx| self.0[idx])
    }
}

impl From<Vec<f64>> for FitnessVector {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl fmt::Display for FitnessVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, value) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            if value.abs() > 1e-4 {
                write!(f, "{:<10.4}", value)?;
            } else {
                write!(f, "{:<10.4e}", value)?;
            }
        }
        write!(f, "]")
    }
}

/// Whether fitness vectors end with a cost entry excluded from ranking.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectiveLayout {
    trailing_cost: bool,
}

impl ObjectiveLayout {
    /// Fitness vectors end with a cost entry (the default).
    pub const fn with_cost() -> Self {
        Self { trailing_cost: true }
    }

    /// Every fitness entry is a ranked objective.
    pub const fn without_cost() -> Self {
        Self {
            trailing_cost: false,
        }
    }

    pub fn has_trailing_cost(&self) -> bool {
        self.trailing_cost
    }

    fn cost_entries(&self) -> usize {
        usize::from(self.trailing_cost)
    }
}

impl Default for ObjectiveLayout {
    fn default() -> Self {
        Self::with_cost()
    }
}

/// The result of evaluating a candidate.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Evaluated {
        fitness: FitnessVector,
        #[cfg_attr(feature = "serde", serde(default))]
        summary: String,
    },
    Failed {
        #[cfg_attr(feature = "serde", serde(rename = "error_kind"))]
        kind: FailureKind,
        #[cfg_attr(feature = "serde", serde(rename = "error"))]
        message: String,
    },
}

impl Outcome {
    /// Records a local error as a failed outcome.
    ///
    /// Parse and evaluation failures only end the lineage they occur in.
    ///
    /// # Errors
    ///
    /// Any other error is fatal to the run and is handed back unchanged.
    pub fn from_error(err: EvolutionError) -> Result<Self> {
        let (kind, message) = match err {
            EvolutionError::ParseFailure(message) => (FailureKind::ParseFailure, message),
            EvolutionError::EvaluationFailure(message) => (FailureKind::EvaluationFailure, message),
            fatal => return Err(fatal),
        };
        Ok(Outcome::Failed { kind, message })
    }
}

/// A schema-conforming response, before evaluation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CandidateDraft {
    pub ideas: Vec<Idea>,
    pub rationale: String,
    pub representations: BTreeMap<String, String>,
}

/// One finalized layer of a lineage.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub ideas: Vec<Idea>,
    pub rationale: String,
    pub representations: BTreeMap<String, String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub raw_response: Option<String>,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub outcome: Outcome,
}

impl Candidate {
    /// Finalizes a draft with its evaluation outcome.
    pub fn from_draft(draft: CandidateDraft, outcome: Outcome) -> Self {
        Self {
            ideas: draft.ideas,
            rationale: draft.rationale,
            representations: draft.representations,
            raw_response: None,
            outcome,
        }
    }

    /// A candidate whose response never matched the schema.
    pub fn parse_failure(message: impl Into<String>) -> Self {
        Self::from_draft(
            CandidateDraft::default(),
            Outcome::Failed {
                kind: FailureKind::ParseFailure,
                message: message.into(),
            },
        )
    }

    /// A candidate with a known fitness and no content, handy for seeding tests.
    pub fn scored(values: Vec<f64>) -> Self {
        Self::from_draft(
            CandidateDraft::default(),
            Outcome::Evaluated {
                fitness: values.into(),
                summary: String::new(),
            },
        )
    }

    /// A candidate that failed evaluation with `message`.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::from_draft(
            CandidateDraft::default(),
            Outcome::Failed {
                kind: FailureKind::EvaluationFailure,
                message: message.into(),
            },
        )
    }

    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Evaluated { .. })
    }

    pub fn fitness(&self) -> Option<&FitnessVector> {
        match &self.outcome {
            Outcome::Evaluated { fitness, .. } => Some(fitness),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Evaluated { .. } => None,
            Outcome::Failed { message, .. } => Some(message),
        }
    }

    /// Text shown to the oracle as this candidate's evaluation result.
    pub fn feedback(&self) -> &str {
        match &self.outcome {
            Outcome::Evaluated { summary, .. } => summary,
            Outcome::Failed { message, .. } => message,
        }
    }

    pub fn primary(&self, layout: ObjectiveLayout) -> Option<f64> {
        self.fitness().and_then(|f| f.primary(layout))
    }
}

/// An append-only chain of refinement layers.
///
/// A lineage is never empty: it is created from its root and only grows.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<Candidate>", into = "Vec<Candidate>"))]
#[derive(Debug, Clone, PartialEq)]
pub struct Lineage {
    layers: Vec<Candidate>,
}

impl Lineage {
    pub fn new(root: Candidate) -> Self {
        Self { layers: vec![root] }
    }

    /// Appends a layer. Nothing is appended after a failed layer.
    ///
    /// Returns `false` when the layer was rejected.
    pub fn push(&mut self, layer: Candidate) -> bool {
        if !self.last().is_ok() {
            return false;
        }
        self.layers.push(layer);
        true
    }

    pub fn layers(&self) -> &[Candidate] {
        &self.layers
    }

    pub fn root(&self) -> &Candidate {
        &self.layers[0]
    }

    /// The layer used for ranking.
    pub fn last(&self) -> &Candidate {
        &self.layers[self.layers.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn is_ok(&self) -> bool {
        self.last().is_ok()
    }
}

impl TryFrom<Vec<Candidate>> for Lineage {
    type Error = String;

    fn try_from(layers: Vec<Candidate>) -> std::result::Result<Self, Self::Error> {
        if layers.is_empty() {
            return Err("a lineage needs at least one layer".to_string());
        }
        if let Some(pos) = layers.iter().position(|c| !c.is_ok()) {
            if pos + 1 != layers.len() {
                return Err(format!("layer {} failed but is not the last layer", pos));
            }
        }
        Ok(Self { layers })
    }
}

impl From<Lineage> for Vec<Candidate> {
    fn from(lineage: Lineage) -> Self {
        lineage.layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranked_objectives_drop_cost_and_reverse() {
        let fitness = FitnessVector::new(vec![1.0, 2.0, 3.0, 0.5]);

        assert_eq!(
            fitness.ranked_objectives(ObjectiveLayout::with_cost()),
            vec![3.0, 2.0, 1.0]
        );
        assert_eq!(fitness.primary(ObjectiveLayout::with_cost()), Some(3.0));
        assert_eq!(
            fitness.ranked_objectives(ObjectiveLayout::without_cost()),
            vec![0.5, 3.0, 2.0, 1.0]
        );
        assert_eq!(fitness.primary(ObjectiveLayout::without_cost()), Some(0.5));
    }

    #[test]
    fn test_primary_of_cost_only_vector_is_none() {
        let fitness = FitnessVector::new(vec![0.2]);
        assert_eq!(fitness.primary(ObjectiveLayout::with_cost()), None);
        assert!(FitnessVector::default()
            .primary(ObjectiveLayout::without_cost())
            .is_none());
    }

    #[test]
    fn test_only_local_errors_become_outcomes() {
        let parse = Outcome::from_error(EvolutionError::ParseFailure("garbled".into())).unwrap();
        assert_eq!(
            parse,
            Outcome::Failed {
                kind: FailureKind::ParseFailure,
                message: "garbled".to_string()
            }
        );
        assert!(matches!(
            Outcome::from_error(EvolutionError::EvaluationFailure("nan".into())),
            Ok(Outcome::Failed {
                kind: FailureKind::EvaluationFailure,
                ..
            })
        ));
        assert!(matches!(
            Outcome::from_error(EvolutionError::Transport("down".into())),
            Err(EvolutionError::Transport(_))
        ));
        assert!(Outcome::from_error(EvolutionError::Configuration("bad".into())).is_err());
    }

    #[test]
    fn test_outcome_is_exclusive() {
        let ok = Candidate::scored(vec![1.0, 0.1]);
        assert!(ok.is_ok());
        assert!(ok.fitness().is_some());
        assert!(ok.error().is_none());

        let bad = Candidate::failed("diverged");
        assert!(!bad.is_ok());
        assert!(bad.fitness().is_none());
        assert_eq!(bad.error(), Some("diverged"));
    }

    #[test]
    fn test_lineage_stops_growing_after_failure() {
        let mut lineage = Lineage::new(Candidate::scored(vec![2.0]));
        assert!(lineage.push(Candidate::failed("boom")));
        assert!(!lineage.push(Candidate::scored(vec![1.0])));
        assert_eq!(lineage.len(), 2);
        assert!(!lineage.is_ok());
    }

    #[test]
    fn test_lineage_from_layers_validates() {
        assert!(Lineage::try_from(Vec::new()).is_err());
        assert!(Lineage::try_from(vec![
            Candidate::failed("x"),
            Candidate::scored(vec![1.0])
        ])
        .is_err());
        assert!(Lineage::try_from(vec![
            Candidate::scored(vec![1.0]),
            Candidate::failed("x")
        ])
        .is_ok());
    }
}
