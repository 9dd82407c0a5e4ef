//! # Candidate Pipeline
//!
//! Grows one lineage from its root to its final layer. Every layer goes through the same
//! steps: build a prompt, query the oracle until a response parses (or the attempt budget
//! runs out), evaluate the designated representation, then decide whether to extend.
//!
//! A lineage keeps growing while its last layer is error-free and
//!
//! - it only has its root so far, or
//! - its last layer improved the primary objective of the layer before by more than the
//!   improvement epsilon,
//!
//! up to the configured maximum number of layers. Only the primary objective is compared;
//! regressions on the other objectives do not stop a lineage.
//!
//! When the finished lineage's last layer beats every earlier error-free layer, and for
//! offspring every error-free parent, one extra oracle round distills the improvement
//! into reusable inspirations.
//!
//! The pipeline never mutates shared state. Distilled records are returned to the caller.

use std::fmt;

use tracing::{debug, info};

use crate::candidate::{Candidate, CandidateDraft, Idea, Lineage, ObjectiveLayout, Outcome};
use crate::error::{EvolutionError, Result};
use crate::evaluator::EvaluationGuard;
use crate::evolution::options::EvolutionOptions;
use crate::extract::{request_until_valid, Attempt, ExtractError, LayerKind, ResponseExtractor};
use crate::inspiration::{InspirationMemory, InspirationRecord};
use crate::oracle::{Message, Oracle};
use crate::prompt::{DistillSubject, OffspringMode, PromptBuilder, PromptContext};
use crate::rng::RandomNumberGenerator;

/// How a lineage came to be.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Fresh,
    Offspring(OffspringMode),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Fresh => write!(f, "init"),
            Origin::Offspring(mode) => write!(f, "{}", mode),
        }
    }
}

/// A request for one new lineage.
#[derive(Debug, Clone)]
pub enum Seed {
    Fresh,
    Offspring {
        mode: OffspringMode,
        parents: Vec<Lineage>,
    },
}

impl Seed {
    pub fn origin(&self) -> Origin {
        match self {
            Seed::Fresh => Origin::Fresh,
            Seed::Offspring { mode, .. } => Origin::Offspring(*mode),
        }
    }

    pub fn parents(&self) -> &[Lineage] {
        match self {
            Seed::Fresh => &[],
            Seed::Offspring { parents, .. } => parents,
        }
    }
}

/// A finished lineage and what it produced for the inspiration memory.
#[derive(Debug, Clone)]
pub struct GrownLineage {
    pub origin: Origin,
    pub lineage: Lineage,
    pub distilled: Vec<InspirationRecord>,
}

/// Whether `lineage` should receive another layer.
pub fn should_extend(
    lineage: &Lineage,
    max_layers: usize,
    epsilon: f64,
    layout: ObjectiveLayout,
) -> bool {
    if lineage.len() >= max_layers || !lineage.is_ok() {
        return false;
    }
    let layers = lineage.layers();
    if layers.len() == 1 {
        return true;
    }
    let previous = layers[layers.len() - 2].primary(layout);
    let current = lineage.last().primary(layout);
    match (previous, current) {
        (Some(previous), Some(current)) => previous - current > epsilon,
        _ => false,
    }
}

/// Whether the last layer of `lineage` beats every earlier error-free layer and every
/// error-free parent on the primary objective.
///
/// A lone root needs at least one point of comparison, but an offspring whose parents
/// all failed improves on them vacuously.
pub fn improves_on_all(
    lineage: &Lineage,
    parents: &[Lineage],
    epsilon: f64,
    layout: ObjectiveLayout,
) -> bool {
    let Some(current) = lineage.last().primary(layout) else {
        return false;
    };
    let layers = lineage.layers();
    let earlier = layers[..layers.len() - 1].iter();
    let references: Vec<f64> = earlier
        .chain(parents.iter().map(Lineage::last))
        .filter_map(|candidate| candidate.primary(layout))
        .collect();

    if references.is_empty() {
        return !parents.is_empty();
    }
    references.iter().all(|&r| r - current > epsilon)
}

/// Everything needed to grow lineages. Shared read-only between worker tasks.
pub struct CandidatePipeline<'a> {
    pub task: &'a str,
    pub oracle: &'a dyn Oracle,
    pub distiller: &'a dyn Oracle,
    pub extractor: &'a ResponseExtractor,
    pub evaluator: &'a EvaluationGuard,
    pub prompts: &'a dyn PromptBuilder,
    /// Memory consulted for prompt inspirations; `None` disables retrieval and distillation.
    pub memory: Option<&'a InspirationMemory>,
    /// Snapshot of the memory shown in distillation prompts.
    pub known_inspirations: &'a [InspirationRecord],
    pub options: &'a EvolutionOptions,
}

impl<'a> CandidatePipeline<'a> {
    /// Grows one lineage for `seed`.
    ///
    /// # Errors
    ///
    /// Only oracle transport failures are returned. Parse and evaluation failures are
    /// recorded on the lineage.
    pub fn grow(&self, seed: &Seed, rng: &mut RandomNumberGenerator) -> Result<GrownLineage> {
        let layout = self.options.objective_layout();
        let epsilon = self.options.improvement_epsilon();

        let inspirations = self.retrieve(&[], rng);
        let ctx = self.context(0, &inspirations);
        let messages = match seed {
            Seed::Fresh => self.prompts.initial(&ctx),
            Seed::Offspring { mode, parents } => self.prompts.offspring(&ctx, *mode, parents),
        };
        let mut lineage = Lineage::new(self.produce(&messages, LayerKind::for_layer(0))?);

        while should_extend(&lineage, self.options.max_layers(), epsilon, layout) {
            let layer = lineage.len();
            let inspirations = self.retrieve(&lineage.last().ideas, rng);
            let messages = self
                .prompts
                .continuation(&self.context(layer, &inspirations), lineage.layers());
            let candidate = self.produce(&messages, LayerKind::for_layer(layer))?;
            debug!(layer, ok = candidate.is_ok(), "layer evaluated");
            lineage.push(candidate);
        }

        let distilled = if self.distillation_enabled()
            && improves_on_all(&lineage, seed.parents(), epsilon, layout)
        {
            self.distill(&lineage, seed.parents())?
        } else {
            Vec::new()
        };

        Ok(GrownLineage {
            origin: seed.origin(),
            lineage,
            distilled,
        })
    }

    fn distillation_enabled(&self) -> bool {
        self.memory.is_some() && self.options.inspiration().distill
    }

    fn context<'c>(
        &'c self,
        layer: usize,
        inspirations: &'c [InspirationRecord],
    ) -> PromptContext<'c> {
        PromptContext {
            task: self.task,
            schema: self.extractor.schema(),
            ideas_requested: self.options.ideas_for_layer(layer),
            inspirations,
        }
    }

    fn retrieve(
        &self,
        queries: &[Idea],
        rng: &mut RandomNumberGenerator,
    ) -> Vec<InspirationRecord> {
        match self.memory {
            Some(memory) if self.options.inspiration().enabled => {
                memory.retrieve(queries, self.options.inspiration().retrieve_count, rng)
            }
            _ => Vec::new(),
        }
    }

    /// Queries the oracle for one layer and evaluates it.
    fn produce(&self, messages: &[Message], kind: LayerKind) -> Result<Candidate> {
        let attempt = request_until_valid(
            self.oracle,
            messages,
            self.options.oracle_attempts(),
            |text| self.extractor.extract(text, kind),
        )?;

        let (parsed, raw) = match attempt {
            Attempt::Parsed { value, raw, .. } => (Ok(value), raw),
            Attempt::Exhausted {
                last_raw,
                last_error,
                attempts,
            } => {
                let err = EvolutionError::ParseFailure(format!(
                    "ParseFailure after {} attempts: {}",
                    attempts, last_error
                ));
                (Err(err), last_raw)
            }
        };

        // local failures end this lineage, anything else aborts the run
        let candidate = match parsed {
            Ok(draft) => {
                let evaluated = self.extractor.schema().evaluated();
                let outcome = match draft.representations.get(evaluated) {
                    Some(content) => self.evaluator.evaluate(content),
                    None => Err(EvolutionError::ParseFailure(format!(
                        "ParseFailure: missing '{}' representation",
                        evaluated
                    ))),
                };
                Candidate::from_draft(draft, outcome.or_else(Outcome::from_error)?)
            }
            Err(err) => {
                Candidate::from_draft(CandidateDraft::default(), Outcome::from_error(err)?)
            }
        };
        Ok(candidate.with_raw_response(raw))
    }

    fn distill(&self, lineage: &Lineage, parents: &[Lineage]) -> Result<Vec<InspirationRecord>> {
        let subject = if parents.is_empty() {
            DistillSubject::Lineage(lineage)
        } else {
            DistillSubject::Offspring {
                parents,
                offspring: lineage,
            }
        };
        let ctx = self.context(0, self.known_inspirations);
        let messages = self.prompts.distill(&ctx, subject);

        let attempt = request_until_valid(
            self.distiller,
            &messages,
            self.options.oracle_attempts(),
            |text| {
                let records = self.extractor.extract_distilled(text)?;
                if records.is_empty() {
                    return Err(ExtractError::NoSolutionFound(
                        "no complete distilled idea".to_string(),
                    ));
                }
                Ok(records)
            },
        )?;

        match attempt {
            Attempt::Parsed { value, .. } => {
                info!(records = value.len(), "distilled inspirations");
                Ok(value)
            }
            Attempt::Exhausted { .. } => Ok(Vec::new()),
        }
    }
}
