use std::sync::Arc;

use crate::{
    candidate::Lineage,
    error::{EvolutionError, Result},
    evaluator::{EvaluationGuard, Evaluator},
    extract::{ResponseExtractor, ResponseSchema},
    inspiration::{Embedder, HashingEmbedder, InspirationMemory, InspirationRecord},
    oracle::Oracle,
    prompt::{DefaultPromptBuilder, PromptBuilder},
    rng::RandomNumberGenerator,
    selection::{ParentSelection, ParetoSurvivors, RankBiasedSelection, SurvivorSelection},
};

use super::{
    observer::{EvolutionObserver, TracingObserver},
    options::EvolutionOptions,
    Orchestrator,
};

/// Assembles an [`Orchestrator`].
///
/// The task description, response schema, oracle and evaluator are required. Everything
/// else has a default: [`DefaultPromptBuilder`], [`ParetoSurvivors`] with the options'
/// objective layout, [`RankBiasedSelection`], a [`HashingEmbedder`] when the inspiration
/// memory is enabled, and a [`TracingObserver`] at the options' log level.
#[derive(Default)]
pub struct OrchestratorBuilder {
    task: Option<String>,
    schema: Option<ResponseSchema>,
    oracle: Option<Arc<dyn Oracle>>,
    distiller: Option<Arc<dyn Oracle>>,
    evaluator: Option<Arc<dyn Evaluator>>,
    prompts: Option<Arc<dyn PromptBuilder>>,
    survivors: Option<Box<dyn SurvivorSelection>>,
    parents: Option<Box<dyn ParentSelection>>,
    embedder: Option<Arc<dyn Embedder>>,
    inspirations: Vec<InspirationRecord>,
    observers: Vec<Box<dyn EvolutionObserver>>,
    options: Option<EvolutionOptions>,
    seed: Option<u64>,
    initial_population: Vec<Lineage>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The task description shown at the top of every prompt.
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_oracle<O: Oracle + 'static>(mut self, oracle: O) -> Self {
        self.oracle = Some(Arc::new(oracle));
        self
    }

    /// A separate oracle for distillation requests. Defaults to the main oracle.
    pub fn with_distiller<O: Oracle + 'static>(mut self, distiller: O) -> Self {
        self.distiller = Some(Arc::new(distiller));
        self
    }

    pub fn with_evaluator<E: Evaluator + 'static>(mut self, evaluator: E) -> Self {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    pub fn with_prompt_builder<P: PromptBuilder + 'static>(mut self, prompts: P) -> Self {
        self.prompts = Some(Arc::new(prompts));
        self
    }

    pub fn with_survivor_selection<S: SurvivorSelection + 'static>(mut self, strategy: S) -> Self {
        self.survivors = Some(Box::new(strategy));
        self
    }

    pub fn with_parent_selection<S: ParentSelection + 'static>(mut self, strategy: S) -> Self {
        self.parents = Some(Box::new(strategy));
        self
    }

    pub fn with_embedder<E: Embedder + 'static>(mut self, embedder: E) -> Self {
        self.embedder = Some(Arc::new(embedder));
        self
    }

    /// Records the inspiration memory starts with, e.g. a loaded snapshot.
    pub fn with_inspirations(mut self, records: Vec<InspirationRecord>) -> Self {
        self.inspirations = records;
        self
    }

    /// Adds an observer. The first call replaces the default tracing observer.
    pub fn with_observer<O: EvolutionObserver + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn with_options(mut self, options: EvolutionOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Seeds the random number generator for a reproducible run.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Starts from an existing population instead of generating 2 × capacity lineages.
    pub fn with_initial_population(mut self, population: Vec<Lineage>) -> Self {
        self.initial_population = population;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let options = self.options.unwrap_or_default();
        options.validate()?;

        let task = self.task.ok_or_else(|| {
            EvolutionError::Configuration("Task description not specified".to_string())
        })?;
        let schema = self.schema.ok_or_else(|| {
            EvolutionError::Configuration("Response schema not specified".to_string())
        })?;
        schema.validate()?;
        let oracle = self
            .oracle
            .ok_or_else(|| EvolutionError::Configuration("Oracle not specified".to_string()))?;
        let evaluator = self
            .evaluator
            .ok_or_else(|| EvolutionError::Configuration("Evaluator not specified".to_string()))?;

        let memory = if options.inspiration().enabled {
            let embedder = self
                .embedder
                .unwrap_or_else(|| Arc::new(HashingEmbedder::default()));
            let eps = options
                .inspiration()
                .clustering
                .then_some(options.inspiration().cluster_eps);
            let memory = InspirationMemory::from_records(
                embedder,
                options.inspiration().capacity,
                self.inspirations,
            );
            Some(memory.with_clustering(eps))
        } else {
            None
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.num_threads().unwrap_or(0))
            .thread_name(|idx| format!("lineage-worker-{}", idx))
            .build()
            .map_err(|e| {
                EvolutionError::Configuration(format!("Cannot build worker pool: {}", e))
            })?;

        let mut observers = self.observers;
        if observers.is_empty() {
            observers.push(Box::new(TracingObserver::new(options.log_level())));
        }

        Ok(Orchestrator {
            task,
            oracle,
            distiller: self.distiller,
            extractor: ResponseExtractor::new(schema),
            evaluator: EvaluationGuard::new(evaluator).with_timeout(options.evaluation_timeout()),
            prompts: self
                .prompts
                .unwrap_or_else(|| Arc::new(DefaultPromptBuilder::new())),
            survivors: self
                .survivors
                .unwrap_or_else(|| Box::new(ParetoSurvivors::new(options.objective_layout()))),
            parents: self
                .parents
                .unwrap_or_else(|| Box::new(RankBiasedSelection::new())),
            memory,
            observers,
            pool,
            rng: self
                .seed
                .map_or_else(RandomNumberGenerator::new, RandomNumberGenerator::from_seed),
            initial_population: self.initial_population,
            options,
        })
    }
}
