use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use super::{
    observer::EvolutionObserver,
    options::EvolutionOptions,
    pipeline::{CandidatePipeline, GrownLineage, Seed},
    report::GenerationReport,
};
use crate::{
    candidate::Lineage,
    error::{EvolutionError, OptionExt, Result},
    evaluator::EvaluationGuard,
    extract::ResponseExtractor,
    inspiration::{InspirationMemory, InspirationRecord},
    oracle::Oracle,
    prompt::PromptBuilder,
    rng::RandomNumberGenerator,
    selection::{ParentSelection, SurvivorSelection},
};

/// The outcome of a completed run.
#[derive(Debug, Clone)]
pub struct EvolutionResult {
    /// The final population, best ranked first.
    pub population: Vec<Lineage>,
    /// One report per generation.
    pub reports: Vec<GenerationReport>,
}

impl EvolutionResult {
    /// The top ranked lineage of the final population.
    pub fn best(&self) -> Result<&Lineage> {
        self.population
            .first()
            .ok_or_else_evolution(|| EvolutionError::EmptyPopulation)
    }
}

/// Drives the generation loop.
///
/// Every generation creates new lineages (fresh ones and one offspring per configured
/// mode), grows them concurrently on a bounded worker pool, waits for all of them, then
/// merges them into the population and lets the survivor strategy cut it back to
/// capacity. The population and the inspiration memory are only touched between
/// generations, on the calling thread.
///
/// Build one with [`OrchestratorBuilder`](super::builder::OrchestratorBuilder).
pub struct Orchestrator {
    pub(super) task: String,
    pub(super) oracle: Arc<dyn Oracle>,
    pub(super) distiller: Option<Arc<dyn Oracle>>,
    pub(super) extractor: ResponseExtractor,
    pub(super) evaluator: EvaluationGuard,
    pub(super) prompts: Arc<dyn PromptBuilder>,
    pub(super) survivors: Box<dyn SurvivorSelection>,
    pub(super) parents: Box<dyn ParentSelection>,
    pub(super) memory: Option<InspirationMemory>,
    pub(super) observers: Vec<Box<dyn EvolutionObserver>>,
    pub(super) options: EvolutionOptions,
    pub(super) pool: ThreadPool,
    pub(super) rng: RandomNumberGenerator,
    pub(super) initial_population: Vec<Lineage>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("options", &self.options)
            .field("survivors", &self.survivors)
            .field("parents", &self.parents)
            .field("memory", &self.memory)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn options(&self) -> &EvolutionOptions {
        &self.options
    }

    pub fn memory(&self) -> Option<&InspirationMemory> {
        self.memory.as_ref()
    }

    /// Runs every configured generation.
    ///
    /// Generation 0 grows `initial_multiplier × population_size` fresh lineages, or, when
    /// started from a loaded population, only as many as are missing to reach capacity.
    ///
    /// # Errors
    ///
    /// This method will return an error if:
    /// - The options are invalid
    /// - The oracle transport fails in any task (after the generation's barrier)
    /// - A selection strategy or an observer fails
    pub fn run(&mut self) -> Result<EvolutionResult> {
        self.options.validate()?;
        let capacity = self.options.population_size();

        let mut population = std::mem::take(&mut self.initial_population);
        let fresh = if population.is_empty() {
            capacity * self.options.initial_multiplier()
        } else {
            capacity.saturating_sub(population.len())
        };
        info!(
            generations = self.options.num_generations(),
            capacity,
            loaded = population.len(),
            fresh,
            "starting run"
        );

        let mut reports = Vec::with_capacity(self.options.num_generations());
        let seeds = vec![Seed::Fresh; fresh];
        let (next, report) = self.advance(0, population, seeds)?;
        population = next;
        reports.push(report);

        for generation in 1..self.options.num_generations() {
            let seeds = self.seeds_for(&population)?;
            let (next, report) = self.advance(generation, population, seeds)?;
            population = next;
            reports.push(report);
        }

        Ok(EvolutionResult {
            population,
            reports,
        })
    }

    /// Fresh lineages plus one offspring request per mode.
    fn seeds_for(&mut self, population: &[Lineage]) -> Result<Vec<Seed>> {
        let mut seeds = vec![Seed::Fresh; self.options.fresh_per_generation()];
        if population.is_empty() {
            warn!("population is empty, creating fresh lineages only");
            return Ok(seeds);
        }

        for &mode in self.options.offspring_modes() {
            let wanted = if mode.is_crossover() {
                self.options.crossover_parents()
            } else {
                1
            };
            let count = wanted.min(population.len());
            let picked = self.parents.sample(population.len(), count, &mut self.rng)?;
            debug!(%mode, parents = ?picked, "sampled parents");
            seeds.push(Seed::Offspring {
                mode,
                parents: picked.into_iter().map(|idx| population[idx].clone()).collect(),
            });
        }
        Ok(seeds)
    }

    /// Grows `seeds`, merges them into `population` and selects survivors.
    fn advance(
        &mut self,
        generation: usize,
        mut population: Vec<Lineage>,
        seeds: Vec<Seed>,
    ) -> Result<(Vec<Lineage>, GenerationReport)> {
        let grown = self.grow_all(seeds)?;

        for lineage in &grown {
            for observer in self.observers.iter_mut() {
                observer.on_lineage(generation, lineage);
            }
        }
        if let Some(memory) = self.memory.as_mut() {
            for record in grown.iter().flat_map(|g| g.distilled.iter().cloned()) {
                memory.add(record);
            }
        }

        let created = grown.len();
        let created_ok = grown.iter().filter(|g| g.lineage.is_ok()).count();
        population.extend(grown.into_iter().map(|g| g.lineage));
        let survivors = self
            .survivors
            .select(population, self.options.population_size())?;

        let report =
            GenerationReport::new(generation, &survivors).with_created(created, created_ok);
        for observer in self.observers.iter_mut() {
            observer.on_generation(&report, &survivors, self.memory.as_ref())?;
        }
        Ok((survivors, report))
    }

    /// Grows every seed on the worker pool and waits for all of them.
    fn grow_all(&mut self, seeds: Vec<Seed>) -> Result<Vec<GrownLineage>> {
        let rngs: Vec<RandomNumberGenerator> = seeds.iter().map(|_| self.rng.fork()).collect();
        let known: Vec<InspirationRecord> = self
            .memory
            .as_ref()
            .map(InspirationMemory::snapshot)
            .unwrap_or_default();

        let distiller = self.distiller.as_ref().unwrap_or(&self.oracle);
        let pipeline = CandidatePipeline {
            task: &self.task,
            oracle: self.oracle.as_ref(),
            distiller: distiller.as_ref(),
            extractor: &self.extractor,
            evaluator: &self.evaluator,
            prompts: self.prompts.as_ref(),
            memory: self.memory.as_ref(),
            known_inspirations: &known,
            options: &self.options,
        };

        let results: Vec<Result<GrownLineage>> = self.pool.install(|| {
            seeds
                .par_iter()
                .zip(rngs)
                .map(|(seed, mut rng)| pipeline.grow(seed, &mut rng))
                .collect()
        });

        results.into_iter().collect()
    }
}
