//! Genetic strategy optimizer.
//!
//! Evolves a population of gene vectors by running one backtest per
//! individual per generation. A submitted run executes on a detached
//! task and communicates exclusively through its persisted run
//! document; callers poll the repository to observe progress. The only
//! backpressure is the bounded evaluation batch plus the inter-batch
//! pause, sized so a full population cannot exhaust the market data
//! cache's fetch budget or host memory.

use crate::application::market_data::MarketDataCache;
use crate::application::optimization::evolution::{
    self, SelectionMode, crossover, mutate, randomize, select_parents,
};
use crate::application::simulation::backtester::{
    BacktestSimulator, SimulationOptions, SimulationStatus,
};
use crate::domain::conditions::MAX_WINDOW_DAYS;
use crate::domain::errors::OptimizationError;
use crate::domain::optimization::encoding::{decode, encode, repair};
use crate::domain::optimization::gene::GeneVector;
use crate::domain::optimization::population::{FitnessKind, Individual};
use crate::domain::optimization::run::{OptimizerRun, RunStatus};
use crate::domain::repositories::OptimizerRunRepository;
use crate::domain::trading::portfolio::Portfolio;
use crate::domain::trading::strategy::Strategy;
use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use futures::future::join_all;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct GeneticOptimizer {
    cache: Arc<MarketDataCache>,
    runs: Arc<dyn OptimizerRunRepository>,
}

impl GeneticOptimizer {
    pub fn new(cache: Arc<MarketDataCache>, runs: Arc<dyn OptimizerRunRepository>) -> Self {
        Self { cache, runs }
    }

    /// Persist the run document and start it on a detached task.
    /// Returns the run id immediately; progress and the terminal state
    /// are observed only by polling the repository.
    pub async fn submit(&self, run: OptimizerRun) -> Result<String> {
        let id = run.id.clone();
        self.runs.create(&run).await.context("Failed to create run")?;

        let optimizer = self.clone();
        let run_id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = optimizer.execute(&run_id).await {
                error!("Optimizer: run {} failed to start: {:#}", run_id, e);
            }
        });
        Ok(id)
    }

    /// Load a run by id and drive it to a terminal state. Resumes from
    /// the last completed generation if the document already has one.
    pub async fn execute(&self, run_id: &str) -> Result<RunStatus> {
        let mut run = self
            .runs
            .find_by_id(run_id)
            .await?
            .ok_or_else(|| OptimizationError::RunNotFound {
                id: run_id.to_string(),
            })?;
        Ok(self.drive(&mut run).await)
    }

    /// Run the generation loop, converting any error into a persisted
    /// terminal ERROR status. Never retries, never panics the host.
    pub async fn drive(&self, run: &mut OptimizerRun) -> RunStatus {
        run.status = RunStatus::Running;
        run.updated_at = Utc::now();
        if let Err(e) = self.runs.update(run).await {
            error!("Optimizer: failed to persist RUNNING status: {:#}", e);
        }

        match self.generation_loop(run).await {
            Ok(()) => {
                run.status = RunStatus::Complete;
                info!(
                    "Optimizer: run {} complete after {} generations, best fitness {:?}",
                    run.id,
                    run.generation,
                    run.population.best().and_then(|b| b.training_fitness)
                );
            }
            Err(e) => {
                error!("Optimizer: run {} aborted: {:#}", run.id, e);
                run.mark_error(&format!("{:#}", e));
            }
        }
        run.updated_at = Utc::now();
        if let Err(e) = self.runs.update(run).await {
            error!("Optimizer: failed to persist terminal state: {:#}", e);
        }
        run.status
    }

    /// Bulk-mark every still PENDING/RUNNING run for a user as ERROR.
    /// Called after a host restart so no run hangs forever.
    pub async fn mark_interrupted_runs(&self, user_id: &str) -> Result<usize> {
        let active = self.runs.find_active_for_user(user_id).await?;
        let count = active.len();
        for mut run in active {
            info!("Optimizer: marking interrupted run {} as ERROR", run.id);
            run.mark_error("interrupted by host restart");
            self.runs.update(&run).await?;
        }
        Ok(count)
    }

    async fn generation_loop(&self, run: &mut OptimizerRun) -> Result<()> {
        let settings = run.settings.clone();
        let initial_value = run.portfolio.total_value();
        let template = encode(&run.strategy, initial_value);
        let mut rng = StdRng::from_os_rng();

        self.warm_cache(run).await;

        if run.population.is_empty() {
            info!(
                "Optimizer: seeding population of {} ({} genes each)",
                settings.population_size,
                template.len()
            );
            for _ in 0..settings.population_size {
                let mut genes =
                    randomize(&template, settings.randomization_intensity, &mut rng);
                repair(&mut genes, initial_value);
                run.population.individuals.push(Individual::new(genes));
            }
        }

        // Score whatever is unscored: the fresh seed, or the survivors
        // of a resumed run.
        self.score_population(run, Window::Training, true).await?;
        self.score_population(run, Window::Validation, true).await?;
        run.population.rank(settings.fitness);
        if run.generation == 0 {
            self.runs.update(run).await?;
        }

        let parents = (settings.population_size as f64 * settings.crossover_probability)
            .floor() as usize;
        let remainder = settings.population_size.saturating_sub(parents);
        let elites = (remainder as f64 * settings.elitism_ratio).floor() as usize;
        let fresh = remainder - elites;

        for generation in (run.generation + 1)..=settings.generations {
            let mode = SelectionMode::coin_flip(&mut rng);
            debug!(
                "Optimizer: generation {} using {:?} selection",
                generation, mode
            );

            let mut children = Vec::with_capacity(parents + fresh);
            for _ in 0..parents {
                let (a, b) = select_parents(
                    &run.population.individuals,
                    settings.fitness,
                    mode,
                    &mut rng,
                );
                let mut genes = crossover(
                    &run.population.individuals[a].genes,
                    &run.population.individuals[b].genes,
                    &mut rng,
                );
                mutate(
                    &mut genes,
                    settings.mutation_probability,
                    settings.mutation_intensity,
                    &mut rng,
                );
                repair(&mut genes, initial_value);
                children.push(Individual::new(genes));
            }
            for _ in 0..fresh {
                let mut genes =
                    evolution::randomize(&template, settings.randomization_intensity, &mut rng);
                repair(&mut genes, initial_value);
                children.push(Individual::new(genes));
            }

            // Elites survive unconditionally; everything else is
            // replaced by the new brood before scoring.
            run.population.individuals.truncate(elites);
            run.population.individuals.extend(children);
            self.score_population(run, Window::Training, true).await?;
            run.population.rank(settings.fitness);
            run.population
                .individuals
                .truncate(settings.population_size);

            if settings.validation_frequency > 0
                && generation % settings.validation_frequency == 0
            {
                self.score_population(run, Window::Validation, false).await?;
            }

            run.generation = generation;
            run.updated_at = Utc::now();
            info!(
                "Optimizer: generation {}/{} best {:?}",
                generation,
                settings.generations,
                run.population.best().and_then(|b| b.training_fitness)
            );
            if settings.save_frequency > 0 && generation % settings.save_frequency == 0 {
                self.runs.update(run).await?;
            }
        }
        Ok(())
    }

    /// Prefetch history at the deepest lookback any genotype can ask
    /// for, so every simulator construction afterwards is a cache hit
    /// and the fetch budget stays untouched by population size. Best
    /// effort: a symbol that cannot be warmed fails per-individual
    /// during evaluation and scores worst there.
    async fn warm_cache(&self, run: &OptimizerRun) {
        let settings = &run.settings;
        let earliest = settings
            .training_start
            .min(settings.validation_start)
            - Duration::days(MAX_WINDOW_DAYS);
        let latest = settings.training_end.max(settings.validation_end);
        for leg in run.strategy.asset.legs() {
            if let Err(e) = self.cache.history(leg, earliest, latest).await {
                warn!(
                    "Optimizer: could not warm cache for {}: {:#}",
                    leg.symbol(),
                    e
                );
            }
        }
    }

    async fn score_population(
        &self,
        run: &mut OptimizerRun,
        window: Window,
        only_unscored: bool,
    ) -> Result<()> {
        let settings = run.settings.clone();
        let initial_value = run.portfolio.total_value();
        let (start, end) = match window {
            Window::Training => (settings.training_start, settings.training_end),
            Window::Validation => (settings.validation_start, settings.validation_end),
        };

        let indices: Vec<usize> = run
            .population
            .individuals
            .iter()
            .enumerate()
            .filter(|(_, individual)| {
                !only_unscored
                    || match window {
                        Window::Training => individual.training_fitness.is_none(),
                        Window::Validation => individual.validation_fitness.is_none(),
                    }
            })
            .map(|(idx, _)| idx)
            .collect();

        let batch_size = settings.batch_size.max(1);
        let mut chunks = indices.chunks(batch_size).peekable();
        while let Some(chunk) = chunks.next() {
            let mut handles = Vec::with_capacity(chunk.len());
            for &idx in chunk {
                let cache = self.cache.clone();
                let template = run.strategy.clone();
                let portfolio = run.portfolio.clone();
                let genes = run.population.individuals[idx].genes.clone();
                let fitness = settings.fitness;
                handles.push(tokio::spawn(async move {
                    let score = evaluate_genotype(
                        cache,
                        template,
                        portfolio,
                        genes,
                        start,
                        end,
                        fitness,
                        initial_value,
                    )
                    .await;
                    (idx, score)
                }));
            }
            for joined in join_all(handles).await {
                let (idx, score) = joined.context("Fitness evaluation task panicked")?;
                let individual = &mut run.population.individuals[idx];
                match window {
                    Window::Training => individual.training_fitness = Some(score),
                    Window::Validation => individual.validation_fitness = Some(score),
                }
            }
            if settings.batch_pause_ms > 0 && chunks.peek().is_some() {
                sleep(std::time::Duration::from_millis(settings.batch_pause_ms)).await;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    Training,
    Validation,
}

/// Score one genotype with its own decoded strategy and portfolio copy.
/// A failure anywhere (malformed vector, missing history, aborted
/// simulation) scores worst-case instead of aborting the generation.
#[allow(clippy::too_many_arguments)]
async fn evaluate_genotype(
    cache: Arc<MarketDataCache>,
    template: Strategy,
    mut portfolio: Portfolio,
    genes: GeneVector,
    start: NaiveDate,
    end: NaiveDate,
    fitness: FitnessKind,
    initial_value: Decimal,
) -> f64 {
    let strategy = match decode(&template, &genes, initial_value) {
        Ok(strategy) => strategy,
        Err(e) => {
            debug!("Optimizer: undecodable genotype scored worst: {}", e);
            return fitness.worst();
        }
    };
    portfolio.strategies = vec![strategy];

    let mut simulator = match BacktestSimulator::new(portfolio, cache, start, end).await {
        Ok(simulator) => simulator,
        Err(e) => {
            debug!("Optimizer: simulator construction failed, scored worst: {:#}", e);
            return fitness.worst();
        }
    };
    match simulator.run(SimulationOptions::default()).await {
        SimulationStatus::Complete => simulator
            .stats()
            .map(|stats| fitness.score(stats))
            .unwrap_or(fitness.worst()),
        _ => fitness.worst(),
    }
}
