use crate::domain::optimization::population::{FitnessKind, Individual, Population};
use crate::domain::trading::portfolio::Portfolio;
use crate::domain::trading::strategy::Strategy;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Complete,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Tuning knobs for one optimizer run. Serialized into the run document
/// so a killed run can be resumed with identical settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    pub population_size: usize,
    pub generations: usize,
    /// Fraction of the population replaced by crossover children.
    pub crossover_probability: f64,
    /// How the non-parent remainder splits between elites and fresh
    /// random individuals (1.0 = all elites).
    pub elitism_ratio: f64,
    pub mutation_probability: f64,
    /// Weight of the fresh random value when a gene is perturbed.
    pub mutation_intensity: f64,
    /// Weight of the fresh random value when seeding the population.
    pub randomization_intensity: f64,
    /// Concurrent backtests per evaluation batch.
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    /// Re-score the validation window every N generations.
    pub validation_frequency: usize,
    /// Persist run state every N generations.
    pub save_frequency: usize,
    pub fitness: FitnessKind,
    pub training_start: NaiveDate,
    pub training_end: NaiveDate,
    pub validation_start: NaiveDate,
    pub validation_end: NaiveDate,
}

impl OptimizerSettings {
    /// Sensible defaults around a training window; the validation
    /// window trails the training window with the same length.
    pub fn for_windows(
        training_start: NaiveDate,
        training_end: NaiveDate,
        validation_start: NaiveDate,
        validation_end: NaiveDate,
    ) -> Self {
        Self {
            population_size: 24,
            generations: 15,
            crossover_probability: 0.6,
            elitism_ratio: 0.5,
            mutation_probability: 0.15,
            mutation_intensity: 0.5,
            randomization_intensity: 1.0,
            batch_size: 8,
            batch_pause_ms: 100,
            validation_frequency: 5,
            save_frequency: 5,
            fitness: FitnessKind::PercentChange,
            training_start,
            training_end,
            validation_start,
            validation_end,
        }
    }
}

/// The persisted state of one optimizer run. This document is the only
/// channel between a running optimization and its observers: callers
/// poll it by id, they never hold a handle to the worker itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerRun {
    pub id: String,
    pub user_id: String,
    pub strategy: Strategy,
    pub portfolio: Portfolio,
    pub settings: OptimizerSettings,
    pub status: RunStatus,
    /// Last fully completed generation (0 = only the seed population).
    pub generation: usize,
    pub population: Population,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OptimizerRun {
    pub fn new(
        user_id: &str,
        strategy: Strategy,
        portfolio: Portfolio,
        settings: OptimizerSettings,
    ) -> Self {
        let now = Utc::now();
        let capacity = settings.population_size;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            strategy,
            portfolio,
            settings,
            status: RunStatus::Pending,
            generation: 0,
            population: Population::new(capacity),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, RunStatus::Pending | RunStatus::Running)
    }

    pub fn mark_error(&mut self, message: &str) {
        self.status = RunStatus::Error;
        self.error = Some(message.to_string());
        self.updated_at = Utc::now();
    }

    /// Rank-ordered page of the current population for inspection.
    pub fn population_page(&self, page: usize) -> &[Individual] {
        self.population.page(page)
    }
}
