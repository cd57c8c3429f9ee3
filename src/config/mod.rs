//! Configuration loading from environment variables.
//!
//! Every knob has a default so the binaries run with an empty
//! environment; `.env` files are honored via `dotenvy` at startup.

use crate::domain::optimization::population::FitnessKind;
use crate::domain::optimization::run::OptimizerSettings;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub initial_buying_power: Decimal,
    pub commission_rate: Decimal,
    pub commission_minimum: Decimal,
    pub optimizer: OptimizerEnvConfig,
}

/// Optimizer tuning loaded from the environment.
#[derive(Debug, Clone)]
pub struct OptimizerEnvConfig {
    pub population_size: usize,
    pub generations: usize,
    pub crossover_probability: f64,
    pub elitism_ratio: f64,
    pub mutation_probability: f64,
    pub mutation_intensity: f64,
    pub randomization_intensity: f64,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub validation_frequency: usize,
    pub save_frequency: usize,
    pub fitness: FitnessKind,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid {}: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            initial_buying_power: env_parse("INITIAL_BUYING_POWER", Decimal::from(100_000))?,
            commission_rate: env_parse("COMMISSION_RATE", Decimal::new(1, 3))?,
            commission_minimum: env_parse("COMMISSION_MINIMUM", Decimal::ZERO)?,
            optimizer: OptimizerEnvConfig::from_env()?,
        })
    }
}

impl OptimizerEnvConfig {
    pub fn from_env() -> Result<Self> {
        let fitness = match env::var("FITNESS_KIND") {
            Ok(raw) => FitnessKind::from_str(&raw)?,
            Err(_) => FitnessKind::PercentChange,
        };
        Ok(Self {
            population_size: env_parse("POPULATION_SIZE", 24)?,
            generations: env_parse("GENERATIONS", 15)?,
            crossover_probability: env_parse("CROSSOVER_PROBABILITY", 0.6)?,
            elitism_ratio: env_parse("ELITISM_RATIO", 0.5)?,
            mutation_probability: env_parse("MUTATION_PROBABILITY", 0.15)?,
            mutation_intensity: env_parse("MUTATION_INTENSITY", 0.5)?,
            randomization_intensity: env_parse("RANDOMIZATION_INTENSITY", 1.0)?,
            batch_size: env_parse("BATCH_SIZE", 8)?,
            batch_pause_ms: env_parse("BATCH_PAUSE_MS", 100)?,
            validation_frequency: env_parse("VALIDATION_FREQUENCY", 5)?,
            save_frequency: env_parse("SAVE_FREQUENCY", 5)?,
            fitness,
        })
    }

    /// Overlay these values onto window-scoped settings.
    pub fn apply_to(&self, settings: &mut OptimizerSettings) {
        settings.population_size = self.population_size;
        settings.generations = self.generations;
        settings.crossover_probability = self.crossover_probability;
        settings.elitism_ratio = self.elitism_ratio;
        settings.mutation_probability = self.mutation_probability;
        settings.mutation_intensity = self.mutation_intensity;
        settings.randomization_intensity = self.randomization_intensity;
        settings.batch_size = self.batch_size;
        settings.batch_pause_ms = self.batch_pause_ms;
        settings.validation_frequency = self.validation_frequency;
        settings.save_frequency = self.save_frequency;
        settings.fitness = self.fitness;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_with_empty_env() {
        // Env vars are process-global; only assert on keys no test sets.
        let config = OptimizerEnvConfig::from_env().unwrap();
        assert!(config.population_size > 0);
        assert!(config.batch_size > 0);
        assert!((0.0..=1.0).contains(&config.mutation_probability));
    }

    #[test]
    fn test_apply_to_overlays_settings() {
        let mut settings = OptimizerSettings::for_windows(
            chrono::NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2021, 6, 30).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2021, 7, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2021, 12, 31).unwrap(),
        );
        let mut env_config = OptimizerEnvConfig::from_env().unwrap();
        env_config.population_size = 48;
        env_config.fitness = FitnessKind::Sortino;
        env_config.apply_to(&mut settings);
        assert_eq!(settings.population_size, 48);
        assert_eq!(settings.fitness, FitnessKind::Sortino);
    }
}
