//! Genetic Optimizer Binary
//!
//! Submits an optimization run over the deterministic offline data
//! source, polls the persisted run document until it reaches a terminal
//! state, and prints the top-ranked page of the final population.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use evotrader::application::market_data::MarketDataCache;
use evotrader::application::optimization::GeneticOptimizer;
use evotrader::config::Config;
use evotrader::domain::conditions::{Comparison, Condition, PositionCheckKind, WindowStat};
use evotrader::domain::market::types::OhlcField;
use evotrader::domain::optimization::run::{OptimizerRun, OptimizerSettings};
use evotrader::domain::repositories::OptimizerRunRepository;
use evotrader::domain::trading::allocation::Allocation;
use evotrader::domain::trading::asset::Asset;
use evotrader::domain::trading::portfolio::{CommissionSchedule, Portfolio};
use evotrader::domain::trading::strategy::Strategy;
use evotrader::infrastructure::mock::FixtureMarketDataSource;
use evotrader::infrastructure::repositories::InMemoryOptimizerRunRepository;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Genetic strategy optimizer", long_about = None)]
struct Cli {
    /// Symbol to optimize
    #[arg(short, long, default_value = "COIN")]
    symbol: String,

    /// Training window start (YYYY-MM-DD)
    #[arg(long, default_value = "2021-01-01")]
    train_start: String,

    /// Training window end (YYYY-MM-DD)
    #[arg(long, default_value = "2021-12-31")]
    train_end: String,

    /// Validation window start (YYYY-MM-DD)
    #[arg(long, default_value = "2022-01-01")]
    valid_start: String,

    /// Validation window end (YYYY-MM-DD)
    #[arg(long, default_value = "2022-06-30")]
    valid_end: String,

    /// TOML file with optimizer tuning overrides
    #[arg(long)]
    tuning: Option<String>,
}

/// Optional overrides loaded from a TOML tuning file; anything absent
/// keeps its environment or default value.
#[derive(Debug, Default, Deserialize)]
struct OptimizerTuning {
    population_size: Option<usize>,
    generations: Option<usize>,
    crossover_probability: Option<f64>,
    elitism_ratio: Option<f64>,
    mutation_probability: Option<f64>,
    mutation_intensity: Option<f64>,
    randomization_intensity: Option<f64>,
    batch_size: Option<usize>,
    batch_pause_ms: Option<u64>,
    validation_frequency: Option<usize>,
    save_frequency: Option<usize>,
}

impl OptimizerTuning {
    fn apply_to(&self, settings: &mut OptimizerSettings) {
        macro_rules! overlay {
            ($field:ident) => {
                if let Some(value) = self.$field {
                    settings.$field = value;
                }
            };
        }
        overlay!(population_size);
        overlay!(generations);
        overlay!(crossover_probability);
        overlay!(elitism_ratio);
        overlay!(mutation_probability);
        overlay!(mutation_intensity);
        overlay!(randomization_intensity);
        overlay!(batch_size);
        overlay!(batch_pause_ms);
        overlay!(validation_frequency);
        overlay!(save_frequency);
    }
}

fn load_tuning_from_toml(path: &str) -> Result<OptimizerTuning> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tuning file {}", path))?;
    toml::from_str(&raw).with_context(|| format!("Invalid tuning file {}", path))
}

fn seed_strategy(symbol: &str) -> Strategy {
    Strategy::new(
        "mean-reversion",
        Asset::stock(symbol),
        Allocation::fixed_dollars(Decimal::from(2000)),
        Allocation::percent_of_portfolio(Decimal::from(100)),
    )
    .with_buy_condition(Condition::all(vec![
        Condition::PositionCheck {
            check: PositionCheckKind::Absent,
            target: Decimal::ZERO,
        },
        Condition::StatisticalThreshold {
            field: OhlcField::Close,
            stat: WindowStat::Mean,
            window_days: 20,
            std_devs: -1.0,
            comparison: Comparison::Below,
        },
    ]))
    .with_sell_condition(Condition::PositionDelta {
        comparison: Comparison::Above,
        percent: 5.0,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load config from environment")?;

    let train_start: NaiveDate = cli.train_start.parse().context("Invalid train start")?;
    let train_end: NaiveDate = cli.train_end.parse().context("Invalid train end")?;
    let valid_start: NaiveDate = cli.valid_start.parse().context("Invalid valid start")?;
    let valid_end: NaiveDate = cli.valid_end.parse().context("Invalid valid end")?;

    let mut settings =
        OptimizerSettings::for_windows(train_start, train_end, valid_start, valid_end);
    config.optimizer.apply_to(&mut settings);
    if let Some(path) = &cli.tuning {
        load_tuning_from_toml(path)?.apply_to(&mut settings);
    }

    let source = FixtureMarketDataSource::new().with_walk(
        &cli.symbol,
        train_start - chrono::Duration::days(365),
        (valid_end - train_start).num_days() + 400,
        Decimal::from(100),
    );
    let cache = Arc::new(MarketDataCache::new(Arc::new(source)));
    let runs: Arc<InMemoryOptimizerRunRepository> =
        Arc::new(InMemoryOptimizerRunRepository::new());
    let optimizer = GeneticOptimizer::new(cache, runs.clone());

    let portfolio = Portfolio::new(
        config.initial_buying_power,
        CommissionSchedule::new(config.commission_rate, config.commission_minimum),
    );
    let run = OptimizerRun::new("cli", seed_strategy(&cli.symbol), portfolio, settings);

    println!("Submitting optimizer run for {}...", cli.symbol);
    let run_id = optimizer.submit(run).await?;

    // Observe progress exclusively through the persisted document.
    let mut last_generation = usize::MAX;
    let final_run = loop {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        let Some(run) = runs.find_by_id(&run_id).await? else {
            continue;
        };
        if run.generation != last_generation {
            last_generation = run.generation;
            println!(
                "Generation {}/{} (best training fitness {:?})",
                run.generation,
                run.settings.generations,
                run.population.best().and_then(|b| b.training_fitness)
            );
        }
        if !run.is_active() {
            break run;
        }
    };

    println!("{}", "=".repeat(72));
    println!("Run {} finished: {}", final_run.id, final_run.status);
    if let Some(error) = &final_run.error {
        println!("Error: {}", error);
        std::process::exit(1);
    }
    println!(
        "{:<6} {:>18} {:>18}  genes",
        "rank", "training", "validation"
    );
    for (rank, individual) in final_run.population_page(0).iter().enumerate() {
        let preview: Vec<String> = individual
            .genes
            .iter()
            .take(4)
            .map(|g| format!("{}={:.2}", g.name, g.value))
            .collect();
        println!(
            "{:<6} {:>18.4} {:>18.4}  {}",
            rank + 1,
            individual.training_fitness.unwrap_or(f64::NAN),
            individual.validation_fitness.unwrap_or(f64::NAN),
            preview.join(", ")
        );
    }
    Ok(())
}
