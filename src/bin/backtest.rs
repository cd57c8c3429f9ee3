//! Backtest Runner Binary
//!
//! Runs one strategy against the deterministic offline data source and
//! prints the resulting statistics.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use evotrader::application::market_data::MarketDataCache;
use evotrader::application::simulation::{BacktestSimulator, SimulationOptions, SimulationStatus};
use evotrader::config::Config;
use evotrader::domain::conditions::{Comparison, Condition, PositionCheckKind, WindowStat};
use evotrader::domain::market::types::OhlcField;
use evotrader::domain::trading::allocation::Allocation;
use evotrader::domain::trading::asset::Asset;
use evotrader::domain::trading::portfolio::{CommissionSchedule, Portfolio};
use evotrader::domain::trading::strategy::Strategy;
use evotrader::infrastructure::mock::FixtureMarketDataSource;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Historical strategy backtest", long_about = None)]
struct Cli {
    /// Symbol to trade
    #[arg(short, long, default_value = "COIN")]
    symbol: String,

    /// Start date (YYYY-MM-DD)
    #[arg(long, default_value = "2021-02-01")]
    start: String,

    /// End date (YYYY-MM-DD)
    #[arg(long, default_value = "2021-11-30")]
    end: String,

    /// Dollars committed per entry
    #[arg(long, default_value = "2000")]
    entry_dollars: Decimal,

    /// Take-profit threshold in percent
    #[arg(long, default_value = "5")]
    take_profit_pct: f64,

    /// Also report the buy-and-hold baseline
    #[arg(long, default_value_t = true)]
    baseline: bool,
}

/// Mean-reversion demo strategy: enter flat below the 20-day mean less
/// one standard deviation, exit on the profit target or a stretched
/// price.
fn demo_strategy(symbol: &str, entry_dollars: Decimal, take_profit_pct: f64) -> Strategy {
    Strategy::new(
        "mean-reversion",
        Asset::stock(symbol),
        Allocation::fixed_dollars(entry_dollars),
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
    .with_sell_condition(Condition::any(vec![
        Condition::PositionDelta {
            comparison: Comparison::Above,
            percent: take_profit_pct,
        },
        Condition::StatisticalThreshold {
            field: OhlcField::Close,
            stat: WindowStat::Mean,
            window_days: 20,
            std_devs: 1.0,
            comparison: Comparison::Above,
        },
    ]))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load config from environment")?;

    let start: NaiveDate = cli.start.parse().context("Invalid start date")?;
    let end: NaiveDate = cli.end.parse().context("Invalid end date")?;

    let source = FixtureMarketDataSource::new().with_walk(
        &cli.symbol,
        start - chrono::Duration::days(365),
        (end - start).num_days() + 400,
        Decimal::from(100),
    );
    let cache = Arc::new(MarketDataCache::new(Arc::new(source)));

    let mut portfolio = Portfolio::new(
        config.initial_buying_power,
        CommissionSchedule::new(config.commission_rate, config.commission_minimum),
    );
    portfolio.strategies.push(demo_strategy(
        &cli.symbol,
        cli.entry_dollars,
        cli.take_profit_pct,
    ));

    let mut simulator = BacktestSimulator::new(portfolio, cache, start, end)
        .await
        .context("Failed to construct simulator")?;
    let status = simulator
        .run(SimulationOptions {
            persist_on_completion: false,
            compute_baseline: cli.baseline,
        })
        .await;

    match status {
        SimulationStatus::Complete => {
            let stats = simulator.stats().expect("complete run has stats");
            println!("{}", "=".repeat(60));
            println!("Backtest {} {} -> {}", cli.symbol, start, end);
            println!("{}", "=".repeat(60));
            println!("Buys:          {}", simulator.buy_history().len());
            println!("Sells:         {}", simulator.sell_history().len());
            println!("Final equity:  {:.2}", stats.final_equity);
            println!("Return:        {:.2}%", stats.percent_change);
            println!("Sharpe:        {:.3}", stats.sharpe_ratio);
            println!("Sortino:       {:.3}", stats.sortino_ratio);
            println!("Max drawdown:  {:.2}%", stats.max_drawdown_pct);
            if let Some(baseline) = simulator.baseline_return_pct() {
                println!("Buy & hold:    {:.2}%", baseline);
            }
        }
        _ => {
            eprintln!(
                "Backtest failed: {}",
                simulator.error().unwrap_or("unknown error")
            );
            std::process::exit(1);
        }
    }
    Ok(())
}
