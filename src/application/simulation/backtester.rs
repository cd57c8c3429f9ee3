//! Calendar-stepped historical simulation.
//!
//! One simulator owns one portfolio and walks one day at a time:
//! refresh snapshots from the cache, evaluate every strategy's buy
//! trees then sell trees, size and apply fills, record history, then
//! advance. Everything inside a run is strictly sequential so portfolio
//! state evolves deterministically tick by tick; concurrency lives one
//! level up, in the optimizer's evaluation batches.

use crate::application::market_data::MarketDataCache;
use crate::domain::errors::SimulationError;
use crate::domain::market::price_model::PriceModel;
use crate::domain::market::types::Candle;
use crate::domain::performance::stats::ReturnStats;
use crate::domain::repositories::{OrderRepository, PortfolioRepository};
use crate::domain::trading::allocation::{limit_reached, size_buy, size_sell};
use crate::domain::trading::portfolio::Portfolio;
use crate::domain::trading::strategy::Strategy;
use crate::domain::trading::types::{Order, OrderSide};
use crate::domain::conditions::EvalContext;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationStatus {
    Created,
    Running,
    Complete,
    Error,
}

impl std::fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationOptions {
    pub persist_on_completion: bool,
    pub compute_baseline: bool,
}

/// Where a completed simulation persists its portfolio and orders when
/// asked to. Injected so the simulator compiles and tests against the
/// in-memory fakes.
pub struct SimulationPersistence {
    pub portfolio_id: String,
    pub portfolios: Arc<dyn PortfolioRepository>,
    pub orders: Arc<dyn OrderRepository>,
}

/// Simulated wall clock for a trading day: the 21:00 UTC close.
fn close_of(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(21, 0, 0)
        .expect("21:00:00 is a valid time")
        .and_utc()
}

pub struct BacktestSimulator {
    cache: Arc<MarketDataCache>,
    portfolio: Portfolio,
    strategies: Vec<Strategy>,
    prices: PriceModel,
    /// Prefetched daily history per symbol, reaching back far enough to
    /// cover every condition's trailing window on day one.
    history: HashMap<String, Vec<Candle>>,
    start: NaiveDate,
    end: NaiveDate,
    status: SimulationStatus,
    error: Option<String>,
    buy_history: Vec<Order>,
    sell_history: Vec<Order>,
    equity_curve: Vec<(NaiveDate, Decimal)>,
    stats: Option<ReturnStats>,
    baseline_return_pct: Option<f64>,
    last_buys: Vec<Option<DateTime<Utc>>>,
    last_sells: Vec<Option<DateTime<Utc>>>,
    persistence: Option<SimulationPersistence>,
}

impl BacktestSimulator {
    /// Validate dates and data coverage and prefetch history. Fails
    /// here, never after entering RUNNING, when the window is inverted
    /// or any referenced symbol's cached history starts after the
    /// effective data start.
    pub async fn new(
        portfolio: Portfolio,
        cache: Arc<MarketDataCache>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self> {
        if end <= start {
            return Err(SimulationError::InvalidDateRange { start, end }.into());
        }

        let mut portfolio = portfolio;
        let strategies = std::mem::take(&mut portfolio.strategies);

        let lookback = strategies
            .iter()
            .map(Strategy::max_lookback_days)
            .max()
            .unwrap_or(0);
        let effective_start = start - Duration::days(lookback);

        let mut history: HashMap<String, Vec<Candle>> = HashMap::new();
        for strategy in &strategies {
            for leg in strategy.asset.legs() {
                let symbol = leg.symbol().to_string();
                if history.contains_key(&symbol) {
                    continue;
                }
                let series = cache
                    .history(leg, effective_start, end)
                    .await
                    .with_context(|| format!("Failed to load history for {}", symbol))?;
                let first = series
                    .first()
                    .map(|c| c.date)
                    .unwrap_or(NaiveDate::MAX);
                if first > effective_start {
                    return Err(SimulationError::HistoryStartsTooLate {
                        symbol,
                        required: effective_start,
                        actual: first,
                    }
                    .into());
                }
                history.insert(symbol, series);
            }
        }

        let strategy_count = strategies.len();
        Ok(Self {
            cache,
            portfolio,
            strategies,
            prices: PriceModel::new(),
            history,
            start,
            end,
            status: SimulationStatus::Created,
            error: None,
            buy_history: Vec::new(),
            sell_history: Vec::new(),
            equity_curve: Vec::new(),
            stats: None,
            baseline_return_pct: None,
            last_buys: vec![None; strategy_count],
            last_sells: vec![None; strategy_count],
            persistence: None,
        })
    }

    pub fn with_persistence(mut self, persistence: SimulationPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn status(&self) -> SimulationStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn stats(&self) -> Option<&ReturnStats> {
        self.stats.as_ref()
    }

    pub fn baseline_return_pct(&self) -> Option<f64> {
        self.baseline_return_pct
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn buy_history(&self) -> &[Order] {
        &self.buy_history
    }

    pub fn sell_history(&self) -> &[Order] {
        &self.sell_history
    }

    pub fn equity_curve(&self) -> &[(NaiveDate, Decimal)] {
        &self.equity_curve
    }

    /// Run to the end date. Errors do not propagate: any failure flips
    /// the simulation into ERROR with the message recorded, so the
    /// optimizer can treat a broken individual as a normal bad outcome.
    pub async fn run(&mut self, options: SimulationOptions) -> SimulationStatus {
        if self.status != SimulationStatus::Created {
            self.record_error(&format!(
                "{}",
                SimulationError::NotRunnable {
                    status: self.status.to_string()
                }
            ));
            return self.status;
        }
        self.status = SimulationStatus::Running;

        match self.run_loop(options).await {
            Ok(()) => {
                self.status = SimulationStatus::Complete;
                info!(
                    "Simulator: complete, {} buys / {} sells, final equity {}",
                    self.buy_history.len(),
                    self.sell_history.len(),
                    self.portfolio.total_value()
                );
                if options.persist_on_completion
                    && let Err(e) = self.persist().await
                {
                    warn!("Simulator: failed to persist results: {:#}", e);
                }
            }
            Err(e) => {
                // Debug builds keep a backtrace next to the message; the
                // optimizer only ever reads the first line.
                #[cfg(debug_assertions)]
                let message = format!(
                    "{:#}\n{}",
                    e,
                    std::backtrace::Backtrace::force_capture()
                );
                #[cfg(not(debug_assertions))]
                let message = format!("{:#}", e);
                self.record_error(&message);
            }
        }
        self.status
    }

    fn record_error(&mut self, message: &str) {
        warn!(
            "Simulator: aborting with error: {}",
            message.lines().next().unwrap_or(message)
        );
        self.status = SimulationStatus::Error;
        self.error = Some(message.to_string());
    }

    async fn run_loop(&mut self, options: SimulationOptions) -> Result<()> {
        let assets: Vec<_> = self.strategies.iter().map(|s| s.asset.clone()).collect();
        let mut current = self.start;

        while current <= self.end {
            let snapshots = self.cache.snapshots_on(&assets, current).await;

            // Days without a bar for every referenced symbol are
            // non-trading days for this simulation.
            let tradeable = self.strategies.iter().all(|s| {
                s.asset
                    .quoted_symbols()
                    .iter()
                    .all(|sym| snapshots.contains_key(sym))
            });
            if !tradeable {
                current = current + Duration::days(1);
                continue;
            }

            self.prices.update(snapshots);
            self.portfolio.mark_positions(&self.prices);
            let now = close_of(current);

            let mut strategies = std::mem::take(&mut self.strategies);
            let mut step_result = Ok(());
            for (index, strategy) in strategies.iter_mut().enumerate() {
                step_result = self.step_strategy(index, strategy, now).await;
                if step_result.is_err() {
                    break;
                }
            }
            self.strategies = strategies;
            step_result?;

            self.equity_curve
                .push((current, self.portfolio.total_value()));
            current = current + Duration::days(1);
        }

        self.stats = Some(ReturnStats::from_equity_curve(&self.equity_curve));
        if options.compute_baseline {
            self.baseline_return_pct = self.compute_baseline();
        }
        Ok(())
    }

    async fn step_strategy(
        &mut self,
        index: usize,
        strategy: &mut Strategy,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let symbol = strategy.asset.symbol().to_string();

        // Buying side. Every tree is evaluated so stateful sequences
        // advance, but at most one order fires per tick.
        let buy_blocked = match &self.portfolio.max_allocation {
            Some(limit) => limit_reached(limit, OrderSide::Buy, &self.portfolio)?,
            None => false,
        };
        let mut buy_signal = false;
        for condition in &mut strategy.buy_conditions {
            let ctx = EvalContext {
                asset: &strategy.asset,
                portfolio: &self.portfolio,
                prices: &self.prices,
                position: self.portfolio.position_for(&symbol),
                now,
                history: &self.history,
                last_buy: self.last_buys[index],
                last_sell: self.last_sells[index],
            };
            if condition.evaluate(&ctx)? {
                buy_signal = true;
            }
        }
        if buy_signal && !buy_blocked {
            let quantity = size_buy(
                &strategy.asset,
                &strategy.buy_allocation,
                &self.portfolio,
                &self.prices,
                strategy.aggressiveness,
            )?;
            if quantity > Decimal::ZERO {
                let price = self.prices.resolve_price(
                    &strategy.asset,
                    OrderSide::Buy,
                    strategy.aggressiveness,
                )?;
                let need = quantity * price
                    + self.portfolio.commission.commission_for(quantity * price);
                if need > self.portfolio.buying_power {
                    debug!(
                        "Simulator: skipping buy of {} (need {}, have {})",
                        symbol, need, self.portfolio.buying_power
                    );
                } else {
                    let order =
                        Order::filled(strategy.asset.clone(), OrderSide::Buy, quantity, price, now);
                    self.portfolio.apply(order.clone())?;
                    self.buy_history.push(order);
                    self.last_buys[index] = Some(now);
                }
            }
        }

        // Selling side, restricted to a held position in the symbol.
        if self.portfolio.position_for(&symbol).is_some() {
            let sell_blocked = match &self.portfolio.min_allocation {
                Some(limit) => limit_reached(limit, OrderSide::Sell, &self.portfolio)?,
                None => false,
            };
            let mut sell_signal = false;
            for condition in &mut strategy.sell_conditions {
                let ctx = EvalContext {
                    asset: &strategy.asset,
                    portfolio: &self.portfolio,
                    prices: &self.prices,
                    position: self.portfolio.position_for(&symbol),
                    now,
                    history: &self.history,
                    last_buy: self.last_buys[index],
                    last_sell: self.last_sells[index],
                };
                if condition.evaluate(&ctx)? {
                    sell_signal = true;
                }
            }
            if sell_signal && !sell_blocked {
                let quantity = size_sell(
                    &strategy.asset,
                    &strategy.sell_allocation,
                    &self.portfolio,
                    &self.prices,
                    strategy.aggressiveness,
                )?;
                if quantity > Decimal::ZERO {
                    let price = self.prices.resolve_price(
                        &strategy.asset,
                        OrderSide::Sell,
                        strategy.aggressiveness,
                    )?;
                    let order = Order::filled(
                        strategy.asset.clone(),
                        OrderSide::Sell,
                        quantity,
                        price,
                        now,
                    );
                    self.portfolio.apply(order.clone())?;
                    self.sell_history.push(order);
                    self.last_sells[index] = Some(now);
                }
            }
        }
        Ok(())
    }

    /// Buy-and-hold return of the first strategy's symbol over the
    /// simulated window, as a percent.
    fn compute_baseline(&self) -> Option<f64> {
        let symbol = self.strategies.first()?.asset.symbol();
        let series = self.history.get(symbol)?;
        let window: Vec<&Candle> = series
            .iter()
            .filter(|c| c.date >= self.start && c.date <= self.end)
            .collect();
        let first = window.first()?.close;
        let last = window.last()?.close;
        if first.is_zero() {
            return None;
        }
        ((last - first) / first).to_f64().map(|r| r * 100.0)
    }

    async fn persist(&mut self) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        // Strategies carry sequence progress; put them back before the
        // portfolio document is written.
        self.portfolio.strategies = self.strategies.clone();
        persistence
            .portfolios
            .update(&persistence.portfolio_id, &self.portfolio)
            .await
            .context("Failed to persist portfolio")?;
        for order in self.buy_history.iter().chain(self.sell_history.iter()) {
            persistence
                .orders
                .create(order)
                .await
                .context("Failed to persist order")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conditions::{Comparison, Condition, PositionCheckKind};
    use crate::domain::trading::allocation::Allocation;
    use crate::domain::trading::asset::Asset;
    use crate::domain::trading::portfolio::CommissionSchedule;
    use crate::infrastructure::mock::FixtureMarketDataSource;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn coin_cache() -> Arc<MarketDataCache> {
        let source = FixtureMarketDataSource::new()
            .with_walk("COIN", date(2021, 1, 1), 365, dec!(100));
        Arc::new(MarketDataCache::new(Arc::new(source)))
    }

    fn buy_once_strategy() -> Strategy {
        Strategy::new(
            "coin-entry",
            Asset::stock("COIN"),
            Allocation::fixed_dollars(dec!(2000)),
            Allocation::percent_of_portfolio(dec!(100)),
        )
        .with_buy_condition(Condition::PositionCheck {
            check: PositionCheckKind::Absent,
            target: Decimal::ZERO,
        })
    }

    #[tokio::test]
    async fn test_inverted_dates_fail_construction() {
        let portfolio = Portfolio::new(dec!(10000), CommissionSchedule::free());
        let result = BacktestSimulator::new(
            portfolio,
            coin_cache(),
            date(2021, 6, 1),
            date(2021, 3, 1),
        )
        .await;
        let err = result.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<SimulationError>(),
            Some(SimulationError::InvalidDateRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_late_history_fails_construction() {
        // Source data starts 2021-03-05 but the simulation needs
        // 2021-03-01: within the cache's drift allowance, but too late
        // for the simulator.
        let source = FixtureMarketDataSource::new()
            .with_walk("COIN", date(2021, 3, 5), 120, dec!(100));
        let cache = Arc::new(MarketDataCache::new(Arc::new(source)));

        let mut portfolio = Portfolio::new(dec!(10000), CommissionSchedule::free());
        portfolio.strategies.push(buy_once_strategy());

        let result =
            BacktestSimulator::new(portfolio, cache, date(2021, 3, 1), date(2021, 6, 1)).await;
        let err = result.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<SimulationError>(),
            Some(SimulationError::HistoryStartsTooLate { .. })
        ));
    }

    #[tokio::test]
    async fn test_buy_and_hold_run_completes() {
        let mut portfolio = Portfolio::new(dec!(10000), CommissionSchedule::free());
        portfolio.strategies.push(buy_once_strategy());

        let mut simulator = BacktestSimulator::new(
            portfolio,
            coin_cache(),
            date(2021, 2, 1),
            date(2021, 11, 30),
        )
        .await
        .unwrap();
        assert_eq!(simulator.status(), SimulationStatus::Created);

        let status = simulator
            .run(SimulationOptions {
                persist_on_completion: false,
                compute_baseline: true,
            })
            .await;
        assert_eq!(status, SimulationStatus::Complete);
        assert_eq!(simulator.buy_history().len(), 1);
        assert!(simulator.portfolio().position_for("COIN").is_some());
        assert!(simulator.stats().is_some());
        assert!(simulator.baseline_return_pct().is_some());
        assert!(!simulator.equity_curve().is_empty());
    }

    #[tokio::test]
    async fn test_profit_taking_round_trip() {
        let strategy = buy_once_strategy().with_sell_condition(Condition::PositionDelta {
            comparison: Comparison::Above,
            percent: 2.0,
        });
        let mut portfolio = Portfolio::new(dec!(10000), CommissionSchedule::free());
        portfolio.strategies.push(strategy);

        let mut simulator = BacktestSimulator::new(
            portfolio,
            coin_cache(),
            date(2021, 2, 1),
            date(2021, 11, 30),
        )
        .await
        .unwrap();
        let status = simulator.run(SimulationOptions::default()).await;
        assert_eq!(status, SimulationStatus::Complete);
        // The walk oscillates, so a 2% profit target triggers at least once
        assert!(!simulator.sell_history().is_empty());
        // Each sell liquidates the full position; re-entries may follow
        for sell in simulator.sell_history() {
            assert_eq!(sell.side, OrderSide::Sell);
        }
    }

    #[tokio::test]
    async fn test_rerun_is_rejected() {
        let mut portfolio = Portfolio::new(dec!(10000), CommissionSchedule::free());
        portfolio.strategies.push(buy_once_strategy());
        let mut simulator = BacktestSimulator::new(
            portfolio,
            coin_cache(),
            date(2021, 2, 1),
            date(2021, 4, 1),
        )
        .await
        .unwrap();

        simulator.run(SimulationOptions::default()).await;
        let status = simulator.run(SimulationOptions::default()).await;
        assert_eq!(status, SimulationStatus::Error);
        assert!(simulator.error().unwrap().contains("cannot be run"));
    }
}
