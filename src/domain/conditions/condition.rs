//! Boolean condition trees.
//!
//! A `Condition` is a closed recursive sum type: leaves read the
//! evaluation context, compounds combine children. Every variant also
//! describes its tunable fields as an ordered gene list; `apply_tunables`
//! consumes genes in exactly the order `tunable_fields` emits them, which
//! is what makes gene vectors structural (see the optimizer encoding).

use crate::domain::conditions::context::EvalContext;
use crate::domain::errors::OptimizationError;
use crate::domain::market::types::OhlcField;
use crate::domain::optimization::gene::Gene;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution, Max, Min};

/// Upper bound of every trailing-window gene, in days. Pre-warming a
/// cache this far back guarantees any genotype can be simulated.
pub const MAX_WINDOW_DAYS: i64 = 252;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Above,
    Below,
}

impl Comparison {
    pub const CHOICES: [&'static str; 2] = ["above", "below"];

    pub fn index(&self) -> usize {
        match self {
            Comparison::Above => 0,
            Comparison::Below => 1,
        }
    }

    pub fn from_index(idx: usize) -> Self {
        if idx == 0 {
            Comparison::Above
        } else {
            Comparison::Below
        }
    }

    pub fn holds(&self, left: Decimal, right: Decimal) -> bool {
        match self {
            Comparison::Above => left > right,
            Comparison::Below => left < right,
        }
    }

    fn holds_f64(&self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Above => left > right,
            Comparison::Below => left < right,
        }
    }
}

/// Which reduction a statistical-threshold condition applies over its
/// trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowStat {
    Mean,
    Min,
    Max,
}

impl WindowStat {
    pub const CHOICES: [&'static str; 3] = ["mean", "min", "max"];

    pub fn index(&self) -> usize {
        match self {
            WindowStat::Mean => 0,
            WindowStat::Min => 1,
            WindowStat::Max => 2,
        }
    }

    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => WindowStat::Mean,
            1 => WindowStat::Min,
            _ => WindowStat::Max,
        }
    }
}

/// Which side of the strategy's own trade history an elapsed-time
/// condition measures from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeMarker {
    LastBuy,
    LastSell,
}

impl TradeMarker {
    pub const CHOICES: [&'static str; 2] = ["last-buy", "last-sell"];

    pub fn index(&self) -> usize {
        match self {
            TradeMarker::LastBuy => 0,
            TradeMarker::LastSell => 1,
        }
    }

    pub fn from_index(idx: usize) -> Self {
        if idx == 0 {
            TradeMarker::LastBuy
        } else {
            TradeMarker::LastSell
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionCheckKind {
    Absent,
    Present,
    QuantityAbove,
    QuantityBelow,
}

impl PositionCheckKind {
    pub const CHOICES: [&'static str; 4] =
        ["absent", "present", "quantity-above", "quantity-below"];

    pub fn index(&self) -> usize {
        match self {
            PositionCheckKind::Absent => 0,
            PositionCheckKind::Present => 1,
            PositionCheckKind::QuantityAbove => 2,
            PositionCheckKind::QuantityBelow => 3,
        }
    }

    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => PositionCheckKind::Absent,
            1 => PositionCheckKind::Present,
            2 => PositionCheckKind::QuantityAbove,
            _ => PositionCheckKind::QuantityBelow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueScope {
    Portfolio,
    Position,
}

impl ValueScope {
    pub const CHOICES: [&'static str; 2] = ["portfolio", "position"];

    pub fn index(&self) -> usize {
        match self {
            ValueScope::Portfolio => 0,
            ValueScope::Position => 1,
        }
    }

    pub fn from_index(idx: usize) -> Self {
        if idx == 0 {
            ValueScope::Portfolio
        } else {
            ValueScope::Position
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// Current mid price of the target symbol against a fixed threshold.
    PriceThreshold {
        comparison: Comparison,
        threshold: Decimal,
    },
    /// Current mid price against a rolling statistic of an OHLC field,
    /// offset by a number of standard deviations.
    StatisticalThreshold {
        field: OhlcField,
        stat: WindowStat,
        window_days: i64,
        std_devs: f64,
        comparison: Comparison,
    },
    /// Percent change of the held position against its average cost.
    PositionDelta {
        comparison: Comparison,
        percent: f64,
    },
    /// Days elapsed since this strategy's last buy or sell. Satisfied
    /// when at least `days` have passed, or when no such trade exists yet.
    ElapsedTime { marker: TradeMarker, days: i64 },
    /// Presence or quantity of the position in the target symbol.
    PositionCheck {
        check: PositionCheckKind,
        target: Decimal,
    },
    /// Total portfolio value or current position value vs a threshold.
    ValueThreshold {
        scope: ValueScope,
        comparison: Comparison,
        threshold: Decimal,
    },
    /// Available buying power vs a threshold.
    BuyingPowerThreshold {
        comparison: Comparison,
        threshold: Decimal,
    },
    /// True iff every child is true; stops at the first false child.
    All { children: Vec<Condition> },
    /// True iff at least one child is true; stops at the first true child.
    Any { children: Vec<Condition> },
    /// Children must each become true exactly once, strictly in order,
    /// across evaluation calls. Trigger timestamps are the retained
    /// progress. When `expires_after_days` elapses from the FIRST
    /// trigger without completion, progress resets to empty.
    Sequence {
        children: Vec<Condition>,
        #[serde(default)]
        triggered: Vec<DateTime<Utc>>,
        expires_after_days: Option<i64>,
    },
}

impl Condition {
    pub fn all(children: Vec<Condition>) -> Self {
        Condition::All { children }
    }

    pub fn any(children: Vec<Condition>) -> Self {
        Condition::Any { children }
    }

    pub fn sequence(children: Vec<Condition>, expires_after_days: Option<i64>) -> Self {
        Condition::Sequence {
            children,
            triggered: Vec::new(),
            expires_after_days,
        }
    }

    /// Evaluate against the current tick. Only `Sequence` mutates
    /// itself (its trigger progress); every other variant is pure.
    pub fn evaluate(&mut self, ctx: &EvalContext<'_>) -> Result<bool> {
        match self {
            Condition::PriceThreshold {
                comparison,
                threshold,
            } => {
                let price = ctx.prices.mid(ctx.asset.symbol())?;
                Ok(comparison.holds(price, *threshold))
            }
            Condition::StatisticalThreshold {
                field,
                stat,
                window_days,
                std_devs,
                comparison,
            } => {
                let window = ctx.trailing_window(*window_days);
                let values: Vec<f64> = window
                    .iter()
                    .filter_map(|c| field.of(c).to_f64())
                    .collect();
                if values.len() < 2 {
                    return Ok(false);
                }
                // f64 boundary for the statistical library
                let data = Data::new(values);
                let center = match stat {
                    WindowStat::Mean => data.mean(),
                    WindowStat::Min => Some(data.min()),
                    WindowStat::Max => Some(data.max()),
                };
                let (Some(center), Some(deviation)) = (center, data.std_dev()) else {
                    return Ok(false);
                };
                let bound = center + *std_devs * deviation;
                let price = ctx
                    .prices
                    .mid(ctx.asset.symbol())?
                    .to_f64()
                    .unwrap_or(0.0);
                Ok(comparison.holds_f64(price, bound))
            }
            Condition::PositionDelta {
                comparison,
                percent,
            } => {
                let Some(position) = ctx.position else {
                    return Ok(false);
                };
                let change = position.percent_change().to_f64().unwrap_or(0.0);
                Ok(comparison.holds_f64(change, *percent))
            }
            Condition::ElapsedTime { marker, days } => {
                let since = match marker {
                    TradeMarker::LastBuy => ctx.last_buy,
                    TradeMarker::LastSell => ctx.last_sell,
                };
                match since {
                    // Never traded: nothing to wait out.
                    None => Ok(true),
                    Some(ts) => Ok(ctx.now - ts >= Duration::days(*days)),
                }
            }
            Condition::PositionCheck { check, target } => {
                let quantity = ctx
                    .position
                    .map(|p| p.quantity)
                    .unwrap_or(Decimal::ZERO);
                Ok(match check {
                    PositionCheckKind::Absent => ctx.position.is_none(),
                    PositionCheckKind::Present => ctx.position.is_some(),
                    PositionCheckKind::QuantityAbove => quantity > *target,
                    PositionCheckKind::QuantityBelow => quantity < *target,
                })
            }
            Condition::ValueThreshold {
                scope,
                comparison,
                threshold,
            } => {
                let value = match scope {
                    ValueScope::Portfolio => ctx.portfolio.total_value(),
                    ValueScope::Position => ctx
                        .position
                        .map(|p| p.market_value())
                        .unwrap_or(Decimal::ZERO),
                };
                Ok(comparison.holds(value, *threshold))
            }
            Condition::BuyingPowerThreshold {
                comparison,
                threshold,
            } => Ok(comparison.holds(ctx.portfolio.buying_power, *threshold)),
            Condition::All { children } => {
                for child in children {
                    if !child.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any { children } => {
                for child in children {
                    if child.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Sequence {
                children,
                triggered,
                expires_after_days,
            } => {
                if let (Some(days), Some(first)) = (*expires_after_days, triggered.first().copied())
                    && triggered.len() < children.len()
                    && ctx.now - first > Duration::days(days)
                {
                    triggered.clear();
                }
                while triggered.len() < children.len() {
                    let next = triggered.len();
                    if children[next].evaluate(ctx)? {
                        triggered.push(ctx.now);
                    } else {
                        break;
                    }
                }
                Ok(triggered.len() == children.len())
            }
        }
    }

    /// How many days of history before the simulation start this
    /// condition needs to evaluate on day one.
    pub fn lookback_days(&self) -> i64 {
        match self {
            Condition::StatisticalThreshold { window_days, .. } => *window_days,
            Condition::All { children }
            | Condition::Any { children }
            | Condition::Sequence { children, .. } => children
                .iter()
                .map(Condition::lookback_days)
                .max()
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Ordered gene descriptors for this node's own fields, then its
    /// children's, recursively. The same listing backs user-facing
    /// configuration and optimizer encoding.
    pub fn tunable_fields(&self) -> Vec<Gene> {
        let mut genes = Vec::new();
        self.collect_fields(&mut genes);
        genes
    }

    fn collect_fields(&self, genes: &mut Vec<Gene>) {
        match self {
            Condition::PriceThreshold {
                comparison,
                threshold,
            } => {
                genes.push(Gene::categorical(
                    "price_threshold.comparison",
                    comparison.index(),
                    &Comparison::CHOICES,
                ));
                genes.push(threshold_gene("price_threshold.threshold", *threshold));
            }
            Condition::StatisticalThreshold {
                field,
                stat,
                window_days,
                std_devs,
                comparison,
            } => {
                genes.push(Gene::categorical(
                    "statistical_threshold.field",
                    field.index(),
                    &OhlcField::CHOICES,
                ));
                genes.push(Gene::categorical(
                    "statistical_threshold.stat",
                    stat.index(),
                    &WindowStat::CHOICES,
                ));
                genes.push(Gene::integer(
                    "statistical_threshold.window_days",
                    *window_days,
                    2,
                    MAX_WINDOW_DAYS,
                ));
                genes.push(Gene::continuous(
                    "statistical_threshold.std_devs",
                    *std_devs,
                    -4.0,
                    4.0,
                ));
                genes.push(Gene::categorical(
                    "statistical_threshold.comparison",
                    comparison.index(),
                    &Comparison::CHOICES,
                ));
            }
            Condition::PositionDelta {
                comparison,
                percent,
            } => {
                genes.push(Gene::categorical(
                    "position_delta.comparison",
                    comparison.index(),
                    &Comparison::CHOICES,
                ));
                genes.push(Gene::continuous(
                    "position_delta.percent",
                    *percent,
                    -100.0,
                    100.0,
                ));
            }
            Condition::ElapsedTime { marker, days } => {
                genes.push(Gene::categorical(
                    "elapsed_time.marker",
                    marker.index(),
                    &TradeMarker::CHOICES,
                ));
                genes.push(Gene::integer("elapsed_time.days", *days, 1, 90));
            }
            Condition::PositionCheck { check, target } => {
                genes.push(Gene::categorical(
                    "position_check.check",
                    check.index(),
                    &PositionCheckKind::CHOICES,
                ));
                genes.push(threshold_gene("position_check.target", *target));
            }
            Condition::ValueThreshold {
                scope,
                comparison,
                threshold,
            } => {
                genes.push(Gene::categorical(
                    "value_threshold.scope",
                    scope.index(),
                    &ValueScope::CHOICES,
                ));
                genes.push(Gene::categorical(
                    "value_threshold.comparison",
                    comparison.index(),
                    &Comparison::CHOICES,
                ));
                genes.push(threshold_gene("value_threshold.threshold", *threshold));
            }
            Condition::BuyingPowerThreshold {
                comparison,
                threshold,
            } => {
                genes.push(Gene::categorical(
                    "buying_power_threshold.comparison",
                    comparison.index(),
                    &Comparison::CHOICES,
                ));
                genes.push(threshold_gene(
                    "buying_power_threshold.threshold",
                    *threshold,
                ));
            }
            Condition::All { children } | Condition::Any { children } => {
                for child in children {
                    child.collect_fields(genes);
                }
            }
            Condition::Sequence {
                children,
                expires_after_days,
                ..
            } => {
                if let Some(days) = expires_after_days {
                    genes.push(Gene::integer("sequence.expires_after_days", *days, 1, 90));
                }
                for child in children {
                    child.collect_fields(genes);
                }
            }
        }
    }

    /// Write gene values back, consuming from the iterator in the same
    /// order `tunable_fields` emits. Running out of genes is a
    /// malformed-vector programmer error.
    pub fn apply_tunables<'a, I>(&mut self, genes: &mut I) -> Result<(), OptimizationError>
    where
        I: Iterator<Item = &'a Gene>,
    {
        match self {
            Condition::PriceThreshold {
                comparison,
                threshold,
            } => {
                *comparison = Comparison::from_index(next_gene(genes)?.as_index());
                *threshold = next_gene(genes)?.as_decimal();
            }
            Condition::StatisticalThreshold {
                field,
                stat,
                window_days,
                std_devs,
                comparison,
            } => {
                *field = OhlcField::from_index(next_gene(genes)?.as_index());
                *stat = WindowStat::from_index(next_gene(genes)?.as_index());
                *window_days = next_gene(genes)?.as_i64();
                *std_devs = next_gene(genes)?.value;
                *comparison = Comparison::from_index(next_gene(genes)?.as_index());
            }
            Condition::PositionDelta {
                comparison,
                percent,
            } => {
                *comparison = Comparison::from_index(next_gene(genes)?.as_index());
                *percent = next_gene(genes)?.value;
            }
            Condition::ElapsedTime { marker, days } => {
                *marker = TradeMarker::from_index(next_gene(genes)?.as_index());
                *days = next_gene(genes)?.as_i64();
            }
            Condition::PositionCheck { check, target } => {
                *check = PositionCheckKind::from_index(next_gene(genes)?.as_index());
                *target = next_gene(genes)?.as_decimal();
            }
            Condition::ValueThreshold {
                scope,
                comparison,
                threshold,
            } => {
                *scope = ValueScope::from_index(next_gene(genes)?.as_index());
                *comparison = Comparison::from_index(next_gene(genes)?.as_index());
                *threshold = next_gene(genes)?.as_decimal();
            }
            Condition::BuyingPowerThreshold {
                comparison,
                threshold,
            } => {
                *comparison = Comparison::from_index(next_gene(genes)?.as_index());
                *threshold = next_gene(genes)?.as_decimal();
            }
            Condition::All { children } | Condition::Any { children } => {
                for child in children {
                    child.apply_tunables(genes)?;
                }
            }
            Condition::Sequence {
                children,
                expires_after_days,
                ..
            } => {
                if let Some(days) = expires_after_days {
                    *days = next_gene(genes)?.as_i64();
                }
                for child in children {
                    child.apply_tunables(genes)?;
                }
            }
        }
        Ok(())
    }
}

/// Thresholds get a range proportional to their current value so the
/// optimizer explores around the user's setting; a floor keeps
/// zero-valued thresholds tunable at all.
fn threshold_gene(name: &str, current: Decimal) -> Gene {
    let value = Gene::from_decimal(current);
    let max = (value * 2.0).max(100.0);
    Gene::continuous(name, value, 0.0, max)
}

fn next_gene<'a, I>(genes: &mut I) -> Result<&'a Gene, OptimizationError>
where
    I: Iterator<Item = &'a Gene>,
{
    genes.next().ok_or(OptimizationError::ExhaustedVector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::price_model::PriceModel;
    use crate::domain::market::types::{Candle, PriceSnapshot};
    use crate::domain::trading::asset::Asset;
    use crate::domain::trading::portfolio::{CommissionSchedule, Portfolio};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct Fixture {
        asset: Asset,
        portfolio: Portfolio,
        prices: PriceModel,
        history: HashMap<String, Vec<Candle>>,
        now: DateTime<Utc>,
    }

    impl Fixture {
        fn new(mid: Decimal) -> Self {
            let mut prices = PriceModel::new();
            let mut map = HashMap::new();
            map.insert(
                "COIN".to_string(),
                PriceSnapshot::quote("COIN", mid - dec!(1), mid, mid + dec!(1)),
            );
            prices.update(map);
            Self {
                asset: Asset::stock("COIN"),
                portfolio: Portfolio::new(dec!(10000), CommissionSchedule::free()),
                prices,
                history: HashMap::new(),
                now: Utc::now(),
            }
        }

        fn ctx(&self) -> EvalContext<'_> {
            EvalContext {
                asset: &self.asset,
                portfolio: &self.portfolio,
                prices: &self.prices,
                position: self.portfolio.position_for("COIN"),
                now: self.now,
                history: &self.history,
                last_buy: None,
                last_sell: None,
            }
        }
    }

    /// A leaf that is always true / always false, built from the
    /// buying-power threshold against the fixture's $10k.
    fn leaf(truth: bool) -> Condition {
        Condition::BuyingPowerThreshold {
            comparison: Comparison::Above,
            threshold: if truth { dec!(1) } else { dec!(99999999) },
        }
    }

    #[test]
    fn test_price_threshold() {
        let fixture = Fixture::new(dec!(101));
        let mut above = Condition::PriceThreshold {
            comparison: Comparison::Above,
            threshold: dec!(100),
        };
        let mut below = Condition::PriceThreshold {
            comparison: Comparison::Below,
            threshold: dec!(100),
        };
        assert!(above.evaluate(&fixture.ctx()).unwrap());
        assert!(!below.evaluate(&fixture.ctx()).unwrap());
    }

    #[test]
    fn test_all_matches_logical_and() {
        let fixture = Fixture::new(dec!(101));
        for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
            let mut cond = Condition::all(vec![leaf(a), leaf(b)]);
            assert_eq!(cond.evaluate(&fixture.ctx()).unwrap(), a && b);
        }
    }

    #[test]
    fn test_any_matches_logical_or() {
        let fixture = Fixture::new(dec!(101));
        for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
            let mut cond = Condition::any(vec![leaf(a), leaf(b)]);
            assert_eq!(cond.evaluate(&fixture.ctx()).unwrap(), a || b);
        }
    }

    #[test]
    fn test_sequence_requires_order() {
        let fixture = Fixture::new(dec!(101));
        // First child never true, second always true: the sequence must
        // never complete no matter how often it is evaluated.
        let mut cond = Condition::sequence(vec![leaf(false), leaf(true)], None);
        for _ in 0..5 {
            assert!(!cond.evaluate(&fixture.ctx()).unwrap());
        }
    }

    #[test]
    fn test_sequence_completes_in_order() {
        let mut fixture = Fixture::new(dec!(101));
        // Child 1: buying power above 5k (true), child 2: position present.
        let mut cond = Condition::sequence(
            vec![
                leaf(true),
                Condition::PositionCheck {
                    check: PositionCheckKind::Present,
                    target: Decimal::ZERO,
                },
            ],
            None,
        );
        assert!(!cond.evaluate(&fixture.ctx()).unwrap());

        // Open a position; the second child can now trigger.
        fixture
            .portfolio
            .apply(crate::domain::trading::types::Order::filled(
                Asset::stock("COIN"),
                crate::domain::trading::types::OrderSide::Buy,
                dec!(1),
                dec!(100),
                fixture.now,
            ))
            .unwrap();
        assert!(cond.evaluate(&fixture.ctx()).unwrap());
    }

    #[test]
    fn test_sequence_expires_from_first_trigger() {
        let mut fixture = Fixture::new(dec!(101));
        let mut cond = Condition::sequence(vec![leaf(true), leaf(false)], Some(3));
        assert!(!cond.evaluate(&fixture.ctx()).unwrap());
        if let Condition::Sequence { triggered, .. } = &cond {
            assert_eq!(triggered.len(), 1);
        }

        // Four days later the window has lapsed: progress resets, and
        // the first child re-triggers fresh on the same call.
        fixture.now += Duration::days(4);
        assert!(!cond.evaluate(&fixture.ctx()).unwrap());
        if let Condition::Sequence { triggered, .. } = &cond {
            assert_eq!(triggered.len(), 1);
            assert_eq!(triggered[0], fixture.now);
        }
    }

    #[test]
    fn test_elapsed_time_without_history_is_satisfied() {
        let fixture = Fixture::new(dec!(101));
        let mut cond = Condition::ElapsedTime {
            marker: TradeMarker::LastBuy,
            days: 7,
        };
        assert!(cond.evaluate(&fixture.ctx()).unwrap());
    }

    #[test]
    fn test_elapsed_time_measures_days() {
        let fixture = Fixture::new(dec!(101));
        let mut cond = Condition::ElapsedTime {
            marker: TradeMarker::LastBuy,
            days: 7,
        };
        let mut ctx = fixture.ctx();
        ctx.last_buy = Some(fixture.now - Duration::days(3));
        assert!(!cond.evaluate(&ctx).unwrap());
        ctx.last_buy = Some(fixture.now - Duration::days(8));
        assert!(cond.evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_statistical_threshold_against_window_mean() {
        let mut fixture = Fixture::new(dec!(110));
        let start = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        let candles: Vec<Candle> = (0..10)
            .map(|i| {
                let close = dec!(100) + Decimal::from(i % 2);
                Candle {
                    symbol: "COIN".to_string(),
                    date: start + chrono::Duration::days(i),
                    open: close,
                    high: close + dec!(1),
                    low: close - dec!(1),
                    close,
                    volume: dec!(1000),
                }
            })
            .collect();
        fixture.history.insert("COIN".to_string(), candles);
        fixture.now = start
            .and_hms_opt(16, 0, 0)
            .unwrap()
            .and_utc()
            + Duration::days(10);

        // Window mean is ~100.5; mid price 110 sits far above it.
        let mut cond = Condition::StatisticalThreshold {
            field: OhlcField::Close,
            stat: WindowStat::Mean,
            window_days: 10,
            std_devs: 2.0,
            comparison: Comparison::Above,
        };
        assert!(cond.evaluate(&fixture.ctx()).unwrap());
    }

    #[test]
    fn test_statistical_threshold_with_thin_window_is_false() {
        let fixture = Fixture::new(dec!(110));
        let mut cond = Condition::StatisticalThreshold {
            field: OhlcField::Close,
            stat: WindowStat::Max,
            window_days: 20,
            std_devs: 0.0,
            comparison: Comparison::Above,
        };
        assert!(!cond.evaluate(&fixture.ctx()).unwrap());
    }

    #[test]
    fn test_lookback_propagates_through_compounds() {
        let cond = Condition::all(vec![
            leaf(true),
            Condition::sequence(
                vec![Condition::StatisticalThreshold {
                    field: OhlcField::Close,
                    stat: WindowStat::Mean,
                    window_days: 30,
                    std_devs: 1.0,
                    comparison: Comparison::Below,
                }],
                None,
            ),
        ]);
        assert_eq!(cond.lookback_days(), 30);
    }

    #[test]
    fn test_tunable_fields_roundtrip() {
        let mut cond = Condition::all(vec![
            Condition::PriceThreshold {
                comparison: Comparison::Above,
                threshold: dec!(50),
            },
            Condition::sequence(
                vec![Condition::ElapsedTime {
                    marker: TradeMarker::LastSell,
                    days: 10,
                }],
                Some(14),
            ),
        ]);
        let genes = cond.tunable_fields();
        // comparison, threshold, sequence expiry, marker, days
        assert_eq!(genes.len(), 5);

        let mut writeback = cond.clone();
        writeback.apply_tunables(&mut genes.iter()).unwrap();
        assert_eq!(writeback, cond);
    }

    #[test]
    fn test_apply_tunables_changes_one_field() {
        let mut cond = Condition::PriceThreshold {
            comparison: Comparison::Above,
            threshold: dec!(50),
        };
        let mut genes = cond.tunable_fields();
        genes[1].value = 75.0;
        cond.apply_tunables(&mut genes.iter()).unwrap();
        assert_eq!(
            cond,
            Condition::PriceThreshold {
                comparison: Comparison::Above,
                threshold: dec!(75),
            }
        );
    }
}
