//! Declarative order sizing.
//!
//! An `Allocation` describes how much to trade; the sizing functions turn
//! it into a concrete quantity against the live portfolio and price model,
//! and `exposure`/`limit_reached` run the inverse direction for exposure
//! limit checks.

use crate::domain::errors::AllocationError;
use crate::domain::market::price_model::{Aggressiveness, PriceModel};
use crate::domain::trading::asset::Asset;
use crate::domain::trading::portfolio::Portfolio;
use crate::domain::trading::types::OrderSide;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationKind {
    PercentOfPortfolio,
    PercentOfBuyingPower,
    PercentOfPositions,
    FixedDollars,
    FixedUnits,
}

impl AllocationKind {
    pub const CHOICES: [&'static str; 5] = [
        "percent-of-portfolio",
        "percent-of-buying-power",
        "percent-of-positions",
        "fixed-dollars",
        "fixed-units",
    ];

    pub fn index(&self) -> usize {
        match self {
            AllocationKind::PercentOfPortfolio => 0,
            AllocationKind::PercentOfBuyingPower => 1,
            AllocationKind::PercentOfPositions => 2,
            AllocationKind::FixedDollars => 3,
            AllocationKind::FixedUnits => 4,
        }
    }

    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => AllocationKind::PercentOfPortfolio,
            1 => AllocationKind::PercentOfBuyingPower,
            2 => AllocationKind::PercentOfPositions,
            3 => AllocationKind::FixedDollars,
            _ => AllocationKind::FixedUnits,
        }
    }
}

// Display through the canonical choice names so logs, gene descriptors
// and error messages all agree.
impl fmt::Display for AllocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::CHOICES[self.index()])
    }
}

/// A sizing rule: a kind plus an amount whose unit depends on the kind
/// (percent, dollars, or units).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub kind: AllocationKind,
    pub amount: Decimal,
}

impl Allocation {
    pub fn new(kind: AllocationKind, amount: Decimal) -> Self {
        Self { kind, amount }
    }

    pub fn fixed_dollars(amount: Decimal) -> Self {
        Self::new(AllocationKind::FixedDollars, amount)
    }

    pub fn percent_of_portfolio(percent: Decimal) -> Self {
        Self::new(AllocationKind::PercentOfPortfolio, percent)
    }
}

/// Fraction of buying power held back to cover commission on the fill.
const COMMISSION_BUFFER: Decimal = dec!(0.99);

/// Resolve a buy allocation into a quantity at the executable buy price.
///
/// The result is clamped so notional cost never exceeds buying power
/// less a 1% commission buffer, and floored to whole contracts for
/// option and spread assets.
pub fn size_buy(
    asset: &Asset,
    allocation: &Allocation,
    portfolio: &Portfolio,
    prices: &PriceModel,
    aggressiveness: Aggressiveness,
) -> Result<Decimal, anyhow::Error> {
    let price = prices.resolve_price(asset, OrderSide::Buy, aggressiveness)?;
    if price <= Decimal::ZERO {
        return Err(AllocationError::NonPositivePrice {
            symbol: asset.symbol().to_string(),
            price,
        }
        .into());
    }

    let mut quantity = match allocation.kind {
        AllocationKind::FixedUnits => allocation.amount,
        AllocationKind::FixedDollars => allocation.amount / price,
        AllocationKind::PercentOfPortfolio => {
            allocation.amount / Decimal::from(100) * portfolio.total_value() / price
        }
        AllocationKind::PercentOfBuyingPower => {
            allocation.amount / Decimal::from(100) * portfolio.buying_power / price
        }
        AllocationKind::PercentOfPositions => {
            allocation.amount / Decimal::from(100) * portfolio.positions_value() / price
        }
    };

    let budget = portfolio.buying_power * COMMISSION_BUFFER;
    if quantity * price > budget {
        quantity = budget / price;
    }
    if asset.whole_units_only() {
        quantity = quantity.floor();
    }
    Ok(quantity.max(Decimal::ZERO))
}

/// Resolve a sell allocation into a quantity at the executable sell
/// price, additionally clamped to the currently held quantity.
pub fn size_sell(
    asset: &Asset,
    allocation: &Allocation,
    portfolio: &Portfolio,
    prices: &PriceModel,
    aggressiveness: Aggressiveness,
) -> Result<Decimal, anyhow::Error> {
    let price = prices.resolve_price(asset, OrderSide::Sell, aggressiveness)?;
    if price <= Decimal::ZERO {
        return Err(AllocationError::NonPositivePrice {
            symbol: asset.symbol().to_string(),
            price,
        }
        .into());
    }
    let held = portfolio
        .position_for(asset.symbol())
        .map(|p| p.quantity)
        .unwrap_or(Decimal::ZERO);

    let mut quantity = match allocation.kind {
        AllocationKind::FixedUnits => allocation.amount,
        AllocationKind::FixedDollars => allocation.amount / price,
        AllocationKind::PercentOfPortfolio => {
            allocation.amount / Decimal::from(100) * portfolio.total_value() / price
        }
        AllocationKind::PercentOfBuyingPower => {
            allocation.amount / Decimal::from(100) * portfolio.buying_power / price
        }
        AllocationKind::PercentOfPositions => {
            allocation.amount / Decimal::from(100) * portfolio.positions_value() / price
        }
    };

    quantity = quantity.min(held);
    if asset.whole_units_only() {
        quantity = quantity.floor();
    }
    Ok(quantity.max(Decimal::ZERO))
}

/// Current exposure in the units of the given allocation kind: percent
/// of total value for the percent kinds, dollars for fixed-dollars,
/// units for fixed-units.
pub fn exposure(
    kind: AllocationKind,
    portfolio: &Portfolio,
) -> Result<Decimal, AllocationError> {
    match kind {
        AllocationKind::PercentOfBuyingPower => Err(AllocationError::UnsupportedLimitKind {
            kind: kind.to_string(),
        }),
        AllocationKind::PercentOfPortfolio | AllocationKind::PercentOfPositions => {
            let total = portfolio.total_value();
            if total.is_zero() {
                return Ok(Decimal::ZERO);
            }
            Ok(portfolio.positions_value() / total * Decimal::from(100))
        }
        AllocationKind::FixedDollars => Ok(portfolio.positions_value()),
        AllocationKind::FixedUnits => {
            Ok(portfolio.positions.iter().map(|p| p.quantity).sum())
        }
    }
}

/// Whether an exposure limit has been hit. Buy limits trip when
/// exposure exceeds the bound; sell limits trip when exposure has
/// dropped below it.
pub fn limit_reached(
    limit: &Allocation,
    side: OrderSide,
    portfolio: &Portfolio,
) -> Result<bool, AllocationError> {
    let current = exposure(limit.kind, portfolio)?;
    Ok(match side {
        OrderSide::Buy => current > limit.amount,
        OrderSide::Sell => current < limit.amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::types::PriceSnapshot;
    use crate::domain::trading::portfolio::CommissionSchedule;
    use std::collections::HashMap;

    fn coin_prices() -> PriceModel {
        let mut model = PriceModel::new();
        let mut map = HashMap::new();
        map.insert(
            "COIN".to_string(),
            PriceSnapshot::quote("COIN", dec!(100), dec!(101), dec!(102)),
        );
        model.update(map);
        model
    }

    fn cash_portfolio(cash: Decimal) -> Portfolio {
        Portfolio::new(cash, CommissionSchedule::free())
    }

    #[test]
    fn test_fixed_dollar_buy_sizes_at_ask() {
        let portfolio = cash_portfolio(dec!(10000));
        let quantity = size_buy(
            &Asset::stock("COIN"),
            &Allocation::fixed_dollars(dec!(2000)),
            &portfolio,
            &coin_prices(),
            Aggressiveness::LikelyToFill,
        )
        .unwrap();
        // 2000 / 102 = 19.6078...
        assert_eq!(quantity.round_dp(4), dec!(19.6078));
    }

    #[test]
    fn test_buy_cost_never_exceeds_buying_power() {
        let portfolio = cash_portfolio(dec!(1000));
        let prices = coin_prices();
        let asset = Asset::stock("COIN");
        let allocations = [
            Allocation::fixed_dollars(dec!(5000)),
            Allocation::new(AllocationKind::FixedUnits, dec!(500)),
            Allocation::percent_of_portfolio(dec!(300)),
            Allocation::new(AllocationKind::PercentOfBuyingPower, dec!(250)),
        ];
        for allocation in &allocations {
            let quantity = size_buy(
                &asset,
                allocation,
                &portfolio,
                &prices,
                Aggressiveness::LikelyToFill,
            )
            .unwrap();
            let cost = quantity * dec!(102);
            assert!(
                cost <= portfolio.buying_power,
                "{:?} sized {} costing {}",
                allocation.kind,
                quantity,
                cost
            );
        }
    }

    #[test]
    fn test_option_quantity_floors_to_whole_contracts() {
        let mut model = PriceModel::new();
        let mut map = HashMap::new();
        map.insert(
            "COIN_C100".to_string(),
            PriceSnapshot::quote("COIN_C100", dec!(2.90), dec!(3.00), dec!(3.10)),
        );
        model.update(map);

        let portfolio = cash_portfolio(dec!(10000));
        let quantity = size_buy(
            &Asset::option("COIN_C100"),
            &Allocation::fixed_dollars(dec!(1000)),
            &portfolio,
            &model,
            Aggressiveness::LikelyToFill,
        )
        .unwrap();
        // 1000 / 310 = 3.2258 -> 3 contracts
        assert_eq!(quantity, dec!(3));
    }

    #[test]
    fn test_sell_clamps_to_held_quantity() {
        let mut portfolio = cash_portfolio(dec!(10000));
        portfolio
            .apply(crate::domain::trading::types::Order::filled(
                Asset::stock("COIN"),
                OrderSide::Buy,
                dec!(10),
                dec!(100),
                chrono::Utc::now(),
            ))
            .unwrap();

        let quantity = size_sell(
            &Asset::stock("COIN"),
            &Allocation::fixed_dollars(dec!(500000)),
            &portfolio,
            &coin_prices(),
            Aggressiveness::LikelyToFill,
        )
        .unwrap();
        assert_eq!(quantity, dec!(10));
    }

    #[test]
    fn test_sell_without_position_sizes_zero() {
        let portfolio = cash_portfolio(dec!(10000));
        let quantity = size_sell(
            &Asset::stock("COIN"),
            &Allocation::percent_of_portfolio(dec!(50)),
            &portfolio,
            &coin_prices(),
            Aggressiveness::Mid,
        )
        .unwrap();
        assert_eq!(quantity, Decimal::ZERO);
    }

    #[test]
    fn test_percent_exposure() {
        let mut portfolio = cash_portfolio(dec!(10000));
        portfolio
            .apply(crate::domain::trading::types::Order::filled(
                Asset::stock("COIN"),
                OrderSide::Buy,
                dec!(25),
                dec!(100),
                chrono::Utc::now(),
            ))
            .unwrap();
        // 2500 in positions, 7500 cash -> 25%
        let pct = exposure(AllocationKind::PercentOfPortfolio, &portfolio).unwrap();
        assert_eq!(pct, dec!(25));
        let dollars = exposure(AllocationKind::FixedDollars, &portfolio).unwrap();
        assert_eq!(dollars, dec!(2500));
        let units = exposure(AllocationKind::FixedUnits, &portfolio).unwrap();
        assert_eq!(units, dec!(25));
    }

    #[test]
    fn test_buying_power_kind_fails_loudly_for_limits() {
        let portfolio = cash_portfolio(dec!(10000));
        let limit = Allocation::new(AllocationKind::PercentOfBuyingPower, dec!(50));
        let result = limit_reached(&limit, OrderSide::Buy, &portfolio);
        assert!(matches!(
            result,
            Err(AllocationError::UnsupportedLimitKind { .. })
        ));
    }

    #[test]
    fn test_limit_direction() {
        let mut portfolio = cash_portfolio(dec!(10000));
        portfolio
            .apply(crate::domain::trading::types::Order::filled(
                Asset::stock("COIN"),
                OrderSide::Buy,
                dec!(60),
                dec!(100),
                chrono::Utc::now(),
            ))
            .unwrap();
        // 60% exposure
        let max = Allocation::percent_of_portfolio(dec!(50));
        assert!(limit_reached(&max, OrderSide::Buy, &portfolio).unwrap());
        let min = Allocation::percent_of_portfolio(dec!(70));
        assert!(limit_reached(&min, OrderSide::Sell, &portfolio).unwrap());
        let loose_min = Allocation::percent_of_portfolio(dec!(10));
        assert!(!limit_reached(&loose_min, OrderSide::Sell, &portfolio).unwrap());
    }
}
