use crate::domain::errors::TradingError;
use crate::domain::market::price_model::PriceModel;
use crate::domain::trading::allocation::Allocation;
use crate::domain::trading::asset::Asset;
use crate::domain::trading::strategy::Strategy;
use crate::domain::trading::types::{Order, OrderSide, OrderStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Percent-of-notional commission with a per-order minimum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionSchedule {
    pub rate: Decimal,
    pub minimum: Decimal,
}

impl CommissionSchedule {
    pub fn new(rate: Decimal, minimum: Decimal) -> Self {
        Self { rate, minimum }
    }

    pub fn free() -> Self {
        Self {
            rate: Decimal::ZERO,
            minimum: Decimal::ZERO,
        }
    }

    pub fn commission_for(&self, notional: Decimal) -> Decimal {
        (notional.abs() * self.rate).max(self.minimum)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub asset: Asset,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub last_price: Decimal,
}

impl Position {
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.last_price
    }

    /// Percent move of the last observed price against average cost.
    pub fn percent_change(&self) -> Decimal {
        if self.average_cost.is_zero() {
            return Decimal::ZERO;
        }
        (self.last_price - self.average_cost) / self.average_cost * Decimal::from(100)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub buying_power: Decimal,
    pub initial_value: Decimal,
    pub positions: Vec<Position>,
    pub strategies: Vec<Strategy>,
    pub commission: CommissionSchedule,
    /// Buy-side exposure bound; buying stops once it is exceeded.
    pub max_allocation: Option<Allocation>,
    /// Sell-side exposure bound; selling stops once exposure drops below it.
    pub min_allocation: Option<Allocation>,
    pub applied_orders: Vec<Order>,
}

impl Portfolio {
    pub fn new(buying_power: Decimal, commission: CommissionSchedule) -> Self {
        Self {
            buying_power,
            initial_value: buying_power,
            positions: Vec::new(),
            strategies: Vec::new(),
            commission,
            max_allocation: None,
            min_allocation: None,
            applied_orders: Vec::new(),
        }
    }

    pub fn position_for(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn positions_value(&self) -> Decimal {
        self.positions.iter().map(Position::market_value).sum()
    }

    /// Cash plus positions marked at last observed prices.
    pub fn total_value(&self) -> Decimal {
        self.buying_power + self.positions_value()
    }

    /// Refresh every position's last observed price from the current
    /// snapshot set. Symbols without a usable mid keep their old mark.
    pub fn mark_positions(&mut self, prices: &PriceModel) {
        for position in &mut self.positions {
            if let Ok(mid) = prices.mid(&position.symbol) {
                position.last_price = mid;
            }
        }
    }

    /// Apply a filled order. Takes the order by value: ownership makes
    /// double-application unrepresentable. The order is retained in the
    /// applied-orders log.
    pub fn apply(&mut self, order: Order) -> Result<(), TradingError> {
        if order.status != OrderStatus::Filled {
            return Err(TradingError::NotFilled {
                id: order.id.clone(),
                status: order.status.to_string(),
            });
        }
        let price = order.fill_price.unwrap_or(order.requested_price);
        let notional = order.quantity * price;
        let commission = self.commission.commission_for(notional);

        match order.side {
            OrderSide::Buy => {
                let need = notional + commission;
                if need > self.buying_power {
                    return Err(TradingError::InsufficientBuyingPower {
                        need,
                        available: self.buying_power,
                    });
                }
                self.buying_power -= need;
                self.open_or_extend(&order, price);
            }
            OrderSide::Sell => {
                let held = self
                    .position_for(order.symbol())
                    .map(|p| p.quantity)
                    .unwrap_or(Decimal::ZERO);
                if order.quantity > held {
                    return Err(TradingError::Oversell {
                        symbol: order.symbol().to_string(),
                        quantity: order.quantity,
                        held,
                    });
                }
                self.buying_power += notional - commission;
                self.reduce(order.symbol(), order.quantity);
            }
        }

        self.applied_orders.push(order);
        Ok(())
    }

    fn open_or_extend(&mut self, order: &Order, price: Decimal) {
        if let Some(position) = self
            .positions
            .iter_mut()
            .find(|p| p.symbol == order.symbol())
        {
            let total_cost =
                position.quantity * position.average_cost + order.quantity * price;
            position.quantity += order.quantity;
            if !position.quantity.is_zero() {
                position.average_cost = total_cost / position.quantity;
            }
            position.last_price = price;
        } else {
            self.positions.push(Position {
                symbol: order.symbol().to_string(),
                asset: order.asset.clone(),
                quantity: order.quantity,
                average_cost: price,
                last_price: price,
            });
        }
    }

    fn reduce(&mut self, symbol: &str, quantity: Decimal) {
        if let Some(position) = self.positions.iter_mut().find(|p| p.symbol == symbol) {
            position.quantity -= quantity;
        }
        self.positions.retain(|p| !p.quantity.is_zero());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn portfolio() -> Portfolio {
        Portfolio::new(dec!(10000), CommissionSchedule::new(dec!(0.001), dec!(1)))
    }

    #[test]
    fn test_buy_opens_position_and_debits_cash() {
        let mut portfolio = portfolio();
        let order = Order::filled(
            Asset::stock("COIN"),
            OrderSide::Buy,
            dec!(10),
            dec!(100),
            Utc::now(),
        );
        portfolio.apply(order).unwrap();

        let position = portfolio.position_for("COIN").unwrap();
        assert_eq!(position.quantity, dec!(10));
        assert_eq!(position.average_cost, dec!(100));
        // 10000 - 1000 notional - 1 commission (0.1% of 1000 = 1, == minimum)
        assert_eq!(portfolio.buying_power, dec!(8999));
    }

    #[test]
    fn test_average_cost_blends_fills() {
        let mut portfolio = portfolio();
        portfolio.commission = CommissionSchedule::free();
        for price in [dec!(100), dec!(110)] {
            let order = Order::filled(
                Asset::stock("COIN"),
                OrderSide::Buy,
                dec!(10),
                price,
                Utc::now(),
            );
            portfolio.apply(order).unwrap();
        }
        let position = portfolio.position_for("COIN").unwrap();
        assert_eq!(position.quantity, dec!(20));
        assert_eq!(position.average_cost, dec!(105));
    }

    #[test]
    fn test_sell_to_zero_removes_position() {
        let mut portfolio = portfolio();
        portfolio.commission = CommissionSchedule::free();
        portfolio
            .apply(Order::filled(
                Asset::stock("COIN"),
                OrderSide::Buy,
                dec!(5),
                dec!(100),
                Utc::now(),
            ))
            .unwrap();
        portfolio
            .apply(Order::filled(
                Asset::stock("COIN"),
                OrderSide::Sell,
                dec!(5),
                dec!(120),
                Utc::now(),
            ))
            .unwrap();

        assert!(portfolio.position_for("COIN").is_none());
        // 10000 - 500 + 600
        assert_eq!(portfolio.buying_power, dec!(10100));
    }

    #[test]
    fn test_oversell_is_rejected() {
        let mut portfolio = portfolio();
        portfolio.commission = CommissionSchedule::free();
        portfolio
            .apply(Order::filled(
                Asset::stock("COIN"),
                OrderSide::Buy,
                dec!(5),
                dec!(100),
                Utc::now(),
            ))
            .unwrap();
        let result = portfolio.apply(Order::filled(
            Asset::stock("COIN"),
            OrderSide::Sell,
            dec!(6),
            dec!(100),
            Utc::now(),
        ));
        assert!(matches!(result, Err(TradingError::Oversell { .. })));
    }

    #[test]
    fn test_pending_order_cannot_be_applied() {
        let mut portfolio = portfolio();
        let order = Order::pending(Asset::stock("COIN"), OrderSide::Buy, dec!(5), dec!(100));
        assert!(matches!(
            portfolio.apply(order),
            Err(TradingError::NotFilled { .. })
        ));
        assert!(portfolio.applied_orders.is_empty());
    }

    #[test]
    fn test_insufficient_buying_power() {
        let mut portfolio = portfolio();
        let order = Order::filled(
            Asset::stock("COIN"),
            OrderSide::Buy,
            dec!(200),
            dec!(100),
            Utc::now(),
        );
        assert!(matches!(
            portfolio.apply(order),
            Err(TradingError::InsufficientBuyingPower { .. })
        ));
    }

    #[test]
    fn test_commission_minimum_applies() {
        let schedule = CommissionSchedule::new(dec!(0.001), dec!(1));
        // 0.1% of 100 = 0.10, below the $1 minimum
        assert_eq!(schedule.commission_for(dec!(100)), dec!(1));
        assert_eq!(schedule.commission_for(dec!(10000)), dec!(10));
    }
}
