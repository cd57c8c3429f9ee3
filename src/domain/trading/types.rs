use crate::domain::trading::asset::Asset;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Canceled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A simulated order. Once filled it is immutable; applying it to a
/// portfolio consumes it, so it cannot be applied twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub asset: Asset,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub requested_price: Decimal,
    pub status: OrderStatus,
    pub fill_price: Option<Decimal>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn pending(asset: Asset, side: OrderSide, quantity: Decimal, price: Decimal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            asset,
            side,
            quantity,
            requested_price: price,
            status: OrderStatus::Pending,
            fill_price: None,
            filled_at: None,
        }
    }

    /// An order filled at its requested price, as the simulator produces.
    pub fn filled(
        asset: Asset,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            asset,
            side,
            quantity,
            requested_price: price,
            status: OrderStatus::Filled,
            fill_price: Some(price),
            filled_at: Some(at),
        }
    }

    pub fn cancel(&mut self) {
        if self.status == OrderStatus::Pending {
            self.status = OrderStatus::Canceled;
        }
    }

    pub fn symbol(&self) -> &str {
        self.asset.symbol()
    }
}
