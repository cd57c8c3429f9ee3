use crate::domain::conditions::Condition;
use crate::domain::market::price_model::Aggressiveness;
use crate::domain::trading::allocation::Allocation;
use crate::domain::trading::asset::Asset;
use serde::{Deserialize, Serialize};

/// A user-defined trading strategy: one target asset, sizing rules for
/// each side, and ordered buying/selling condition trees. The optimizer
/// mutates it only through its gene encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub name: String,
    pub asset: Asset,
    pub aggressiveness: Aggressiveness,
    pub buy_allocation: Allocation,
    pub sell_allocation: Allocation,
    pub buy_conditions: Vec<Condition>,
    pub sell_conditions: Vec<Condition>,
}

impl Strategy {
    pub fn new(
        name: &str,
        asset: Asset,
        buy_allocation: Allocation,
        sell_allocation: Allocation,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            asset,
            aggressiveness: Aggressiveness::LikelyToFill,
            buy_allocation,
            sell_allocation,
            buy_conditions: Vec::new(),
            sell_conditions: Vec::new(),
        }
    }

    pub fn with_buy_condition(mut self, condition: Condition) -> Self {
        self.buy_conditions.push(condition);
        self
    }

    pub fn with_sell_condition(mut self, condition: Condition) -> Self {
        self.sell_conditions.push(condition);
        self
    }

    /// The longest trailing-window requirement over every condition,
    /// in days. Determines how far before its start date a simulation
    /// needs cached history.
    pub fn max_lookback_days(&self) -> i64 {
        self.buy_conditions
            .iter()
            .chain(self.sell_conditions.iter())
            .map(Condition::lookback_days)
            .max()
            .unwrap_or(0)
    }
}
