use crate::domain::market::price_model::PriceModel;
use crate::domain::market::types::Candle;
use crate::domain::trading::asset::Asset;
use crate::domain::trading::portfolio::{Portfolio, Position};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Everything a condition may read during one evaluation tick. Built
/// fresh by the simulator for every strategy on every tick; conditions
/// never mutate anything reachable through it.
pub struct EvalContext<'a> {
    /// The evaluating strategy's target asset.
    pub asset: &'a Asset,
    pub portfolio: &'a Portfolio,
    pub prices: &'a PriceModel,
    /// The portfolio's position in the target asset, if any.
    pub position: Option<&'a Position>,
    pub now: DateTime<Utc>,
    /// Trailing daily history per symbol, covering at least every
    /// condition's lookback window before `now`.
    pub history: &'a HashMap<String, Vec<Candle>>,
    /// When this strategy last bought / sold, if ever.
    pub last_buy: Option<DateTime<Utc>>,
    pub last_sell: Option<DateTime<Utc>>,
}

impl<'a> EvalContext<'a> {
    /// Candles for the target symbol strictly before `now`, within the
    /// trailing window of `days`.
    pub fn trailing_window(&self, days: i64) -> Vec<&'a Candle> {
        let cutoff = self.now.date_naive() - chrono::Duration::days(days);
        let today = self.now.date_naive();
        self.history
            .get(self.asset.symbol())
            .map(|candles| {
                candles
                    .iter()
                    .filter(|c| c.date >= cutoff && c.date < today)
                    .collect()
            })
            .unwrap_or_default()
    }
}
