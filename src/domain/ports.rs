use crate::domain::market::types::{Candle, PriceSnapshot};
use crate::domain::trading::asset::Asset;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Raw historical/quote data capability, implemented by an external
/// collaborator and mocked deterministically in tests. Everything in the
/// core reaches market data through the cache decorator, never through
/// this port directly.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Current quote snapshot per quoted symbol of the given assets.
    async fn price_snapshots(&self, assets: &[Asset]) -> Result<HashMap<String, PriceSnapshot>>;

    /// Daily history for one asset, inclusive on both ends.
    async fn market_history(
        &self,
        asset: &Asset,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>>;

    /// Intra-day bars for a single session.
    async fn intraday_history(&self, asset: &Asset, day: NaiveDate) -> Result<Vec<Candle>>;
}
