//! Rate-limited cache over the raw historical-data source.
//!
//! Keyed by symbol. Each entry remembers the earliest start date ever
//! requested and the maximal fetched series; requests covered by the
//! entry are served locally and trimmed to the caller's window. The
//! upstream fetch budget grows with the working set (5 fetches per
//! distinct symbol), which keeps a large optimizer population from
//! generating unbounded upstream traffic.

use crate::domain::errors::MarketDataError;
use crate::domain::market::types::{Candle, PriceSnapshot};
use crate::domain::ports::MarketDataSource;
use crate::domain::trading::asset::Asset;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Upstream fetches allowed per distinct symbol ever requested.
const FETCHES_PER_SYMBOL: usize = 5;
/// Max days the fetched series may start after the requested date.
const MAX_START_DRIFT_DAYS: i64 = 5;

struct CacheEntry {
    start: NaiveDate,
    candles: Vec<Candle>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    symbols: HashSet<String>,
    fetches: usize,
}

pub struct MarketDataCache {
    source: Arc<dyn MarketDataSource>,
    state: RwLock<CacheState>,
    /// Per-symbol fetch locks: concurrent misses for one symbol
    /// coalesce into a single upstream request.
    fetch_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MarketDataCache {
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self {
            source,
            state: RwLock::new(CacheState::default()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Upstream fetches performed so far.
    pub async fn fetch_count(&self) -> usize {
        self.state.read().await.fetches
    }

    /// Daily history for the asset's quoted symbol, trimmed to
    /// `[start, end]`. Fetches upstream only when the cached range does
    /// not reach back to `start`.
    pub async fn history(
        &self,
        asset: &Asset,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>> {
        let symbol = asset.symbol().to_string();

        {
            let state = self.state.read().await;
            if let Some(entry) = state.entries.get(&symbol)
                && entry.start <= start
            {
                return Ok(trim(&entry.candles, start, end));
            }
        }

        let lock = self.fetch_lock(&symbol).await;
        let _guard = lock.lock().await;

        // Another task may have filled the entry while we waited.
        {
            let state = self.state.read().await;
            if let Some(entry) = state.entries.get(&symbol)
                && entry.start <= start
            {
                debug!("MarketDataCache: coalesced miss for {}", symbol);
                return Ok(trim(&entry.candles, start, end));
            }
        }

        // Widen the fetch to the union of what was ever requested so the
        // replacement entry stays maximal.
        let (fetch_start, fetch_end) = {
            let state = self.state.read().await;
            match state.entries.get(&symbol) {
                Some(entry) => (
                    entry.start.min(start),
                    entry
                        .candles
                        .last()
                        .map(|c| c.date.max(end))
                        .unwrap_or(end),
                ),
                None => (start, end),
            }
        };

        self.charge_budget(&symbol).await?;

        let candles = self
            .source
            .market_history(asset, fetch_start, fetch_end)
            .await
            .with_context(|| format!("Failed to fetch history for {}", symbol))?;

        let first = candles
            .first()
            .ok_or_else(|| MarketDataError::EmptyHistory {
                symbol: symbol.clone(),
            })?
            .date;
        if first - fetch_start > chrono::Duration::days(MAX_START_DRIFT_DAYS) {
            return Err(MarketDataError::MisalignedHistory {
                symbol: symbol.clone(),
                requested: fetch_start,
                actual: first,
            }
            .into());
        }

        info!(
            "MarketDataCache: fetched {} bars of {} from {}",
            candles.len(),
            symbol,
            fetch_start
        );

        let mut state = self.state.write().await;
        state.entries.insert(
            symbol,
            CacheEntry {
                start: fetch_start,
                candles: candles.clone(),
            },
        );
        Ok(trim(&candles, start, end))
    }

    /// Snapshot set for the given assets on one simulated date, built
    /// from cached bars. Symbols with no bar that day are omitted.
    pub async fn snapshots_on(
        &self,
        assets: &[Asset],
        date: NaiveDate,
    ) -> HashMap<String, PriceSnapshot> {
        let state = self.state.read().await;
        let mut snapshots = HashMap::new();
        for asset in assets {
            for symbol in asset.quoted_symbols() {
                if let Some(entry) = state.entries.get(&symbol)
                    && let Some(candle) = entry.candles.iter().find(|c| c.date == date)
                {
                    snapshots.insert(symbol, PriceSnapshot::from_candle(candle));
                }
            }
        }
        snapshots
    }

    async fn fetch_lock(&self, symbol: &str) -> Arc<Mutex<()>> {
        let mut locks = self.fetch_locks.lock().await;
        locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Count the symbol into the working set and take one unit of the
    /// self-expanding fetch budget.
    async fn charge_budget(&self, symbol: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.symbols.insert(symbol.to_string());
        let budget = FETCHES_PER_SYMBOL * state.symbols.len();
        if state.fetches + 1 > budget {
            return Err(MarketDataError::FetchBudgetExceeded {
                used: state.fetches + 1,
                budget,
                symbols: state.symbols.len(),
            }
            .into());
        }
        state.fetches += 1;
        Ok(())
    }
}

fn trim(candles: &[Candle], start: NaiveDate, end: NaiveDate) -> Vec<Candle> {
    candles
        .iter()
        .filter(|c| c.date >= start && c.date <= end)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::FixtureMarketDataSource;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cache_with_coin(first_day: NaiveDate, days: i64) -> MarketDataCache {
        let source = FixtureMarketDataSource::new()
            .with_walk("COIN", first_day, days, dec!(100));
        MarketDataCache::new(Arc::new(source))
    }

    #[tokio::test]
    async fn test_covered_request_is_served_from_cache() {
        let cache = cache_with_coin(date(2021, 1, 1), 120);
        let asset = Asset::stock("COIN");

        cache
            .history(&asset, date(2021, 1, 1), date(2021, 3, 1))
            .await
            .unwrap();
        assert_eq!(cache.fetch_count().await, 1);

        // Narrower window, same start coverage: no second fetch
        cache
            .history(&asset, date(2021, 2, 1), date(2021, 2, 15))
            .await
            .unwrap();
        assert_eq!(cache.fetch_count().await, 1);
    }

    #[tokio::test]
    async fn test_earlier_start_refetches_and_replaces() {
        let cache = cache_with_coin(date(2021, 1, 1), 120);
        let asset = Asset::stock("COIN");

        cache
            .history(&asset, date(2021, 2, 1), date(2021, 3, 1))
            .await
            .unwrap();
        let wider = cache
            .history(&asset, date(2021, 1, 10), date(2021, 3, 1))
            .await
            .unwrap();
        assert_eq!(cache.fetch_count().await, 2);
        assert_eq!(wider.first().unwrap().date, date(2021, 1, 10));

        // The replaced entry now covers the earlier start
        cache
            .history(&asset, date(2021, 1, 15), date(2021, 2, 1))
            .await
            .unwrap();
        assert_eq!(cache.fetch_count().await, 2);
    }

    #[tokio::test]
    async fn test_trim_respects_requested_window() {
        let cache = cache_with_coin(date(2021, 1, 1), 120);
        let asset = Asset::stock("COIN");
        let slice = cache
            .history(&asset, date(2021, 1, 5), date(2021, 1, 9))
            .await
            .unwrap();
        assert_eq!(slice.len(), 5);
        assert!(slice.iter().all(|c| c.date >= date(2021, 1, 5)));
        assert!(slice.iter().all(|c| c.date <= date(2021, 1, 9)));
    }

    #[tokio::test]
    async fn test_misaligned_history_is_a_data_integrity_error() {
        // Source data begins 2021-03-05; requesting from 2021-02-01
        // leaves a 32-day gap, far past the 5-day drift allowance.
        let cache = cache_with_coin(date(2021, 3, 5), 60);
        let asset = Asset::stock("COIN");
        let err = cache
            .history(&asset, date(2021, 2, 1), date(2021, 4, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MarketDataError>(),
            Some(MarketDataError::MisalignedHistory { .. })
        ));
    }

    #[tokio::test]
    async fn test_small_start_drift_is_tolerated() {
        // 2021-03-01 requested, data begins 2021-03-05: within 5 days.
        let cache = cache_with_coin(date(2021, 3, 5), 60);
        let asset = Asset::stock("COIN");
        let series = cache
            .history(&asset, date(2021, 3, 1), date(2021, 4, 1))
            .await
            .unwrap();
        assert_eq!(series.first().unwrap().date, date(2021, 3, 5));
    }

    #[tokio::test]
    async fn test_budget_expands_with_working_set_then_fails() {
        let source = FixtureMarketDataSource::new()
            .with_walk("COIN", date(2021, 1, 1), 400, dec!(100));
        let cache = MarketDataCache::new(Arc::new(source));
        let asset = Asset::stock("COIN");

        // One symbol: budget is 5 fetches. Walk the start date backwards
        // so every request misses.
        let mut start = date(2021, 12, 1);
        for _ in 0..5 {
            cache.history(&asset, start, date(2021, 12, 20)).await.unwrap();
            start = start - chrono::Duration::days(30);
        }
        let err = cache
            .history(&asset, start, date(2021, 12, 20))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MarketDataError>(),
            Some(MarketDataError::FetchBudgetExceeded {
                budget: 5,
                symbols: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_second_symbol_raises_the_budget() {
        let source = FixtureMarketDataSource::new()
            .with_walk("COIN", date(2021, 1, 1), 400, dec!(100))
            .with_walk("HOOD", date(2021, 1, 1), 400, dec!(40));
        let cache = MarketDataCache::new(Arc::new(source));

        let mut start = date(2021, 12, 1);
        for _ in 0..5 {
            cache
                .history(&Asset::stock("COIN"), start, date(2021, 12, 20))
                .await
                .unwrap();
            start = start - chrono::Duration::days(30);
        }
        // A sixth COIN fetch would fail, but HOOD grows the budget to 10.
        cache
            .history(&Asset::stock("HOOD"), date(2021, 6, 1), date(2021, 12, 20))
            .await
            .unwrap();
        cache
            .history(&Asset::stock("COIN"), start, date(2021, 12, 20))
            .await
            .unwrap();
        assert_eq!(cache.fetch_count().await, 7);
    }

    #[tokio::test]
    async fn test_concurrent_misses_coalesce() {
        let source = FixtureMarketDataSource::new()
            .with_walk("COIN", date(2021, 1, 1), 120, dec!(100));
        let cache = Arc::new(MarketDataCache::new(Arc::new(source)));
        let asset = Asset::stock("COIN");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let asset = asset.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .history(&asset, date(2021, 1, 1), date(2021, 3, 1))
                    .await
                    .map(|s| s.len())
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(cache.fetch_count().await, 1);
    }

    #[tokio::test]
    async fn test_snapshots_built_from_cached_bars() {
        let cache = cache_with_coin(date(2021, 1, 1), 120);
        let asset = Asset::stock("COIN");
        cache
            .history(&asset, date(2021, 1, 1), date(2021, 3, 1))
            .await
            .unwrap();

        let snapshots = cache
            .snapshots_on(std::slice::from_ref(&asset), date(2021, 1, 15))
            .await;
        let snap = snapshots.get("COIN").unwrap();
        assert!(snap.bid.unwrap() <= snap.mid.unwrap());
        assert!(snap.mid.unwrap() <= snap.ask.unwrap());

        // No bar on an uncached date
        let missing = cache
            .snapshots_on(std::slice::from_ref(&asset), date(2022, 1, 1))
            .await;
        assert!(missing.is_empty());
    }
}
