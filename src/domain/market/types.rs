use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One daily bar of market history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Which field of a candle a statistical condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OhlcField {
    Open,
    High,
    Low,
    Close,
}

impl OhlcField {
    pub fn of(&self, candle: &Candle) -> Decimal {
        match self {
            OhlcField::Open => candle.open,
            OhlcField::High => candle.high,
            OhlcField::Low => candle.low,
            OhlcField::Close => candle.close,
        }
    }

    pub const CHOICES: [&'static str; 4] = ["open", "high", "low", "close"];

    pub fn index(&self) -> usize {
        match self {
            OhlcField::Open => 0,
            OhlcField::High => 1,
            OhlcField::Low => 2,
            OhlcField::Close => 3,
        }
    }

    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => OhlcField::Open,
            1 => OhlcField::High,
            2 => OhlcField::Low,
            _ => OhlcField::Close,
        }
    }
}

impl fmt::Display for OhlcField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::CHOICES[self.index()])
    }
}

/// Per-symbol quote snapshot. Fields are optional so a broken upstream
/// quote can be represented and flagged by anomaly detection instead of
/// being silently invented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub bid: Option<Decimal>,
    pub mid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub candle: Option<Candle>,
}

impl PriceSnapshot {
    /// Snapshot with a full bid/mid/ask quote and no attached bar.
    pub fn quote(symbol: &str, bid: Decimal, mid: Decimal, ask: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            bid: Some(bid),
            mid: Some(mid),
            ask: Some(ask),
            candle: None,
        }
    }

    /// Synthesize a snapshot from a daily bar. Mid is the close; the
    /// half-spread is 1/20th of the bar's range, so quiet days quote
    /// tight and volatile days quote wide.
    pub fn from_candle(candle: &Candle) -> Self {
        let half_spread = (candle.high - candle.low) / Decimal::from(20);
        Self {
            symbol: candle.symbol.clone(),
            bid: Some(candle.close - half_spread),
            mid: Some(candle.close),
            ask: Some(candle.close + half_spread),
            candle: Some(candle.clone()),
        }
    }
}
