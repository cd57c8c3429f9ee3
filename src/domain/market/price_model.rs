use crate::domain::errors::MarketDataError;
use crate::domain::market::types::PriceSnapshot;
use crate::domain::trading::asset::Asset;
use crate::domain::trading::types::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How far into the bid/ask spread a simulated execution is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggressiveness {
    LikelyToFill,
    NearLikelyToFill,
    Mid,
    NearUnlikelyToFill,
    UnlikelyToFill,
}

impl Aggressiveness {
    /// The opposite end of the spread. Used for the short leg of a
    /// spread: buying the spread sells the short leg.
    pub fn complement(self) -> Self {
        match self {
            Aggressiveness::LikelyToFill => Aggressiveness::UnlikelyToFill,
            Aggressiveness::NearLikelyToFill => Aggressiveness::NearUnlikelyToFill,
            Aggressiveness::Mid => Aggressiveness::Mid,
            Aggressiveness::NearUnlikelyToFill => Aggressiveness::NearLikelyToFill,
            Aggressiveness::UnlikelyToFill => Aggressiveness::LikelyToFill,
        }
    }
}

impl fmt::Display for Aggressiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggressiveness::LikelyToFill => "likely",
            Aggressiveness::NearLikelyToFill => "near-likely",
            Aggressiveness::Mid => "mid",
            Aggressiveness::NearUnlikelyToFill => "near-unlikely",
            Aggressiveness::UnlikelyToFill => "unlikely",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Aggressiveness {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "likely" => Ok(Aggressiveness::LikelyToFill),
            "near-likely" => Ok(Aggressiveness::NearLikelyToFill),
            "mid" => Ok(Aggressiveness::Mid),
            "near-unlikely" => Ok(Aggressiveness::NearUnlikelyToFill),
            "unlikely" => Ok(Aggressiveness::UnlikelyToFill),
            _ => anyhow::bail!(
                "Invalid aggressiveness: {}. Must be 'likely', 'near-likely', 'mid', 'near-unlikely' or 'unlikely'",
                s
            ),
        }
    }
}

const OPTION_CONTRACT_MULTIPLIER: u32 = 100;
const ANOMALY_MOVE_THRESHOLD_PCT: u32 = 10;

/// Holds the current snapshot per symbol plus exactly one prior
/// generation for anomaly detection. No deeper history is kept here;
/// trailing windows come from the market data cache.
#[derive(Debug, Clone, Default)]
pub struct PriceModel {
    current: HashMap<String, PriceSnapshot>,
    previous: Option<HashMap<String, PriceSnapshot>>,
}

impl PriceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole snapshot map, rotating the outgoing map into
    /// the one-slot backup.
    pub fn update(&mut self, snapshots: HashMap<String, PriceSnapshot>) {
        self.previous = Some(std::mem::take(&mut self.current));
        self.current = snapshots;
    }

    pub fn snapshot(&self, symbol: &str) -> Option<&PriceSnapshot> {
        self.current.get(symbol)
    }

    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.current.contains_key(symbol)
    }

    /// Current mid price for a symbol, for valuation.
    pub fn mid(&self, symbol: &str) -> Result<Decimal, MarketDataError> {
        let snap = self
            .current
            .get(symbol)
            .ok_or_else(|| MarketDataError::MissingSnapshot {
                symbol: symbol.to_string(),
            })?;
        snap.mid.ok_or(MarketDataError::IncompleteQuote {
            symbol: symbol.to_string(),
            field: "mid",
        })
    }

    /// Executable price for an asset at the given side and aggressiveness.
    ///
    /// Options are scaled by the contract multiplier. A spread prices
    /// its long leg at the requested aggressiveness and its short leg at
    /// the complementary one, long minus short.
    pub fn resolve_price(
        &self,
        asset: &Asset,
        side: OrderSide,
        aggressiveness: Aggressiveness,
    ) -> Result<Decimal, MarketDataError> {
        match asset {
            Asset::Stock { symbol } | Asset::Crypto { symbol } => {
                self.quote_price(symbol, side, aggressiveness)
            }
            Asset::Option { symbol } => {
                let per_share = self.quote_price(symbol, side, aggressiveness)?;
                Ok(per_share * Decimal::from(OPTION_CONTRACT_MULTIPLIER))
            }
            Asset::Spread { long, short } => {
                let long_price = self.resolve_price(long, side, aggressiveness)?;
                let short_price = self.resolve_price(short, side, aggressiveness.complement())?;
                Ok(long_price - short_price)
            }
        }
    }

    fn quote_price(
        &self,
        symbol: &str,
        side: OrderSide,
        aggressiveness: Aggressiveness,
    ) -> Result<Decimal, MarketDataError> {
        let snap = self
            .current
            .get(symbol)
            .ok_or_else(|| MarketDataError::MissingSnapshot {
                symbol: symbol.to_string(),
            })?;
        let field = |value: Option<Decimal>, name: &'static str| {
            value.ok_or(MarketDataError::IncompleteQuote {
                symbol: symbol.to_string(),
                field: name,
            })
        };
        let bid = field(snap.bid, "bid")?;
        let mid = field(snap.mid, "mid")?;
        let ask = field(snap.ask, "ask")?;

        let blend_toward_mid = |extreme: Decimal| {
            (Decimal::from(2) * extreme + mid) / Decimal::from(3)
        };

        let price = match (side, aggressiveness) {
            (_, Aggressiveness::Mid) => mid,
            (OrderSide::Buy, Aggressiveness::LikelyToFill) => ask,
            (OrderSide::Buy, Aggressiveness::NearLikelyToFill) => blend_toward_mid(ask),
            (OrderSide::Buy, Aggressiveness::NearUnlikelyToFill) => blend_toward_mid(bid),
            (OrderSide::Buy, Aggressiveness::UnlikelyToFill) => bid,
            (OrderSide::Sell, Aggressiveness::LikelyToFill) => bid,
            (OrderSide::Sell, Aggressiveness::NearLikelyToFill) => blend_toward_mid(bid),
            (OrderSide::Sell, Aggressiveness::NearUnlikelyToFill) => blend_toward_mid(ask),
            (OrderSide::Sell, Aggressiveness::UnlikelyToFill) => ask,
        };
        Ok(price)
    }

    /// True when the latest snapshot for the symbol looks untrustworthy:
    /// a crossed quote, a missing field, no prior snapshot to compare
    /// against, or any of bid/mid/ask moving more than 10% in one update.
    pub fn detect_anomaly(&self, symbol: &str) -> bool {
        let Some(snap) = self.current.get(symbol) else {
            return true;
        };
        let (Some(bid), Some(mid), Some(ask)) = (snap.bid, snap.mid, snap.ask) else {
            return true;
        };
        if bid > ask {
            return true;
        }
        let Some(prior) = self.previous.as_ref().and_then(|map| map.get(symbol)) else {
            return true;
        };
        let (Some(prior_bid), Some(prior_mid), Some(prior_ask)) =
            (prior.bid, prior.mid, prior.ask)
        else {
            return true;
        };

        let threshold = Decimal::from(ANOMALY_MOVE_THRESHOLD_PCT) / Decimal::from(100);
        let moved = |prev: Decimal, curr: Decimal| {
            if prev.is_zero() {
                return !curr.is_zero();
            }
            ((curr - prev) / prev).abs() > threshold
        };

        moved(prior_bid, bid) || moved(prior_mid, mid) || moved(prior_ask, ask)
    }
}
