use serde::{Deserialize, Serialize};

/// Tradeable instrument. Spreads are two option legs quoted against each
/// other; the legs carry their own symbols for quote lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Asset {
    Stock { symbol: String },
    Crypto { symbol: String },
    Option { symbol: String },
    Spread { long: Box<Asset>, short: Box<Asset> },
}

impl Asset {
    pub fn stock(symbol: &str) -> Self {
        Asset::Stock {
            symbol: symbol.to_string(),
        }
    }

    pub fn crypto(symbol: &str) -> Self {
        Asset::Crypto {
            symbol: symbol.to_string(),
        }
    }

    pub fn option(symbol: &str) -> Self {
        Asset::Option {
            symbol: symbol.to_string(),
        }
    }

    pub fn spread(long: Asset, short: Asset) -> Self {
        Asset::Spread {
            long: Box::new(long),
            short: Box::new(short),
        }
    }

    /// The symbol quoted for this asset. For spreads this is the long
    /// leg's symbol, which identifies the position opened by a fill.
    pub fn symbol(&self) -> &str {
        match self {
            Asset::Stock { symbol } | Asset::Crypto { symbol } | Asset::Option { symbol } => symbol,
            Asset::Spread { long, .. } => long.symbol(),
        }
    }

    /// Symbols whose quotes and history this asset depends on.
    pub fn quoted_symbols(&self) -> Vec<String> {
        match self {
            Asset::Stock { symbol } | Asset::Crypto { symbol } | Asset::Option { symbol } => {
                vec![symbol.clone()]
            }
            Asset::Spread { long, short } => {
                let mut symbols = long.quoted_symbols();
                symbols.extend(short.quoted_symbols());
                symbols
            }
        }
    }

    /// The single-leg assets this one is made of: the legs of a
    /// spread, or the asset itself.
    pub fn legs(&self) -> Vec<&Asset> {
        match self {
            Asset::Spread { long, short } => vec![long, short],
            other => vec![other],
        }
    }

    /// Whole-contract instruments cannot be traded fractionally.
    pub fn whole_units_only(&self) -> bool {
        matches!(self, Asset::Option { .. } | Asset::Spread { .. })
    }
}
