pub mod price_model;
pub mod types;

pub use price_model::{Aggressiveness, PriceModel};
pub use types::{Candle, OhlcField, PriceSnapshot};
