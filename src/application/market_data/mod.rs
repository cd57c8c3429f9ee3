pub mod history_cache;

pub use history_cache::MarketDataCache;
