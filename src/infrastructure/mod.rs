pub mod mock;
pub mod repositories;

pub use mock::FixtureMarketDataSource;
pub use repositories::{
    InMemoryOptimizerRunRepository, InMemoryOrderRepository, InMemoryPortfolioRepository,
    InMemoryStrategyRepository,
};
