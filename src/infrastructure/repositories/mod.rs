pub mod in_memory;

pub use in_memory::{
    InMemoryOptimizerRunRepository, InMemoryOrderRepository, InMemoryPortfolioRepository,
    InMemoryStrategyRepository,
};
