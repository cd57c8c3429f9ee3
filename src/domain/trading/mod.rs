pub mod allocation;
pub mod asset;
pub mod portfolio;
pub mod strategy;
pub mod types;

pub use allocation::{Allocation, AllocationKind};
pub use asset::Asset;
pub use portfolio::{CommissionSchedule, Portfolio, Position};
pub use strategy::Strategy;
pub use types::{Order, OrderSide, OrderStatus};
