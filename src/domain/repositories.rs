//! Repository Pattern Abstractions
//!
//! Narrow create/find-by-id/update-by-id persistence seams. The core
//! never depends on a query language or schema beyond these operations;
//! the in-memory implementations in `infrastructure::repositories` back
//! every test and single-process deployment.

use crate::domain::optimization::run::OptimizerRun;
use crate::domain::trading::portfolio::Portfolio;
use crate::domain::trading::strategy::Strategy;
use crate::domain::trading::types::Order;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait StrategyRepository: Send + Sync {
    async fn create(&self, strategy: &Strategy) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Strategy>>;
    async fn update(&self, strategy: &Strategy) -> Result<()>;
}

#[async_trait]
pub trait PortfolioRepository: Send + Sync {
    async fn create(&self, id: &str, portfolio: &Portfolio) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Portfolio>>;
    async fn update(&self, id: &str, portfolio: &Portfolio) -> Result<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &Order) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Order>>;
    async fn update(&self, order: &Order) -> Result<()>;
}

#[async_trait]
pub trait OptimizerRunRepository: Send + Sync {
    async fn create(&self, run: &OptimizerRun) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<OptimizerRun>>;
    async fn update(&self, run: &OptimizerRun) -> Result<()>;

    /// Runs still marked PENDING or RUNNING for a user. Supports the
    /// restart maintenance sweep; not a general query surface.
    async fn find_active_for_user(&self, user_id: &str) -> Result<Vec<OptimizerRun>>;
}
