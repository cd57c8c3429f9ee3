//! In-Memory Repository Implementations
//!
//! Thread-safe, in-memory implementations of the repository traits in
//! `domain::repositories`. They back every test and are sufficient for
//! single-instance deployments; data does not survive a restart.

use crate::domain::optimization::run::OptimizerRun;
use crate::domain::repositories::{
    OptimizerRunRepository, OrderRepository, PortfolioRepository, StrategyRepository,
};
use crate::domain::trading::portfolio::Portfolio;
use crate::domain::trading::strategy::Strategy;
use crate::domain::trading::types::Order;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStrategyRepository {
    strategies: Arc<RwLock<HashMap<String, Strategy>>>,
}

impl InMemoryStrategyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StrategyRepository for InMemoryStrategyRepository {
    async fn create(&self, strategy: &Strategy) -> Result<()> {
        self.strategies
            .write()
            .await
            .insert(strategy.id.clone(), strategy.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Strategy>> {
        Ok(self.strategies.read().await.get(id).cloned())
    }

    async fn update(&self, strategy: &Strategy) -> Result<()> {
        self.strategies
            .write()
            .await
            .insert(strategy.id.clone(), strategy.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPortfolioRepository {
    portfolios: Arc<RwLock<HashMap<String, Portfolio>>>,
}

impl InMemoryPortfolioRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PortfolioRepository for InMemoryPortfolioRepository {
    async fn create(&self, id: &str, portfolio: &Portfolio) -> Result<()> {
        self.portfolios
            .write()
            .await
            .insert(id.to_string(), portfolio.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Portfolio>> {
        Ok(self.portfolios.read().await.get(id).cloned())
    }

    async fn update(&self, id: &str, portfolio: &Portfolio) -> Result<()> {
        self.portfolios
            .write()
            .await
            .insert(id.to_string(), portfolio.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<String, Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &Order) -> Result<()> {
        self.orders
            .write()
            .await
            .insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(id).cloned())
    }

    async fn update(&self, order: &Order) -> Result<()> {
        self.orders
            .write()
            .await
            .insert(order.id.clone(), order.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOptimizerRunRepository {
    runs: Arc<RwLock<HashMap<String, OptimizerRun>>>,
}

impl InMemoryOptimizerRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OptimizerRunRepository for InMemoryOptimizerRunRepository {
    async fn create(&self, run: &OptimizerRun) -> Result<()> {
        self.runs.write().await.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<OptimizerRun>> {
        Ok(self.runs.read().await.get(id).cloned())
    }

    async fn update(&self, run: &OptimizerRun) -> Result<()> {
        self.runs.write().await.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn find_active_for_user(&self, user_id: &str) -> Result<Vec<OptimizerRun>> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .filter(|run| run.user_id == user_id && run.is_active())
            .cloned()
            .collect())
    }
}
