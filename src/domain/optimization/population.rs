use crate::domain::optimization::gene::GeneVector;
use crate::domain::performance::stats::ReturnStats;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scalar reduction of a backtest used to rank individuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitnessKind {
    PercentChange,
    Sharpe,
    Sortino,
    MaxDrawdown,
}

impl FitnessKind {
    /// Max-drawdown is minimized; every other kind is maximized.
    pub fn maximize(&self) -> bool {
        !matches!(self, FitnessKind::MaxDrawdown)
    }

    /// Sentinel for a failed evaluation: ranks behind every real score.
    pub fn worst(&self) -> f64 {
        if self.maximize() { f64::MIN } else { f64::MAX }
    }

    pub fn score(&self, stats: &ReturnStats) -> f64 {
        match self {
            FitnessKind::PercentChange => stats.percent_change,
            FitnessKind::Sharpe => stats.sharpe_ratio,
            FitnessKind::Sortino => stats.sortino_ratio,
            FitnessKind::MaxDrawdown => stats.max_drawdown_pct,
        }
    }
}

impl fmt::Display for FitnessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FitnessKind::PercentChange => "percent-change",
            FitnessKind::Sharpe => "sharpe",
            FitnessKind::Sortino => "sortino",
            FitnessKind::MaxDrawdown => "max-drawdown",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for FitnessKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "percent-change" => Ok(FitnessKind::PercentChange),
            "sharpe" => Ok(FitnessKind::Sharpe),
            "sortino" => Ok(FitnessKind::Sortino),
            "max-drawdown" => Ok(FitnessKind::MaxDrawdown),
            _ => anyhow::bail!(
                "Invalid fitness kind: {}. Must be 'percent-change', 'sharpe', 'sortino' or 'max-drawdown'",
                s
            ),
        }
    }
}

/// One candidate genotype with its evaluated scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub genes: GeneVector,
    pub training_fitness: Option<f64>,
    pub validation_fitness: Option<f64>,
}

impl Individual {
    pub fn new(genes: GeneVector) -> Self {
        Self {
            genes,
            training_fitness: None,
            validation_fitness: None,
        }
    }

    fn ranking_fitness(&self, kind: FitnessKind) -> f64 {
        self.training_fitness.unwrap_or(kind.worst())
    }
}

/// Number of individuals returned per inspection page.
pub const PAGE_SIZE: usize = 8;

/// A ranked set of individuals, truncated to a fixed capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    pub individuals: Vec<Individual>,
    pub capacity: usize,
}

impl Population {
    pub fn new(capacity: usize) -> Self {
        Self {
            individuals: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Merge children in, re-rank sign-adjusted for the fitness kind,
    /// and truncate back to capacity.
    pub fn absorb(&mut self, children: Vec<Individual>, kind: FitnessKind) {
        self.individuals.extend(children);
        self.rank(kind);
        self.individuals.truncate(self.capacity);
    }

    /// Sort best-first. Unevaluated individuals sink to the bottom.
    pub fn rank(&mut self, kind: FitnessKind) {
        self.individuals.sort_by(|a, b| {
            let fa = a.ranking_fitness(kind);
            let fb = b.ranking_fitness(kind);
            let ord = fa.partial_cmp(&fb).unwrap_or(std::cmp::Ordering::Equal);
            if kind.maximize() { ord.reverse() } else { ord }
        });
    }

    pub fn best(&self) -> Option<&Individual> {
        self.individuals.first()
    }

    /// Rank-ordered slice for external inspection, `PAGE_SIZE` per page.
    pub fn page(&self, page: usize) -> &[Individual] {
        let start = page * PAGE_SIZE;
        if start >= self.individuals.len() {
            return &[];
        }
        let end = (start + PAGE_SIZE).min(self.individuals.len());
        &self.individuals[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn individual(fitness: f64) -> Individual {
        Individual {
            genes: Vec::new(),
            training_fitness: Some(fitness),
            validation_fitness: None,
        }
    }

    #[test]
    fn test_rank_maximizes_by_default() {
        let mut population = Population::new(10);
        population.individuals = vec![individual(1.0), individual(5.0), individual(3.0)];
        population.rank(FitnessKind::Sharpe);
        let scores: Vec<f64> = population
            .individuals
            .iter()
            .map(|i| i.training_fitness.unwrap())
            .collect();
        assert_eq!(scores, vec![5.0, 3.0, 1.0]);
    }

    #[test]
    fn test_rank_minimizes_drawdown() {
        let mut population = Population::new(10);
        population.individuals = vec![individual(20.0), individual(5.0), individual(12.0)];
        population.rank(FitnessKind::MaxDrawdown);
        let scores: Vec<f64> = population
            .individuals
            .iter()
            .map(|i| i.training_fitness.unwrap())
            .collect();
        assert_eq!(scores, vec![5.0, 12.0, 20.0]);
    }

    #[test]
    fn test_absorb_truncates_to_capacity() {
        let mut population = Population::new(3);
        population.individuals = vec![individual(1.0), individual(2.0), individual(3.0)];
        population.absorb(vec![individual(4.0), individual(0.5)], FitnessKind::Sharpe);
        assert_eq!(population.len(), 3);
        assert_eq!(population.best().unwrap().training_fitness, Some(4.0));
    }

    #[test]
    fn test_unevaluated_individuals_rank_last() {
        let mut population = Population::new(10);
        population.individuals = vec![Individual::new(Vec::new()), individual(-3.0)];
        population.rank(FitnessKind::PercentChange);
        assert_eq!(
            population.individuals[0].training_fitness,
            Some(-3.0)
        );
    }

    #[test]
    fn test_page_slicing() {
        let mut population = Population::new(20);
        population.individuals = (0..20).map(|i| individual(i as f64)).collect();
        population.rank(FitnessKind::Sharpe);
        assert_eq!(population.page(0).len(), 8);
        assert_eq!(population.page(2).len(), 4);
        assert!(population.page(3).is_empty());
        // Page 0 holds the best individuals
        assert_eq!(population.page(0)[0].training_fitness, Some(19.0));
    }
}
