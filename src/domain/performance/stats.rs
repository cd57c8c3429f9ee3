use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Shared statistics utilities for return series.
pub struct Stats;

impl Stats {
    /// Simple returns between consecutive equity points.
    pub fn calculate_returns(equity: &[Decimal]) -> Vec<f64> {
        let mut returns = Vec::new();
        for i in 1..equity.len() {
            let prev = equity[i - 1];
            let curr = equity[i];
            if prev > Decimal::ZERO {
                let r = ((curr - prev) / prev).to_f64().unwrap_or(0.0);
                returns.push(r);
            }
        }
        returns
    }

    /// Annualized Sharpe ratio over daily returns (252 trading days).
    pub fn sharpe_ratio(returns: &[f64]) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns
            .iter()
            .map(|r| (r - mean) * (r - mean))
            .sum::<f64>()
            / (n - 1.0);
        let std_dev = variance.sqrt();
        if std_dev <= 1e-9 {
            return 0.0;
        }
        mean / std_dev * 252.0_f64.sqrt()
    }

    /// Sortino ratio: like Sharpe, but only downside deviation counts.
    pub fn sortino_ratio(returns: &[f64]) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let downside = returns
            .iter()
            .filter(|r| **r < 0.0)
            .map(|r| r * r)
            .sum::<f64>()
            / (n - 1.0);
        let downside_dev = downside.sqrt();
        if downside_dev <= 1e-9 {
            return 0.0;
        }
        mean / downside_dev * 252.0_f64.sqrt()
    }

    /// Largest peak-to-trough decline as a positive percent.
    pub fn max_drawdown_pct(equity: &[Decimal]) -> f64 {
        let mut peak = Decimal::ZERO;
        let mut worst = 0.0_f64;
        for value in equity {
            if *value > peak {
                peak = *value;
            }
            if peak > Decimal::ZERO {
                let dd = ((peak - *value) / peak).to_f64().unwrap_or(0.0) * 100.0;
                if dd > worst {
                    worst = dd;
                }
            }
        }
        worst
    }
}

/// Terminal statistics of one simulation's equity curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStats {
    pub initial_equity: Decimal,
    pub final_equity: Decimal,
    pub percent_change: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown_pct: f64,
}

impl ReturnStats {
    pub fn from_equity_curve(curve: &[(NaiveDate, Decimal)]) -> Self {
        let equity: Vec<Decimal> = curve.iter().map(|(_, e)| *e).collect();
        let initial = equity.first().copied().unwrap_or(Decimal::ZERO);
        let last = equity.last().copied().unwrap_or(Decimal::ZERO);
        let percent_change = if initial > Decimal::ZERO {
            ((last - initial) / initial).to_f64().unwrap_or(0.0) * 100.0
        } else {
            0.0
        };
        let returns = Stats::calculate_returns(&equity);
        Self {
            initial_equity: initial,
            final_equity: last,
            percent_change,
            sharpe_ratio: Stats::sharpe_ratio(&returns),
            sortino_ratio: Stats::sortino_ratio(&returns),
            max_drawdown_pct: Stats::max_drawdown_pct(&equity),
        }
    }
}
