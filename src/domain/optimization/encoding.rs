//! Strategy <-> gene vector codec.
//!
//! Layout is purely structural: buy-allocation amount and kind, then
//! sell-allocation amount and kind, then every buying-condition field,
//! then every selling-condition field, compounds recursing in order.
//! Two structurally identical strategies therefore always flatten to
//! equal-length vectors in the same field order.

use crate::domain::errors::OptimizationError;
use crate::domain::optimization::gene::{Gene, GeneBounds, GeneVector};
use crate::domain::trading::allocation::{Allocation, AllocationKind};
use crate::domain::trading::strategy::Strategy;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Genes occupied by one allocation (amount + kind).
const ALLOCATION_GENES: usize = 2;
/// Offsets of the two allocation blocks in every vector.
const BUY_AMOUNT: usize = 0;
const BUY_KIND: usize = 1;
const SELL_AMOUNT: usize = 2;
const SELL_KIND: usize = 3;

/// Legal amount range for an allocation kind, anchored to the initial
/// portfolio value for the dollar and unit kinds.
fn amount_range(kind: AllocationKind, initial_value: Decimal) -> (f64, f64) {
    let initial = initial_value.to_f64().unwrap_or(0.0);
    match kind {
        AllocationKind::PercentOfPortfolio | AllocationKind::PercentOfBuyingPower => (0.0, 100.0),
        AllocationKind::PercentOfPositions => (0.0, 200.0),
        AllocationKind::FixedDollars => (0.0, 2.0 * initial),
        AllocationKind::FixedUnits => (0.0, 0.2 * initial),
    }
}

fn allocation_genes(prefix: &str, allocation: &Allocation, initial_value: Decimal) -> [Gene; 2] {
    let (min, max) = amount_range(allocation.kind, initial_value);
    [
        Gene::continuous(
            &format!("{}.amount", prefix),
            Gene::from_decimal(allocation.amount),
            min,
            max,
        ),
        Gene::categorical(
            &format!("{}.kind", prefix),
            allocation.kind.index(),
            &AllocationKind::CHOICES,
        ),
    ]
}

/// Flatten a strategy's tunable fields into a gene vector.
pub fn encode(strategy: &Strategy, initial_value: Decimal) -> GeneVector {
    let mut genes = Vec::new();
    genes.extend(allocation_genes(
        "buy_allocation",
        &strategy.buy_allocation,
        initial_value,
    ));
    genes.extend(allocation_genes(
        "sell_allocation",
        &strategy.sell_allocation,
        initial_value,
    ));
    for condition in &strategy.buy_conditions {
        genes.extend(condition.tunable_fields());
    }
    for condition in &strategy.sell_conditions {
        genes.extend(condition.tunable_fields());
    }
    genes
}

/// Re-pair each allocation kind gene with its amount gene: reset the
/// amount's bounds to the range legal for the (possibly just mutated)
/// kind and clamp the amount into it. Run after every crossover and
/// mutation so no invalid genotype reaches fitness evaluation.
pub fn repair(genes: &mut GeneVector, initial_value: Decimal) {
    for (amount_idx, kind_idx) in [(BUY_AMOUNT, BUY_KIND), (SELL_AMOUNT, SELL_KIND)] {
        if kind_idx >= genes.len() {
            return;
        }
        let kind = AllocationKind::from_index(genes[kind_idx].as_index());
        let (min, max) = amount_range(kind, initial_value);
        genes[amount_idx].bounds = GeneBounds::Continuous { min, max };
        genes[amount_idx].clamp();
    }
}

/// Write a gene vector back into a copy of its originating strategy.
/// The vector is repaired first, so a decoded strategy is always valid.
pub fn decode(
    template: &Strategy,
    genes: &GeneVector,
    initial_value: Decimal,
) -> Result<Strategy, OptimizationError> {
    let expected = encode(template, initial_value).len();
    if genes.len() != expected {
        return Err(OptimizationError::VectorLengthMismatch {
            expected,
            actual: genes.len(),
        });
    }

    let mut repaired = genes.clone();
    repair(&mut repaired, initial_value);

    let mut strategy = template.clone();
    strategy.buy_allocation = Allocation::new(
        AllocationKind::from_index(repaired[BUY_KIND].as_index()),
        repaired[BUY_AMOUNT].as_decimal(),
    );
    strategy.sell_allocation = Allocation::new(
        AllocationKind::from_index(repaired[SELL_KIND].as_index()),
        repaired[SELL_AMOUNT].as_decimal(),
    );

    let mut rest = repaired[ALLOCATION_GENES * 2..].iter();
    for condition in &mut strategy.buy_conditions {
        condition.apply_tunables(&mut rest)?;
    }
    for condition in &mut strategy.sell_conditions {
        condition.apply_tunables(&mut rest)?;
    }
    Ok(strategy)
}
