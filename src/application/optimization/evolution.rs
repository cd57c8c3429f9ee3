//! Genetic operators over gene vectors.
//!
//! Pure functions over a caller-supplied RNG so generation loops stay
//! reproducible under a seeded rng in tests.

use crate::domain::optimization::gene::GeneVector;
use crate::domain::optimization::population::{FitnessKind, Individual};
use rand::Rng;

/// How parents are picked for one whole generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Fitness-proportionate roulette wheel.
    Roulette,
    /// Uniform random pick.
    Tournament,
}

impl SelectionMode {
    pub fn coin_flip<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.random_bool(0.5) {
            SelectionMode::Roulette
        } else {
            SelectionMode::Tournament
        }
    }
}

/// A fresh random genotype: every gene blended toward a random in-range
/// value at the given intensity. Intensity 1.0 is a fully random seed.
pub fn randomize<R: Rng + ?Sized>(
    template: &GeneVector,
    intensity: f64,
    rng: &mut R,
) -> GeneVector {
    let mut genes = template.clone();
    for gene in &mut genes {
        gene.perturb(intensity, rng);
    }
    genes
}

/// Pick two distinct parent indices.
pub fn select_parents<R: Rng + ?Sized>(
    individuals: &[Individual],
    kind: FitnessKind,
    mode: SelectionMode,
    rng: &mut R,
) -> (usize, usize) {
    let first = select_one(individuals, kind, mode, rng);
    let mut second = select_one(individuals, kind, mode, rng);
    let mut attempts = 0;
    while second == first && attempts < 16 {
        second = select_one(individuals, kind, mode, rng);
        attempts += 1;
    }
    if second == first {
        second = (first + 1) % individuals.len().max(1);
    }
    (first, second)
}

fn select_one<R: Rng + ?Sized>(
    individuals: &[Individual],
    kind: FitnessKind,
    mode: SelectionMode,
    rng: &mut R,
) -> usize {
    match mode {
        SelectionMode::Tournament => rng.random_range(0..individuals.len()),
        SelectionMode::Roulette => roulette_pick(individuals, kind, rng),
    }
}

/// Fitness-proportionate pick, sign-adjusted so "better" always means
/// a larger wheel slice.
fn roulette_pick<R: Rng + ?Sized>(
    individuals: &[Individual],
    kind: FitnessKind,
    rng: &mut R,
) -> usize {
    let scores: Vec<f64> = individuals
        .iter()
        .map(|i| i.training_fitness.unwrap_or(kind.worst()))
        .map(|f| if kind.maximize() { f } else { -f })
        .collect();
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let weights: Vec<f64> = scores
        .iter()
        .map(|s| {
            let w = s - min + 1e-9;
            if w.is_finite() { w } else { 1e-9 }
        })
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return rng.random_range(0..individuals.len());
    }
    let mut spin = rng.random_range(0.0..total);
    for (idx, weight) in weights.iter().enumerate() {
        if spin < *weight {
            return idx;
        }
        spin -= weight;
    }
    individuals.len() - 1
}

/// One child from two parents: 50/50 n-point (1-5 random cuts, copying
/// from alternating parents) or uniform (per-gene coin flip).
pub fn crossover<R: Rng + ?Sized>(a: &GeneVector, b: &GeneVector, rng: &mut R) -> GeneVector {
    if rng.random_bool(0.5) {
        n_point_crossover(a, b, rng)
    } else {
        uniform_crossover(a, b, rng)
    }
}

fn n_point_crossover<R: Rng + ?Sized>(a: &GeneVector, b: &GeneVector, rng: &mut R) -> GeneVector {
    let len = a.len();
    if len == 0 {
        return Vec::new();
    }
    let cuts = rng.random_range(1..=5usize);
    let mut points: Vec<usize> = (0..cuts).map(|_| rng.random_range(0..len)).collect();
    points.sort_unstable();

    let mut child = Vec::with_capacity(len);
    let mut from_a = true;
    for (idx, (ga, gb)) in a.iter().zip(b.iter()).enumerate() {
        while points.first() == Some(&idx) {
            points.remove(0);
            from_a = !from_a;
        }
        child.push(if from_a { ga.clone() } else { gb.clone() });
    }
    child
}

fn uniform_crossover<R: Rng + ?Sized>(a: &GeneVector, b: &GeneVector, rng: &mut R) -> GeneVector {
    a.iter()
        .zip(b.iter())
        .map(|(ga, gb)| {
            if rng.random_bool(0.5) {
                ga.clone()
            } else {
                gb.clone()
            }
        })
        .collect()
}

/// With `probability`, perturb either one random gene or a random
/// contiguous range, blending each toward a fresh random value at
/// `intensity`.
pub fn mutate<R: Rng + ?Sized>(
    genes: &mut GeneVector,
    probability: f64,
    intensity: f64,
    rng: &mut R,
) {
    if genes.is_empty() || !rng.random_bool(probability.clamp(0.0, 1.0)) {
        return;
    }
    let len = genes.len();
    if rng.random_bool(0.5) {
        let idx = rng.random_range(0..len);
        genes[idx].perturb(intensity, rng);
    } else {
        let from = rng.random_range(0..len);
        let to = rng.random_range(from..len);
        for gene in &mut genes[from..=to] {
            gene.perturb(intensity, rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::optimization::gene::Gene;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn template() -> GeneVector {
        (0..8)
            .map(|i| Gene::continuous(&format!("g{}", i), 50.0, 0.0, 100.0))
            .collect()
    }

    fn individual(fitness: f64) -> Individual {
        Individual {
            genes: template(),
            training_fitness: Some(fitness),
            validation_fitness: None,
        }
    }

    #[test]
    fn test_randomize_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let genes = randomize(&template(), 1.0, &mut rng);
        assert_eq!(genes.len(), 8);
        for gene in &genes {
            assert!((0.0..=100.0).contains(&gene.value));
        }
    }

    #[test]
    fn test_select_parents_are_distinct() {
        let mut rng = StdRng::seed_from_u64(2);
        let pool: Vec<Individual> = (0..6).map(|i| individual(i as f64)).collect();
        for _ in 0..50 {
            let (a, b) = select_parents(&pool, FitnessKind::Sharpe, SelectionMode::Tournament, &mut rng);
            assert_ne!(a, b);
            assert!(a < 6 && b < 6);
        }
    }

    #[test]
    fn test_roulette_prefers_fit_individuals() {
        let mut rng = StdRng::seed_from_u64(3);
        // One individual vastly fitter than the rest
        let mut pool: Vec<Individual> = (0..5).map(|_| individual(0.1)).collect();
        pool.push(individual(1000.0));

        let mut hits = 0;
        for _ in 0..200 {
            let idx = roulette_pick(&pool, FitnessKind::Sharpe, &mut rng);
            if idx == 5 {
                hits += 1;
            }
        }
        assert!(hits > 150, "fit individual picked only {}/200 times", hits);
    }

    #[test]
    fn test_roulette_inverts_for_minimized_fitness() {
        let mut rng = StdRng::seed_from_u64(4);
        // Low drawdown is better; individual 0 has the lowest
        let mut pool = vec![individual(1.0)];
        pool.extend((0..5).map(|_| individual(80.0)));

        let mut hits = 0;
        for _ in 0..200 {
            let idx = roulette_pick(&pool, FitnessKind::MaxDrawdown, &mut rng);
            if idx == 0 {
                hits += 1;
            }
        }
        assert!(hits > 150, "low-drawdown pick only {}/200 times", hits);
    }

    #[test]
    fn test_crossover_child_takes_every_gene_from_a_parent() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut a = template();
        let mut b = template();
        for gene in &mut a {
            gene.value = 10.0;
        }
        for gene in &mut b {
            gene.value = 90.0;
        }
        for _ in 0..20 {
            let child = crossover(&a, &b, &mut rng);
            assert_eq!(child.len(), a.len());
            for gene in &child {
                assert!(gene.value == 10.0 || gene.value == 90.0);
            }
        }
    }

    #[test]
    fn test_mutation_probability_zero_is_identity() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut genes = template();
        let before = genes.clone();
        mutate(&mut genes, 0.0, 1.0, &mut rng);
        assert_eq!(genes, before);
    }

    #[test]
    fn test_mutation_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut genes = template();
        for _ in 0..100 {
            mutate(&mut genes, 1.0, 0.8, &mut rng);
        }
        for gene in &genes {
            assert!((0.0..=100.0).contains(&gene.value));
        }
    }
}
