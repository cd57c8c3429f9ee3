use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Legal range for one tunable field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneBounds {
    Continuous { min: f64, max: f64 },
    Integer { min: i64, max: i64 },
    Categorical { choices: Vec<String> },
}

/// One tunable field flattened out of a strategy: its current value and
/// its legal range. Integer and categorical genes store their value as a
/// rounded f64 so crossover and mutation treat every gene uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub name: String,
    pub value: f64,
    pub bounds: GeneBounds,
}

pub type GeneVector = Vec<Gene>;

impl Gene {
    pub fn continuous(name: &str, value: f64, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            bounds: GeneBounds::Continuous { min, max },
        }
    }

    pub fn integer(name: &str, value: i64, min: i64, max: i64) -> Self {
        Self {
            name: name.to_string(),
            value: value as f64,
            bounds: GeneBounds::Integer { min, max },
        }
    }

    pub fn categorical(name: &str, index: usize, choices: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            value: index as f64,
            bounds: GeneBounds::Categorical {
                choices: choices.iter().map(|c| c.to_string()).collect(),
            },
        }
    }

    /// Snap the value back into bounds, rounding discrete kinds.
    pub fn clamp(&mut self) {
        self.value = match &self.bounds {
            GeneBounds::Continuous { min, max } => self.value.clamp(*min, *max),
            GeneBounds::Integer { min, max } => {
                self.value.round().clamp(*min as f64, *max as f64)
            }
            GeneBounds::Categorical { choices } => {
                self.value.round().clamp(0.0, (choices.len() - 1) as f64)
            }
        };
    }

    /// A fresh uniformly random in-range value.
    pub fn random_value<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match &self.bounds {
            GeneBounds::Continuous { min, max } => {
                if max > min {
                    rng.random_range(*min..=*max)
                } else {
                    *min
                }
            }
            GeneBounds::Integer { min, max } => rng.random_range(*min..=*max) as f64,
            GeneBounds::Categorical { choices } => {
                rng.random_range(0..choices.len()) as f64
            }
        }
    }

    /// Move toward a fresh random value: `intensity` of the new value,
    /// the remainder of the old.
    pub fn perturb<R: Rng + ?Sized>(&mut self, intensity: f64, rng: &mut R) {
        let fresh = self.random_value(rng);
        self.value = intensity * fresh + (1.0 - intensity) * self.value;
        self.clamp();
    }

    pub fn as_i64(&self) -> i64 {
        self.value.round() as i64
    }

    pub fn as_index(&self) -> usize {
        self.value.round().max(0.0) as usize
    }

    pub fn as_decimal(&self) -> Decimal {
        Decimal::from_f64_retain(self.value).unwrap_or(Decimal::ZERO)
    }

    pub fn from_decimal(value: Decimal) -> f64 {
        value.to_f64().unwrap_or(0.0)
    }
}
