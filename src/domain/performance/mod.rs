pub mod stats;

pub use stats::{ReturnStats, Stats};
