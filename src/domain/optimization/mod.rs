pub mod encoding;
pub mod gene;
pub mod population;
pub mod run;

pub use encoding::{decode, encode, repair};
pub use gene::{Gene, GeneBounds, GeneVector};
pub use population::{FitnessKind, Individual, PAGE_SIZE, Population};
pub use run::{OptimizerRun, OptimizerSettings, RunStatus};
