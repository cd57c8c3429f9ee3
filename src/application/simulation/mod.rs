pub mod backtester;

pub use backtester::{
    BacktestSimulator, SimulationOptions, SimulationPersistence, SimulationStatus,
};
