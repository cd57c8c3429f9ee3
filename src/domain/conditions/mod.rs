pub mod condition;
pub mod context;

pub use condition::{
    Comparison, Condition, MAX_WINDOW_DAYS, PositionCheckKind, TradeMarker, ValueScope, WindowStat,
};
pub use context::EvalContext;
