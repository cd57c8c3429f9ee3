use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by the market data cache and price model
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("No price snapshot for {symbol}")]
    MissingSnapshot { symbol: String },

    #[error("Incomplete quote for {symbol}: missing {field}")]
    IncompleteQuote { symbol: String, field: &'static str },

    #[error("History for {symbol} starts {actual}, requested {requested} (max drift 5 days)")]
    MisalignedHistory {
        symbol: String,
        requested: NaiveDate,
        actual: NaiveDate,
    },

    #[error("History fetch budget exceeded: {used} fetches > {budget} ({symbols} symbols)")]
    FetchBudgetExceeded {
        used: usize,
        budget: usize,
        symbols: usize,
    },

    #[error("Empty history returned for {symbol}")]
    EmptyHistory { symbol: String },
}

/// Errors raised while sizing orders or checking exposure limits
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("Allocation kind {kind} is not supported for exposure limits")]
    UnsupportedLimitKind { kind: String },

    #[error("Cannot size order at non-positive price {price} for {symbol}")]
    NonPositivePrice { symbol: String, price: Decimal },
}

/// Errors raised by portfolio mutation
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("Order {id} is {status}, only filled orders can be applied")]
    NotFilled { id: String, status: String },

    #[error("Insufficient buying power: need ${need}, available ${available}")]
    InsufficientBuyingPower { need: Decimal, available: Decimal },

    #[error("Sell of {quantity} {symbol} exceeds held quantity {held}")]
    Oversell {
        symbol: String,
        quantity: Decimal,
        held: Decimal,
    },
}

/// Errors raised during backtest construction and runs
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("End date {end} must be after start date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Cached history for {symbol} starts {actual}, simulation needs data from {required}")]
    HistoryStartsTooLate {
        symbol: String,
        required: NaiveDate,
        actual: NaiveDate,
    },

    #[error("Simulation is {status} and cannot be run")]
    NotRunnable { status: String },
}

/// Errors raised while encoding or decoding gene vectors
#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("Gene vector length {actual} does not match strategy layout length {expected}")]
    VectorLengthMismatch { expected: usize, actual: usize },

    #[error("Gene vector ran out of values while rebuilding condition fields")]
    ExhaustedVector,

    #[error("Optimizer run {id} not found")]
    RunNotFound { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_budget_error_formatting() {
        let err = MarketDataError::FetchBudgetExceeded {
            used: 16,
            budget: 15,
            symbols: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("16"));
        assert!(msg.contains("15"));
        assert!(msg.contains("3 symbols"));
    }

    #[test]
    fn test_oversell_formatting() {
        let err = TradingError::Oversell {
            symbol: "COIN".to_string(),
            quantity: dec!(25),
            held: dec!(10),
        };
        let msg = err.to_string();
        assert!(msg.contains("COIN"));
        assert!(msg.contains("25"));
        assert!(msg.contains("10"));
    }
}
