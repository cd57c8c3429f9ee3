// Condition trees and evaluation context
pub mod conditions;

// Market data primitives and the price model
pub mod market;

// Gene encoding, populations, run documents
pub mod optimization;

// Return-series statistics
pub mod performance;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Core trading domain
pub mod trading;

// Domain-specific error types
pub mod errors;
