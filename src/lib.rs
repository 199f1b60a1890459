//! LMSR Market Library
//!
//! Binary prediction markets priced by a Logarithmic Market Scoring Rule
//! market maker over an append-only position ledger.

// Re-export modules for use in binaries
pub mod config;
pub mod db_adapter;
pub mod error;
pub mod ledger;
pub mod lmsr_api;
pub mod lmsr_core;
pub mod models;
pub mod stress;

#[cfg(test)]
mod tests;

pub use error::{EngineError, Result};
pub use ledger::{Ledger, MemoryLedger};
pub use lmsr_api::LmsrEngine;
