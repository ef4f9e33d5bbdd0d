//! Core domain types and logic.

pub mod error;
pub mod symbol;
pub mod bar;
pub mod signal;
pub mod position;
pub mod exposure;
pub mod config;
pub mod config_validation;
pub mod ledger;
pub mod sizing;
pub mod risk_gate;
pub mod metrics;
pub mod symbol_data;
pub mod simulation;
pub mod live;
