//! Trade Ledger Library
//!
//! Position and account ledger reconciliation: fills become position,
//! balance, and earning updates that are persisted together, with an order
//! status sweep feeding fills from the venue.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
pub mod task_runner;
