pub mod fee_calculator;
pub mod reconciliation_engine;
