pub mod account_locks;
pub mod ledger_service;
pub mod order_sweeper;
pub mod snapshot;
