pub mod alert_sink;
pub mod ledger_store;
pub mod signal_store;
pub mod venue_client;
