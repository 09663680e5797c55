pub mod alert_sinks;
pub mod http_venue_client;
pub mod in_memory_store;
pub mod simulated_venue;
