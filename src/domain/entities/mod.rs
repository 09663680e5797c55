pub mod account;
pub mod bundle;
pub mod earning;
pub mod order;
pub mod position;
pub mod signal;
pub mod transaction;
