//! Port traits the domain depends on; adapters implement them.

pub mod config_port;
pub mod job_store;
pub mod series_port;
