//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod memory_job_store;
pub mod model_storage;
pub mod report;
#[cfg(feature = "web")]
pub mod web;
