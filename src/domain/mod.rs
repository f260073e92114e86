//! Core domain types and logic.

pub mod artifact;
pub mod config;
pub mod error;
pub mod fallback;
pub mod forecaster;
pub mod metrics;
pub mod orchestrator;
pub mod pricing;
pub mod scaler;
pub mod seasonal_trend;
pub mod sequence_window;
pub mod series;
pub mod training;
