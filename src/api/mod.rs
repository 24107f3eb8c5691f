//! HTTP API Module
//!
//! Provides status, directory and metrics endpoints for operators.

mod metrics;
mod routes;

pub use metrics::Metrics;
pub use routes::{router, run_api_server, ApiState};
