//! System observability
//!
//! Operational metrics for the engine; semantic surfaces only, sinks stay
//! external behind the Prometheus text endpoint.

/// Prometheus metrics collection
pub mod metrics;

pub use metrics::Metrics;
