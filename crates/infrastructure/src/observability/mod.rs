//! Observability module
//!
//! - Structured logging of domain events
//! - Metrics collection through the `metrics` facade

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
