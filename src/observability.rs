//! Logging and metrics.
pub mod metrics;
pub mod tracing;

pub use self::metrics::PipelineMetrics;
pub use self::tracing::{LogFormat, init};
