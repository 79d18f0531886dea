//! Periodically evaluate Prometheus queries and publish the results to CloudWatch

pub mod agent;
pub mod collector;
pub mod config;
pub mod error;
pub mod metric;
pub mod publisher;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::agent::{Agent, AgentOptions, DispatchStats, TerminationSignal};
    pub use crate::collector::{Collector, PrometheusCollector, QueryResult};
    pub use crate::config::{Configuration, LogLevel, MetricConfig, load_and_validate};
    pub use crate::error::{AgentError, Result, ValidationError};
    pub use crate::metric::{Batch, MetricSpec, Sample, Unit};
    pub use crate::publisher::{CloudWatchPublisher, Publisher};
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
