mod core;
mod prometheus;

// Re-export public items
pub use self::core::{Collector, QueryResult};
pub use prometheus::PrometheusCollector;
