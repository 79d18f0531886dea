use config::{self, File};
use log::{debug, error};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{AgentError, Result, ValidationError};
use crate::metric::{MetricSpec, Unit};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Longest accepted polling interval, in minutes
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

/// Dimension name used for the grouping key unless configured otherwise
pub const DEFAULT_DIMENSION_NAME: &str = "AutoScalingGroupName";

/// Top-level configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Configuration {
    /// Base URL of the Prometheus query API
    #[serde(default)]
    pub prometheus_url: String,
    /// AWS region the metrics are published to
    #[serde(default)]
    pub aws_region: String,
    /// Metric definitions keyed by metric name
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricConfig>,
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
    /// Forward batches with no samples to the sink
    #[serde(default = "default_publish_empty_batches")]
    pub publish_empty_batches: bool,
    /// Capacity of the hand-off channel between metric tasks and the dispatcher
    #[serde(default = "default_handoff_capacity")]
    pub handoff_capacity: usize,
    /// Dimension name the grouping key is published under
    #[serde(default = "default_dimension_name")]
    pub dimension_name: String,
    /// Per-query HTTP timeout; unset means no timeout
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
}

fn default_publish_empty_batches() -> bool {
    true
}

fn default_handoff_capacity() -> usize {
    1
}

fn default_dimension_name() -> String {
    DEFAULT_DIMENSION_NAME.to_string()
}

/// A metric definition as written in the configuration file
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct MetricConfig {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub asg: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub unit: String,
    /// Polling interval in minutes
    #[serde(default)]
    pub interval: u64,
}

impl MetricConfig {
    /// Check fields in a fixed order, returning the first failure
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.query.is_empty() {
            return Err(ValidationError::QueryMissing);
        }

        if self.asg.is_empty() {
            return Err(ValidationError::AsgMissing);
        }

        if self.namespace.is_empty() {
            return Err(ValidationError::NamespaceMissing);
        }

        if self.unit.is_empty() {
            return Err(ValidationError::UnitMissing);
        }

        self.unit.parse::<Unit>()?;

        if self.interval == 0 {
            return Err(ValidationError::IntervalMissing);
        }

        if self.interval > MAX_INTERVAL_MINUTES {
            return Err(ValidationError::IntervalTooLarge);
        }

        Ok(())
    }

    /// Validate and convert into an immutable spec
    pub fn to_spec(&self, name: &str) -> std::result::Result<MetricSpec, ValidationError> {
        self.validate()?;

        Ok(MetricSpec {
            name: name.to_string(),
            query: self.query.clone(),
            asg: self.asg.clone(),
            namespace: self.namespace.clone(),
            unit: self.unit.parse()?,
            interval: self
                .interval
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or(ValidationError::IntervalTooLarge)?,
        })
    }
}

impl Configuration {
    /// Check the top-level fields: region first, then the query endpoint
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.aws_region.is_empty() {
            return Err(ValidationError::RegionMissing);
        }

        if self.prometheus_url.is_empty() {
            return Err(ValidationError::PrometheusUrlMissing);
        }

        if self.handoff_capacity == 0 {
            return Err(ValidationError::HandoffCapacityZero);
        }

        Ok(())
    }

    /// Validate everything and build the metric specs in name order
    pub fn metric_specs(&self) -> Result<Vec<MetricSpec>> {
        self.validate()?;

        self.metrics
            .iter()
            .map(|(name, metric)| {
                metric.to_spec(name).map_err(|source| AgentError::InvalidMetric {
                    metric: name.clone(),
                    source,
                })
            })
            .collect()
    }
}

/// Logging level
#[derive(Debug, Deserialize, Clone, PartialEq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// Load configuration from a file without validating it
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Configuration> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());

    if !path.exists() {
        error!("Configuration file {} does not exist", path.display());
        return Err(AgentError::Config(format!("Configuration file not found: {}", path.display())));
    }

    let format = match path.extension().map(|ext| ext.to_string_lossy().to_lowercase()) {
        None => config::FileFormat::Toml,
        Some(ext) => match ext.as_str() {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            "yaml" | "yml" => config::FileFormat::Yaml,
            format => {
                error!("Unsupported configuration format: {}", format);
                return Err(AgentError::Config(format!("Unsupported config format: {}", format)));
            }
        },
    };

    let config = config::Config::builder()
        .add_source(File::from(path).format(format))
        .build()
        .map_err(|e| AgentError::Config(e.to_string()))?;

    config.try_deserialize()
        .map_err(|e| AgentError::Config(e.to_string()))
}

/// Load a configuration file and validate it, returning the metric specs
pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<(Configuration, Vec<MetricSpec>)> {
    let config = load_config(path)?;
    let specs = config.metric_specs()?;
    Ok((config, specs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn valid_metric() -> MetricConfig {
        MetricConfig {
            query: "avg(cpu)".to_string(),
            asg: "my-asg".to_string(),
            namespace: "MyApp".to_string(),
            unit: "Percent".to_string(),
            interval: 1,
        }
    }

    fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_metric_validation_order() {
        let mut m = MetricConfig::default();
        assert_eq!(m.validate(), Err(ValidationError::QueryMissing));

        m.query = "query".to_string();
        assert_eq!(m.validate(), Err(ValidationError::AsgMissing));

        m.asg = "asg".to_string();
        assert_eq!(m.validate(), Err(ValidationError::NamespaceMissing));

        m.namespace = "namespace".to_string();
        assert_eq!(m.validate(), Err(ValidationError::UnitMissing));

        m.unit = "unit".to_string();
        assert_eq!(m.validate(), Err(ValidationError::InvalidUnit));

        m.unit = "None".to_string();
        assert_eq!(m.validate(), Err(ValidationError::IntervalMissing));

        m.interval = 1;
        assert_eq!(m.validate(), Ok(()));
    }

    #[test]
    fn test_interval_upper_bound() {
        let m = MetricConfig {
            interval: MAX_INTERVAL_MINUTES,
            ..valid_metric()
        };
        let spec = m.to_spec("yearly").unwrap();
        assert_eq!(spec.interval, Duration::from_secs(MAX_INTERVAL_MINUTES * 60));

        for interval in [MAX_INTERVAL_MINUTES + 1, u64::MAX / 60 + 1, u64::MAX] {
            let m = MetricConfig {
                interval,
                ..valid_metric()
            };
            assert_eq!(m.validate(), Err(ValidationError::IntervalTooLarge));
            assert_eq!(m.to_spec("x"), Err(ValidationError::IntervalTooLarge));
        }
    }

    #[test]
    fn test_oversized_interval_from_file() {
        let file = write_config(
            ".toml",
            r#"
            prometheus_url = "http://prometheus:9090"
            aws_region = "us-east-1"

            [metrics.asg-cpu]
            query = "avg(cpu)"
            asg = "my-asg"
            namespace = "MyApp"
            unit = "Percent"
            interval = 307445734561825861
            "#,
        );

        let err = load_and_validate(file.path()).unwrap_err();
        assert_eq!(err.validation(), Some(ValidationError::IntervalTooLarge));
        assert_eq!(err.to_string(), "asg-cpu: interval longer than one year");
    }

    #[test]
    fn test_later_fields_do_not_mask_earlier_errors() {
        let m = MetricConfig {
            query: String::new(),
            unit: "Kelvin".to_string(),
            ..valid_metric()
        };
        assert_eq!(m.validate(), Err(ValidationError::QueryMissing));
    }

    #[test]
    fn test_invalid_unit_rejected() {
        let m = MetricConfig {
            unit: "Kelvin".to_string(),
            ..valid_metric()
        };
        assert_eq!(m.validate(), Err(ValidationError::InvalidUnit));
    }

    #[test]
    fn test_configuration_validation_order() {
        let mut c = Configuration {
            handoff_capacity: 1,
            ..Default::default()
        };
        assert_eq!(c.validate(), Err(ValidationError::RegionMissing));

        c.aws_region = "region".to_string();
        assert_eq!(c.validate(), Err(ValidationError::PrometheusUrlMissing));

        c.prometheus_url = "url".to_string();
        assert_eq!(c.validate(), Ok(()));
    }

    #[test]
    fn test_metric_specs_reports_metric_name() {
        let mut c = Configuration {
            aws_region: "eu-west-1".to_string(),
            prometheus_url: "http://localhost:9090".to_string(),
            handoff_capacity: 1,
            ..Default::default()
        };
        c.metrics.insert("a-good".to_string(), valid_metric());
        c.metrics.insert(
            "b-bad".to_string(),
            MetricConfig {
                interval: 0,
                ..valid_metric()
            },
        );

        let err = c.metric_specs().unwrap_err();
        assert_eq!(err.validation(), Some(ValidationError::IntervalMissing));
        assert_eq!(err.to_string(), "b-bad: interval missing or has a value of 0");
    }

    #[test]
    fn test_top_level_errors_win_over_metric_errors() {
        let mut c = Configuration {
            handoff_capacity: 1,
            ..Default::default()
        };
        c.metrics.insert("broken".to_string(), MetricConfig::default());

        let err = c.metric_specs().unwrap_err();
        assert_eq!(err.validation(), Some(ValidationError::RegionMissing));
    }

    #[test]
    fn test_load_from_toml_file() {
        let file = write_config(
            ".toml",
            r#"
            prometheus_url = "http://prometheus:9090"
            aws_region = "us-east-1"

            [metrics.asg-cpu]
            query = "avg(cpu)"
            asg = "my-asg"
            namespace = "MyApp"
            unit = "Percent"
            interval = 1

            [metrics.asg-mem]
            query = "avg(mem)"
            asg = "my-asg"
            namespace = "MyApp"
            unit = "Bytes"
            interval = 5
            "#,
        );

        let (config, specs) = load_and_validate(file.path()).unwrap();
        assert_eq!(config.aws_region, "us-east-1");
        assert!(config.publish_empty_batches);
        assert_eq!(config.handoff_capacity, 1);
        assert_eq!(config.dimension_name, DEFAULT_DIMENSION_NAME);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.query_timeout_secs, None);

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "asg-cpu");
        assert_eq!(specs[0].unit, Unit::Percent);
        assert_eq!(specs[0].interval, Duration::from_secs(60));
        assert_eq!(specs[1].name, "asg-mem");
        assert_eq!(specs[1].interval, Duration::from_secs(300));
    }

    #[test]
    fn test_load_optional_settings() {
        let file = write_config(
            ".toml",
            r#"
            prometheus_url = "http://prometheus:9090"
            aws_region = "us-east-1"
            log_level = "debug"
            publish_empty_batches = false
            handoff_capacity = 4
            dimension_name = "ClusterName"
            query_timeout_secs = 10
            "#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(!config.publish_empty_batches);
        assert_eq!(config.handoff_capacity, 4);
        assert_eq!(config.dimension_name, "ClusterName");
        assert_eq!(config.query_timeout_secs, Some(10));
        assert!(config.metrics.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config("/nonexistent/promwatch.toml").unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_load_unsupported_extension() {
        let file = write_config(".ini", "aws_region = x");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported config format"));
    }

    #[test]
    fn test_load_malformed_file() {
        let file = write_config(".toml", "aws_region = ");
        assert!(matches!(load_config(file.path()), Err(AgentError::Config(_))));
    }
}
