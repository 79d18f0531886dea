// src/error.rs
use std::io;
use thiserror::Error;

/// Result type used throughout promwatch
pub type Result<T> = std::result::Result<T, AgentError>;

/// Configuration validation failures, in the order they are checked
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("aws_region missing")]
    RegionMissing,

    #[error("prometheus_url missing")]
    PrometheusUrlMissing,

    #[error("handoff_capacity must be greater than 0")]
    HandoffCapacityZero,

    #[error("query missing")]
    QueryMissing,

    #[error("asg missing")]
    AsgMissing,

    #[error("namespace missing")]
    NamespaceMissing,

    #[error("unit missing")]
    UnitMissing,

    #[error("invalid unit")]
    InvalidUnit,

    #[error("interval missing or has a value of 0")]
    IntervalMissing,

    #[error("interval longer than one year")]
    IntervalTooLarge,
}

/// Custom Error type for promwatch
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{metric}: {source}")]
    InvalidMetric {
        metric: String,
        source: ValidationError,
    },

    #[error("Collection error: {0}")]
    Collection(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

impl AgentError {
    /// The validation failure behind this error, if any
    pub fn validation(&self) -> Option<ValidationError> {
        match self {
            AgentError::Validation(e) => Some(*e),
            AgentError::InvalidMetric { source, .. } => Some(*source),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Collection(err.to_string())
    }
}
