//! Metric definitions and the samples produced from them
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ValidationError;

macro_rules! units {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// CloudWatch standard units accepted in metric definitions
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Unit {
            $($variant,)+
        }

        impl Unit {
            /// Every accepted unit
            pub const ALL: &'static [Unit] = &[$(Unit::$variant),+];

            /// The unit as it appears in configuration and on the wire
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Unit::$variant => $name,)+
                }
            }
        }

        impl FromStr for Unit {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Unit::$variant),)+
                    _ => Err(ValidationError::InvalidUnit),
                }
            }
        }
    };
}

units! {
    Seconds => "Seconds",
    Microseconds => "Microseconds",
    Milliseconds => "Milliseconds",
    Bytes => "Bytes",
    Kilobytes => "Kilobytes",
    Megabytes => "Megabytes",
    Gigabytes => "Gigabytes",
    Terabytes => "Terabytes",
    Bits => "Bits",
    Kilobits => "Kilobits",
    Megabits => "Megabits",
    Gigabits => "Gigabits",
    Terabits => "Terabits",
    Percent => "Percent",
    Count => "Count",
    BytesPerSecond => "Bytes/Second",
    KilobytesPerSecond => "Kilobytes/Second",
    MegabytesPerSecond => "Megabytes/Second",
    GigabytesPerSecond => "Gigabytes/Second",
    TerabytesPerSecond => "Terabytes/Second",
    BitsPerSecond => "Bits/Second",
    KilobitsPerSecond => "Kilobits/Second",
    MegabitsPerSecond => "Megabits/Second",
    GigabitsPerSecond => "Gigabits/Second",
    TerabitsPerSecond => "Terabits/Second",
    CountPerSecond => "Count/Second",
    None => "None",
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, immutable description of one metric to poll
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    /// Metric name, unique within the configuration
    pub name: String,
    /// Query evaluated against the metrics source
    pub query: String,
    /// Grouping key attached to every sample (the auto scaling group)
    pub asg: String,
    /// Destination namespace
    pub namespace: String,
    /// Unit reported with every sample
    pub unit: Unit,
    /// Polling interval
    pub interval: Duration,
}

/// A single observation tagged with its metric's metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub name: String,
    pub asg: String,
    pub namespace: String,
    pub unit: Unit,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// One tick's worth of samples from a single metric task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    /// Namespace of the owning metric
    pub namespace: String,
    /// The samples in collection order
    pub samples: Vec<Sample>,
}

impl Batch {
    /// Tag every value with the spec's metadata and a shared timestamp
    pub fn from_values(spec: &MetricSpec, values: Vec<f64>, timestamp: DateTime<Utc>) -> Self {
        let samples = values
            .into_iter()
            .filter(|v| v.is_finite())
            .map(|value| Sample {
                name: spec.name.clone(),
                asg: spec.asg.clone(),
                namespace: spec.namespace.clone(),
                unit: spec.unit,
                value,
                timestamp,
            })
            .collect();

        Self {
            namespace: spec.namespace.clone(),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
