use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_cloudwatch::Client;
use aws_sdk_cloudwatch::config::Region;
use aws_sdk_cloudwatch::error::DisplayErrorContext;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{Dimension, MetricDatum, StandardUnit};
use log::{debug, info};

use super::Publisher;
use crate::error::{AgentError, Result};
use crate::metric::Batch;

/// Upper bound on datums accepted by a single PutMetricData call
pub const MAX_DATUMS_PER_REQUEST: usize = 1000;

/// Publishes batches with CloudWatch `PutMetricData`
pub struct CloudWatchPublisher {
    client: Client,
    dimension_name: String,
    name: String,
}

impl CloudWatchPublisher {
    /// Create a publisher for `region`, resolving credentials up front
    ///
    /// Fails when no credentials can be found; once constructed the client is
    /// assumed usable for the lifetime of the process.
    pub async fn new(region: &str, dimension_name: impl Into<String>) -> Result<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let provider = sdk_config
            .credentials_provider()
            .ok_or_else(|| AgentError::Credentials("No credentials provider configured".to_string()))?;
        provider
            .provide_credentials()
            .await
            .map_err(|e| AgentError::Credentials(DisplayErrorContext(e).to_string()))?;

        info!("CloudWatch credentials resolved for region {}", region);

        Ok(Self {
            client: Client::new(&sdk_config),
            dimension_name: dimension_name.into(),
            name: format!("cloudwatch:{}", region),
        })
    }

    /// Translate a batch into CloudWatch datums
    pub fn to_metric_data(batch: &Batch, dimension_name: &str) -> Vec<MetricDatum> {
        batch
            .samples
            .iter()
            .map(|sample| {
                MetricDatum::builder()
                    .metric_name(&sample.name)
                    .value(sample.value)
                    .unit(StandardUnit::from(sample.unit.as_str()))
                    .timestamp(DateTime::from_millis(sample.timestamp.timestamp_millis()))
                    .dimensions(
                        Dimension::builder()
                            .name(dimension_name)
                            .value(&sample.asg)
                            .build(),
                    )
                    .build()
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Publisher for CloudWatchPublisher {
    async fn publish(&mut self, batch: Batch) -> Result<()> {
        let data = Self::to_metric_data(&batch, &self.dimension_name);

        // PutMetricData rejects an empty MetricData list
        if data.is_empty() {
            debug!("Nothing to publish for namespace {}", batch.namespace);
            return Ok(());
        }

        for chunk in data.chunks(MAX_DATUMS_PER_REQUEST) {
            self.client
                .put_metric_data()
                .namespace(&batch.namespace)
                .set_metric_data(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| AgentError::Publish(DisplayErrorContext(e).to_string()))?;
        }

        debug!(
            "Published {} samples to namespace {}",
            batch.len(),
            batch.namespace
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
