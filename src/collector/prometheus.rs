//! Collector backed by the Prometheus HTTP query API
use chrono::Utc;
use log::{debug, warn};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::core::{Collector, QueryResult};
use crate::error::{AgentError, Result};

/// Envelope returned by every Prometheus API endpoint
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(rename = "errorType", default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

/// One series of an instant vector: `{"metric": {...}, "value": [ts, "v"]}`
#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: (f64, String),
}

/// Decode the body of an instant query response
pub(crate) fn parse_response(body: &str) -> Result<QueryResult> {
    let response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| AgentError::Collection(format!("Malformed query response: {}", e)))?;

    if response.status != "success" {
        return Err(AgentError::Collection(format!(
            "{}: {}",
            response.error_type.as_deref().unwrap_or("error"),
            response.error.as_deref().unwrap_or("unknown error")
        )));
    }

    let data = response
        .data
        .ok_or_else(|| AgentError::Collection("Query response has no data".to_string()))?;

    if data.result_type != "vector" {
        return Ok(QueryResult::Unsupported(data.result_type));
    }

    let samples: Vec<VectorSample> = serde_json::from_value(data.result)
        .map_err(|e| AgentError::Collection(format!("Malformed vector result: {}", e)))?;

    let values = samples
        .into_iter()
        .filter_map(|sample| match sample.value.1.parse::<f64>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(
                    "Skipping unparsable value '{}' for series {:?}",
                    sample.value.1, sample.metric
                );
                None
            }
        })
        .collect();

    Ok(QueryResult::Vector(values))
}

/// Evaluates instant queries against a Prometheus server
pub struct PrometheusCollector {
    client: Client,
    endpoint: Url,
    name: String,
}

impl PrometheusCollector {
    /// Create a collector for the server at `url`
    pub fn new(url: &str, timeout: Option<Duration>) -> Result<Self> {
        let endpoint = Url::parse(&format!("{}/api/v1/query", url.trim_end_matches('/')))
            .map_err(|e| AgentError::Config(format!("Invalid prometheus_url '{}': {}", url, e)))?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            name: url.to_string(),
        })
    }

    /// The full query endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Collector for PrometheusCollector {
    async fn query(&self, query: &str) -> Result<QueryResult> {
        let time = format!("{:.3}", Utc::now().timestamp_millis() as f64 / 1000.0);
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("time", &time);

        debug!("Querying {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        match parse_response(&body) {
            Err(e) if !status.is_success() => {
                Err(AgentError::Collection(format!("HTTP {}: {}", status, e)))
            }
            result => result,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
