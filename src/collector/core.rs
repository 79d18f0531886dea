//! Core collector trait and query result type
use log::{error, warn};

use crate::error::Result;

/// The outcome of evaluating one query, decided at the collector boundary
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// An instant vector; one value per returned series
    Vector(Vec<f64>),
    /// Any other result shape, carrying the reported result type
    Unsupported(String),
}

/// A source of numeric values for queries
///
/// Implementations are shared by every metric task and must be safe to call
/// concurrently.
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Evaluate a query against the metrics source
    async fn query(&self, query: &str) -> Result<QueryResult>;

    /// Evaluate a query, logging failures and unsupported results
    ///
    /// Never fails: anything other than a vector yields an empty sequence,
    /// and non-finite values are dropped.
    async fn collect(&self, query: &str) -> Vec<f64> {
        match self.query(query).await {
            Ok(QueryResult::Vector(values)) => {
                values.into_iter().filter(|v| v.is_finite()).collect()
            }
            Ok(QueryResult::Unsupported(kind)) => {
                warn!("Unsupported result type '{}' for query '{}'", kind, query);
                Vec::new()
            }
            Err(e) => {
                error!("Error executing query '{}': {}", query, e);
                Vec::new()
            }
        }
    }

    /// Get the collector name
    fn name(&self) -> &str;
}
