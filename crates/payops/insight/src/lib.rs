//! PayOps insight layer - correlation reads and KPI aggregation.
//!
//! Two read-side components over the same storage adapter: the
//! [`CorrelationEngine`] joins a decision with its execution and outcome
//! history, and the [`MetricsAggregator`] computes the KPI snapshot from
//! the full entity population. Both recompute from storage on every call;
//! nothing here is a source of truth.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod correlation;
mod metrics;

pub use correlation::{CorrelationEngine, DecisionDetail};
pub use metrics::MetricsAggregator;

use payops_storage::StorageError;
use thiserror::Error;

/// Insight-layer errors.
#[derive(Debug, Error)]
pub enum InsightError {
    #[error("decision not found: {0}")]
    NotFound(String),

    #[error("metrics aggregation failed: {0}")]
    Aggregation(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for InsightError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Storage(other),
        }
    }
}
