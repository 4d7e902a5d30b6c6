use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// KPI snapshot over the decision population. Derived, never stored; the
/// entity collections remain the source of truth.
///
/// Averages and rates are `0.0` when their underlying population is
/// empty, never `NaN`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_decisions: u64,
    pub executed: u64,
    pub approved: u64,
    pub rejected: u64,
    pub avg_confidence: f64,
    pub avg_accuracy: f64,
    /// Successful executions over all executions.
    pub success_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Zeroed snapshot for an empty population.
    pub fn empty(last_updated: DateTime<Utc>) -> Self {
        Self {
            total_decisions: 0,
            executed: 0,
            approved: 0,
            rejected: 0,
            avg_confidence: 0.0,
            avg_accuracy: 0.0,
            success_rate: 0.0,
            last_updated,
        }
    }

    /// Field-wise equality ignoring `last_updated`. Two computations over
    /// the same population must agree on everything else.
    pub fn same_population(&self, other: &Self) -> bool {
        self.total_decisions == other.total_decisions
            && self.executed == other.executed
            && self.approved == other.approved
            && self.rejected == other.rejected
            && self.avg_confidence == other.avg_confidence
            && self.avg_accuracy == other.avg_accuracy
            && self.success_rate == other.success_rate
    }
}

/// Per-action-type slice of the execution and outcome history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionTypeStats {
    pub decisions: u64,
    pub executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub success_rate: f64,
    pub avg_accuracy: f64,
}
