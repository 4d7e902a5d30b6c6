use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One recorded attempt to carry out a decision. Append-only: never
/// mutated or deleted once stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    pub decision_id: String,
    pub status: ExecutionStatus,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub risk: f64,
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
}

/// Ingestion payload for an execution attempt. Id and (absent a caller
/// value) timestamp are assigned by the lifecycle manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionAppend {
    pub decision_id: String,
    pub status: ExecutionStatus,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub risk: f64,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ExecutionAppend {
    pub fn new(decision_id: impl Into<String>, status: ExecutionStatus) -> Self {
        Self {
            decision_id: decision_id.into(),
            status,
            duration_ms: 0,
            risk: 0.0,
            outcome: String::new(),
            timestamp: None,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_risk(mut self, risk: f64) -> Self {
        self.risk = risk;
        self
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = outcome.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Materializes the stored record.
    pub fn into_execution(self, now: DateTime<Utc>) -> Execution {
        Execution {
            id: Uuid::new_v4(),
            decision_id: self.decision_id,
            status: self.status,
            duration_ms: self.duration_ms,
            risk: self.risk,
            outcome: self.outcome,
            timestamp: self.timestamp.unwrap_or(now),
        }
    }
}
