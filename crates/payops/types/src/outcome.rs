use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Predicted-vs-actual comparison for a decision. Append-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub id: Uuid,
    pub decision_id: String,
    pub predicted: String,
    pub actual: String,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

/// Ingestion payload for an outcome record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeAppend {
    pub decision_id: String,
    pub predicted: String,
    pub actual: String,
    pub accuracy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl OutcomeAppend {
    pub fn new(
        decision_id: impl Into<String>,
        predicted: impl Into<String>,
        actual: impl Into<String>,
        accuracy: f64,
    ) -> Self {
        Self {
            decision_id: decision_id.into(),
            predicted: predicted.into(),
            actual: actual.into(),
            accuracy,
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn into_outcome(self, now: DateTime<Utc>) -> Outcome {
        Outcome {
            id: Uuid::new_v4(),
            decision_id: self.decision_id,
            predicted: self.predicted,
            actual: self.actual,
            accuracy: self.accuracy,
            timestamp: self.timestamp.unwrap_or(now),
        }
    }
}
