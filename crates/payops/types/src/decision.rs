use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Oversight lifecycle status of a decision.
///
/// `pending` is the only initial state. `rejected` and `executed` are
/// terminal: no transition leads out of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl DecisionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DecisionStatus::Rejected | DecisionStatus::Executed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Pending => "pending",
            DecisionStatus::Approved => "approved",
            DecisionStatus::Rejected => "rejected",
            DecisionStatus::Executed => "executed",
        }
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk tier derived from a decision's anomaly score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyTier {
    Low,
    Medium,
    High,
}

impl AnomalyTier {
    /// Tier boundaries: low below 0.34, high from 0.67, medium between.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.67 {
            AnomalyTier::High
        } else if score >= 0.34 {
            AnomalyTier::Medium
        } else {
            AnomalyTier::Low
        }
    }
}

impl std::fmt::Display for AnomalyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnomalyTier::Low => "low",
            AnomalyTier::Medium => "medium",
            AnomalyTier::High => "high",
        };
        f.write_str(s)
    }
}

/// One piece of evidence behind a decision. Pattern order is insertion
/// order and is preserved end-to-end.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Pattern {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// An automated payment-related decision under human oversight.
///
/// The id is producer-generated and immutable. Approval attribution
/// (`human_approval_given`, `approved_by`, `approved_at`) is written
/// exactly once, by the approval transition; rejected decisions keep
/// `human_approval_given = false`. `updated_at` moves on every lifecycle
/// transition and only then.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub id: String,
    pub action_type: String,
    pub confidence: f64,
    pub anomaly_score: f64,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hypothesis: Option<String>,
    pub approval_required: bool,
    pub human_approval_given: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    pub status: DecisionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Decision {
    /// Builds the stored record from a producer draft. Status starts at
    /// `pending` with approval attribution cleared, whatever the draft
    /// carried upstream.
    pub fn from_draft(draft: DecisionDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: draft.id,
            action_type: draft.action_type,
            confidence: draft.confidence,
            anomaly_score: draft.anomaly_score,
            patterns: draft.patterns,
            hypothesis: draft.hypothesis,
            approval_required: draft.approval_required,
            human_approval_given: false,
            approved_by: None,
            approved_at: None,
            status: DecisionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn anomaly_tier(&self) -> AnomalyTier {
        AnomalyTier::from_score(self.anomaly_score)
    }
}

/// Producer-side payload for a new decision. Lifecycle fields are assigned
/// at ingestion, never taken from the producer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionDraft {
    pub id: String,
    pub action_type: String,
    pub confidence: f64,
    pub anomaly_score: f64,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hypothesis: Option<String>,
    pub approval_required: bool,
}

impl DecisionDraft {
    pub fn new(id: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action_type: action_type.into(),
            confidence: 0.0,
            anomaly_score: 0.0,
            patterns: Vec::new(),
            hypothesis: None,
            approval_required: true,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_anomaly_score(mut self, score: f64) -> Self {
        self.anomaly_score = score;
        self
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn with_hypothesis(mut self, hypothesis: impl Into<String>) -> Self {
        self.hypothesis = Some(hypothesis.into());
        self
    }

    pub fn approval_required(mut self, required: bool) -> Self {
        self.approval_required = required;
        self
    }
}
