use crate::error::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payops_types::{AuditEntry, AuditLevel, Decision, DecisionStatus, Execution, Outcome};
use std::cmp::Reverse;

/// Selection over the decision collection. Results are unsorted; callers
/// that need an order sort the returned snapshot.
#[derive(Clone, Debug, Default)]
pub struct DecisionFilter {
    pub status: Option<DecisionStatus>,
    pub min_confidence: Option<f64>,
    pub limit: Option<usize>,
}

impl DecisionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: DecisionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, decision: &Decision) -> bool {
        if let Some(status) = self.status {
            if decision.status != status {
                return false;
            }
        }
        if let Some(min_confidence) = self.min_confidence {
            if decision.confidence < min_confidence {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, decisions: &[Decision]) -> Vec<Decision> {
        let mut selected: Vec<Decision> = decisions
            .iter()
            .filter(|d| self.matches(d))
            .cloned()
            .collect();
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Selection over the audit log. `apply` orders most-recent-first
/// (timestamp descending, equal timestamps keep insertion order) before
/// the limit is taken.
#[derive(Clone, Debug, Default)]
pub struct AuditLogFilter {
    pub level: Option<AuditLevel>,
    pub module: Option<String>,
    pub limit: Option<usize>,
}

impl AuditLogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: AuditLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(level) = self.level {
            if entry.level != level {
                return false;
            }
        }
        if let Some(module) = &self.module {
            if &entry.module != module {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, entries: &[AuditEntry]) -> Vec<AuditEntry> {
        let mut selected: Vec<AuditEntry> = entries
            .iter()
            .filter(|e| self.matches(e))
            .cloned()
            .collect();
        selected.sort_by_key(|e| Reverse(e.timestamp));
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Approval attribution written by an approve transition.
#[derive(Clone, Debug)]
pub struct ApprovalStamp {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

/// Status write applied by the compare-and-set transition. Carrying an
/// `approval` stamp also sets `human_approval_given`.
#[derive(Clone, Debug)]
pub struct DecisionTransition {
    pub to: DecisionStatus,
    pub approval: Option<ApprovalStamp>,
    pub updated_at: DateTime<Utc>,
}

impl DecisionTransition {
    pub fn to(status: DecisionStatus, updated_at: DateTime<Utc>) -> Self {
        Self {
            to: status,
            approval: None,
            updated_at,
        }
    }

    pub fn with_approval(
        mut self,
        approved_by: impl Into<String>,
        approved_at: DateTime<Utc>,
    ) -> Self {
        self.approval = Some(ApprovalStamp {
            approved_by: approved_by.into(),
            approved_at,
        });
        self
    }
}

/// Decision system-of-record operations.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Persists a new decision. Fails with `Conflict` when the id exists.
    async fn create_decision(&self, decision: Decision) -> StorageResult<()>;

    async fn get_decision(&self, decision_id: &str) -> StorageResult<Option<Decision>>;

    async fn list_decisions(&self, filter: DecisionFilter) -> StorageResult<Vec<Decision>>;

    /// Compare-and-set status transition: applies `change` only while the
    /// stored status still equals `expected_from`, in one adapter round
    /// trip. Fails with `InvariantViolation` when the status moved, and
    /// `NotFound` for an unknown id. Returns the post-transition record.
    async fn transition_decision(
        &self,
        decision_id: &str,
        expected_from: DecisionStatus,
        change: DecisionTransition,
    ) -> StorageResult<Decision>;
}

/// Append-only execution attempts.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn append_execution(&self, execution: Execution) -> StorageResult<()>;

    /// All executions for a decision, ascending by timestamp.
    async fn list_executions(&self, decision_id: &str) -> StorageResult<Vec<Execution>>;
}

/// Append-only predicted-vs-actual outcomes.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn append_outcome(&self, outcome: Outcome) -> StorageResult<()>;

    /// All outcomes for a decision, ascending by timestamp.
    async fn list_outcomes(&self, decision_id: &str) -> StorageResult<Vec<Outcome>>;
}

/// Append-only classified audit log.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit_log(&self, entry: AuditEntry) -> StorageResult<()>;

    /// Matching entries, most-recent-first.
    async fn list_audit_logs(&self, filter: AuditLogFilter) -> StorageResult<Vec<AuditEntry>>;
}

/// Blanket trait for a full PayOps storage backend.
pub trait PayopsStore: DecisionStore + ExecutionStore + OutcomeStore + AuditStore {}

impl<T> PayopsStore for T where T: DecisionStore + ExecutionStore + OutcomeStore + AuditStore {}
