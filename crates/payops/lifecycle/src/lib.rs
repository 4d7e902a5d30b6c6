//! PayOps lifecycle manager - human oversight over automated decisions.
//!
//! Owns the decision state machine (pending → approved | rejected →
//! executed) and the ingestion paths for decisions, executions, and
//! outcomes. Persistence is delegated to a `payops-storage` adapter;
//! transitions go through the adapter's compare-and-set so a concurrent
//! approve/reject pair resolves to exactly one winner. Every transition
//! and every refused attempt lands in the audit log.

#![deny(unsafe_code)]

use chrono::Utc;
use payops_audit::{modules, storage_failure_level};
use payops_storage::{
    DecisionFilter, DecisionTransition, InMemoryPayopsStore, PayopsStore, StorageError,
};
use payops_types::{
    AuditEntry, AuditLevel, Decision, DecisionDraft, DecisionStatus, Execution, ExecutionAppend,
    Outcome, OutcomeAppend,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Decision lifecycle facade.
///
/// All operations run to completion against a single storage adapter;
/// the manager keeps no decision state of its own.
pub struct LifecycleManager {
    store: Arc<dyn PayopsStore>,
}

impl LifecycleManager {
    /// Manager backed by the in-memory reference adapter.
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryPayopsStore::new()),
        }
    }

    /// Manager backed by an explicit storage adapter.
    pub fn with_store(store: Arc<dyn PayopsStore>) -> Self {
        Self { store }
    }

    /// Access the underlying storage adapter.
    pub fn store(&self) -> Arc<dyn PayopsStore> {
        Arc::clone(&self.store)
    }

    /// Ingests a producer decision. The stored record always starts
    /// `pending` with approval attribution cleared.
    pub async fn record_decision(&self, draft: DecisionDraft) -> Result<Decision, LifecycleError> {
        if let Err(reason) = validate_draft(&draft) {
            let err = LifecycleError::Validation(reason);
            self.audit_attempt_failure(&draft.id, "record_decision", None, &err)
                .await;
            return Err(err);
        }

        let decision = Decision::from_draft(draft, Utc::now());
        if let Err(storage_err) = self.store.create_decision(decision.clone()).await {
            let err = LifecycleError::from(storage_err);
            self.audit_attempt_failure(&decision.id, "record_decision", None, &err)
                .await;
            return Err(err);
        }

        info!(
            decision_id = %decision.id,
            action_type = %decision.action_type,
            anomaly_tier = %decision.anomaly_tier(),
            "decision recorded"
        );
        Ok(decision)
    }

    /// Human approval. Allowed only while the decision is still pending;
    /// writes the approval attribution exactly once.
    pub async fn approve(
        &self,
        decision_id: &str,
        approved_by: &str,
    ) -> Result<Decision, LifecycleError> {
        let now = Utc::now();
        let change =
            DecisionTransition::to(DecisionStatus::Approved, now).with_approval(approved_by, now);

        match self
            .store
            .transition_decision(decision_id, DecisionStatus::Pending, change)
            .await
        {
            Ok(updated) => {
                info!(decision_id = %decision_id, actor = %approved_by, "decision approved");
                self.audit_transition(
                    decision_id,
                    "decision approved",
                    DecisionStatus::Pending,
                    DecisionStatus::Approved,
                    Some(approved_by),
                )
                .await?;
                Ok(updated)
            }
            Err(storage_err) => {
                let err = LifecycleError::from(storage_err);
                self.audit_attempt_failure(decision_id, "approve", Some(approved_by), &err)
                    .await;
                Err(err)
            }
        }
    }

    /// Human rejection. Allowed only while pending; `human_approval_given`
    /// stays false and the actor is recorded in the audit entry only.
    pub async fn reject(
        &self,
        decision_id: &str,
        rejected_by: &str,
    ) -> Result<Decision, LifecycleError> {
        let change = DecisionTransition::to(DecisionStatus::Rejected, Utc::now());

        match self
            .store
            .transition_decision(decision_id, DecisionStatus::Pending, change)
            .await
        {
            Ok(updated) => {
                info!(decision_id = %decision_id, actor = %rejected_by, "decision rejected");
                self.audit_transition(
                    decision_id,
                    "decision rejected",
                    DecisionStatus::Pending,
                    DecisionStatus::Rejected,
                    Some(rejected_by),
                )
                .await?;
                Ok(updated)
            }
            Err(storage_err) => {
                let err = LifecycleError::from(storage_err);
                self.audit_attempt_failure(decision_id, "reject", Some(rejected_by), &err)
                    .await;
                Err(err)
            }
        }
    }

    /// Marks the decision executed: from `approved`, or straight from
    /// `pending` when the decision never required human approval.
    pub async fn mark_executed(&self, decision_id: &str) -> Result<Decision, LifecycleError> {
        let current = match self.fetch_decision(decision_id).await {
            Ok(decision) => decision,
            Err(err) => {
                self.audit_attempt_failure(decision_id, "execute", None, &err)
                    .await;
                return Err(err);
            }
        };

        let expected_from = match current.status {
            DecisionStatus::Approved => DecisionStatus::Approved,
            DecisionStatus::Pending if !current.approval_required => DecisionStatus::Pending,
            DecisionStatus::Pending => {
                let err = LifecycleError::InvalidTransition(format!(
                    "decision {} requires human approval before execution",
                    decision_id
                ));
                self.audit_attempt_failure(decision_id, "execute", None, &err)
                    .await;
                return Err(err);
            }
            other => {
                let err = LifecycleError::InvalidTransition(format!(
                    "cannot execute from status {:?}",
                    other
                ));
                self.audit_attempt_failure(decision_id, "execute", None, &err)
                    .await;
                return Err(err);
            }
        };

        let change = DecisionTransition::to(DecisionStatus::Executed, Utc::now());
        match self
            .store
            .transition_decision(decision_id, expected_from, change)
            .await
        {
            Ok(updated) => {
                info!(decision_id = %decision_id, from = %expected_from, "decision executed");
                self.audit_transition(
                    decision_id,
                    "decision executed",
                    expected_from,
                    DecisionStatus::Executed,
                    None,
                )
                .await?;
                Ok(updated)
            }
            Err(storage_err) => {
                let err = LifecycleError::from(storage_err);
                self.audit_attempt_failure(decision_id, "execute", None, &err)
                    .await;
                Err(err)
            }
        }
    }

    /// Ingests an execution attempt for an existing decision.
    pub async fn record_execution(
        &self,
        append: ExecutionAppend,
    ) -> Result<Execution, LifecycleError> {
        if !in_unit_interval(append.risk) {
            let err = LifecycleError::Validation(format!(
                "execution risk {} outside [0, 1]",
                append.risk
            ));
            self.audit_attempt_failure(&append.decision_id, "record_execution", None, &err)
                .await;
            return Err(err);
        }
        self.require_decision(&append.decision_id, "record_execution")
            .await?;

        let execution = append.into_execution(Utc::now());
        if let Err(storage_err) = self.store.append_execution(execution.clone()).await {
            let err = LifecycleError::from(storage_err);
            self.audit_attempt_failure(&execution.decision_id, "record_execution", None, &err)
                .await;
            return Err(err);
        }

        info!(
            decision_id = %execution.decision_id,
            execution_id = %execution.id,
            status = %execution.status,
            "execution recorded"
        );
        self.audit_committed(
            AuditEntry::info(modules::LIFECYCLE, "execution recorded")
                .with_metadata("decisionId", &execution.decision_id)
                .with_metadata("executionId", execution.id)
                .with_metadata("status", execution.status)
                .with_metadata("duration", execution.duration_ms),
        )
        .await?;
        Ok(execution)
    }

    /// Ingests a predicted-vs-actual outcome for an existing decision.
    pub async fn record_outcome(&self, append: OutcomeAppend) -> Result<Outcome, LifecycleError> {
        if !in_unit_interval(append.accuracy) {
            let err = LifecycleError::Validation(format!(
                "outcome accuracy {} outside [0, 1]",
                append.accuracy
            ));
            self.audit_attempt_failure(&append.decision_id, "record_outcome", None, &err)
                .await;
            return Err(err);
        }
        self.require_decision(&append.decision_id, "record_outcome")
            .await?;

        let outcome = append.into_outcome(Utc::now());
        if let Err(storage_err) = self.store.append_outcome(outcome.clone()).await {
            let err = LifecycleError::from(storage_err);
            self.audit_attempt_failure(&outcome.decision_id, "record_outcome", None, &err)
                .await;
            return Err(err);
        }

        info!(
            decision_id = %outcome.decision_id,
            outcome_id = %outcome.id,
            accuracy = outcome.accuracy,
            "outcome recorded"
        );
        self.audit_committed(
            AuditEntry::info(modules::LIFECYCLE, "outcome recorded")
                .with_metadata("decisionId", &outcome.decision_id)
                .with_metadata("outcomeId", outcome.id)
                .with_metadata("accuracy", outcome.accuracy),
        )
        .await?;
        Ok(outcome)
    }

    pub async fn get_decision(
        &self,
        decision_id: &str,
    ) -> Result<Option<Decision>, LifecycleError> {
        Ok(self.store.get_decision(decision_id).await?)
    }

    pub async fn list_decisions(
        &self,
        filter: DecisionFilter,
    ) -> Result<Vec<Decision>, LifecycleError> {
        Ok(self.store.list_decisions(filter).await?)
    }

    async fn fetch_decision(&self, decision_id: &str) -> Result<Decision, LifecycleError> {
        self.store
            .get_decision(decision_id)
            .await
            .map_err(LifecycleError::from)?
            .ok_or_else(|| LifecycleError::NotFound(decision_id.to_string()))
    }

    async fn require_decision(
        &self,
        decision_id: &str,
        operation: &str,
    ) -> Result<(), LifecycleError> {
        if let Err(err) = self.fetch_decision(decision_id).await {
            self.audit_attempt_failure(decision_id, operation, None, &err)
                .await;
            return Err(err);
        }
        Ok(())
    }

    async fn audit_transition(
        &self,
        decision_id: &str,
        message: &str,
        from: DecisionStatus,
        to: DecisionStatus,
        actor: Option<&str>,
    ) -> Result<(), LifecycleError> {
        let mut entry = AuditEntry::info(modules::LIFECYCLE, message)
            .with_metadata("decisionId", decision_id)
            .with_metadata("from", from)
            .with_metadata("to", to);
        if let Some(actor) = actor {
            entry = entry.with_metadata("actor", actor);
        }
        self.audit_committed(entry).await
    }

    /// Appends the audit entry for an already committed operation. A
    /// failure here surfaces as a storage error even though the primary
    /// write landed: the audit trail is part of the contract.
    async fn audit_committed(&self, entry: AuditEntry) -> Result<(), LifecycleError> {
        self.store.append_audit_log(entry).await.map_err(|err| {
            error!(error = %err, "audit append failed after committed operation");
            LifecycleError::Storage(err)
        })
    }

    /// Audits a refused attempt. The original error stays primary, so an
    /// audit append failure is only logged here.
    async fn audit_attempt_failure(
        &self,
        decision_id: &str,
        operation: &str,
        actor: Option<&str>,
        err: &LifecycleError,
    ) {
        if matches!(err, LifecycleError::Storage(_)) {
            error!(decision_id = %decision_id, operation = %operation, error = %err, "lifecycle operation failed");
        } else {
            warn!(decision_id = %decision_id, operation = %operation, error = %err, "lifecycle attempt refused");
        }

        let mut entry = AuditEntry::new(
            failure_level(err),
            modules::LIFECYCLE,
            format!("{} attempt failed", operation),
        )
        .with_metadata("decisionId", decision_id)
        .with_metadata("operation", operation)
        .with_metadata("reason", err.to_string());
        if let Some(actor) = actor {
            entry = entry.with_metadata("actor", actor);
        }
        if let Err(append_err) = self.store.append_audit_log(entry).await {
            error!(error = %append_err, "audit append failed for refused attempt");
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

fn in_unit_interval(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

fn validate_draft(draft: &DecisionDraft) -> Result<(), String> {
    if !in_unit_interval(draft.confidence) {
        return Err(format!("confidence {} outside [0, 1]", draft.confidence));
    }
    if !in_unit_interval(draft.anomaly_score) {
        return Err(format!(
            "anomaly score {} outside [0, 1]",
            draft.anomaly_score
        ));
    }
    for pattern in &draft.patterns {
        if let Some(confidence) = pattern.confidence {
            if !in_unit_interval(confidence) {
                return Err(format!(
                    "pattern {} confidence {} outside [0, 1]",
                    pattern.name, confidence
                ));
            }
        }
    }
    Ok(())
}

/// Recoverable refusals audit at warn; `Storage` means the adapter
/// itself failed and classifies through `storage_failure_level`.
fn failure_level(err: &LifecycleError) -> AuditLevel {
    match err {
        LifecycleError::Storage(inner) => storage_failure_level(inner),
        _ => AuditLevel::Warn,
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Decision not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for LifecycleError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::Conflict(msg) => Self::Validation(msg),
            StorageError::InvariantViolation(msg) => Self::InvalidTransition(msg),
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payops_storage::AuditLogFilter;
    use payops_types::ExecutionStatus;
    use proptest::prelude::*;

    #[tokio::test]
    async fn approve_writes_attribution_once() {
        let manager = LifecycleManager::new();
        manager.record_decision(draft("d1")).await.unwrap();

        let approved = manager.approve("d1", "alice").await.unwrap();
        assert_eq!(approved.status, DecisionStatus::Approved);
        assert!(approved.human_approval_given);
        assert_eq!(approved.approved_by.as_deref(), Some("alice"));
        assert_eq!(approved.approved_at, Some(approved.updated_at));

        let second = manager.approve("d1", "bob").await;
        assert!(matches!(second, Err(LifecycleError::InvalidTransition(_))));

        let stored = manager.get_decision("d1").await.unwrap().unwrap();
        assert_eq!(stored, approved);
    }

    #[tokio::test]
    async fn approval_required_blocks_execution_until_disposition() {
        let manager = LifecycleManager::new();
        manager.record_decision(draft("d1")).await.unwrap();

        let result = manager.mark_executed("d1").await;
        assert!(matches!(result, Err(LifecycleError::InvalidTransition(_))));

        let stored = manager.get_decision("d1").await.unwrap().unwrap();
        assert_eq!(stored.status, DecisionStatus::Pending);
    }

    #[tokio::test]
    async fn auto_executable_decision_skips_approval() {
        let manager = LifecycleManager::new();
        manager
            .record_decision(draft("d1").approval_required(false))
            .await
            .unwrap();

        let executed = manager.mark_executed("d1").await.unwrap();
        assert_eq!(executed.status, DecisionStatus::Executed);
        assert!(!executed.human_approval_given);
        assert!(executed.approved_by.is_none());
    }

    #[tokio::test]
    async fn rejected_decisions_stay_rejected() {
        let manager = LifecycleManager::new();
        manager.record_decision(draft("d1")).await.unwrap();

        let rejected = manager.reject("d1", "carol").await.unwrap();
        assert_eq!(rejected.status, DecisionStatus::Rejected);
        assert!(!rejected.human_approval_given);
        assert!(rejected.approved_by.is_none());

        let approve_after = manager.approve("d1", "alice").await;
        assert!(matches!(
            approve_after,
            Err(LifecycleError::InvalidTransition(_))
        ));
        let execute_after = manager.mark_executed("d1").await;
        assert!(matches!(
            execute_after,
            Err(LifecycleError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn unknown_decision_is_not_found() {
        let manager = LifecycleManager::new();
        let result = manager.approve("missing", "alice").await;
        assert!(matches!(result, Err(LifecycleError::NotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_approve_reject_has_one_winner() {
        let manager = Arc::new(LifecycleManager::new());
        manager.record_decision(draft("d1")).await.unwrap();

        let approver = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.approve("d1", "alice").await })
        };
        let rejecter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.reject("d1", "bob").await })
        };

        let approve_result = approver.await.unwrap();
        let reject_result = rejecter.await.unwrap();
        assert!(approve_result.is_ok() != reject_result.is_ok());

        let stored = manager.get_decision("d1").await.unwrap().unwrap();
        if approve_result.is_ok() {
            assert_eq!(stored.status, DecisionStatus::Approved);
            assert_eq!(stored.approved_by.as_deref(), Some("alice"));
        } else {
            assert!(matches!(
                approve_result,
                Err(LifecycleError::InvalidTransition(_))
            ));
            assert_eq!(stored.status, DecisionStatus::Rejected);
            assert!(!stored.human_approval_given);
        }
    }

    #[tokio::test]
    async fn lifecycle_audit_trail_records_approve_then_execute() {
        let manager = LifecycleManager::new();
        manager.record_decision(draft("d1")).await.unwrap();
        manager.approve("d1", "alice").await.unwrap();
        manager.mark_executed("d1").await.unwrap();

        let entries = manager
            .store()
            .list_audit_logs(AuditLogFilter::new().with_module(modules::LIFECYCLE))
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "decision executed");
        assert_eq!(entries[1].message, "decision approved");
        assert_eq!(entries[1].metadata["actor"].as_str(), Some("alice"));
        assert_eq!(entries[1].metadata["from"].as_str(), Some("pending"));
        assert_eq!(entries[1].metadata["to"].as_str(), Some("approved"));
    }

    #[tokio::test]
    async fn refused_attempts_are_audited_at_warn() {
        let manager = LifecycleManager::new();
        manager.record_decision(draft("d1")).await.unwrap();
        manager.approve("d1", "alice").await.unwrap();

        let _ = manager.approve("d1", "bob").await;
        let _ = manager.mark_executed("missing").await;

        let warns = manager
            .store()
            .list_audit_logs(AuditLogFilter::new().with_level(AuditLevel::Warn))
            .await
            .unwrap();
        assert_eq!(warns.len(), 2);
        assert!(warns.iter().all(|e| e.module == modules::LIFECYCLE));
    }

    #[tokio::test]
    async fn out_of_range_scores_fail_validation() {
        let manager = LifecycleManager::new();

        let bad_confidence = manager
            .record_decision(draft("d1").with_confidence(1.5))
            .await;
        assert!(matches!(
            bad_confidence,
            Err(LifecycleError::Validation(_))
        ));

        manager.record_decision(draft("d2")).await.unwrap();
        let bad_risk = manager
            .record_execution(
                ExecutionAppend::new("d2", ExecutionStatus::Success).with_risk(1.2),
            )
            .await;
        assert!(matches!(bad_risk, Err(LifecycleError::Validation(_))));

        let warns = manager
            .store()
            .list_audit_logs(AuditLogFilter::new().with_level(AuditLevel::Warn))
            .await
            .unwrap();
        assert_eq!(warns.len(), 2);
    }

    #[tokio::test]
    async fn execution_and_outcome_ingestion_audit_at_info() {
        let manager = LifecycleManager::new();
        manager
            .record_decision(draft("d1").approval_required(false))
            .await
            .unwrap();
        manager.mark_executed("d1").await.unwrap();

        manager
            .record_execution(
                ExecutionAppend::new("d1", ExecutionStatus::Success)
                    .with_duration_ms(420)
                    .with_risk(0.1)
                    .with_outcome("routing adjusted"),
            )
            .await
            .unwrap();
        manager
            .record_outcome(OutcomeAppend::new("d1", "improved", "improved", 0.95))
            .await
            .unwrap();

        let entries = manager
            .store()
            .list_audit_logs(AuditLogFilter::new().with_level(AuditLevel::Info))
            .await
            .unwrap();
        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert!(messages.contains(&"execution recorded"));
        assert!(messages.contains(&"outcome recorded"));
    }

    #[tokio::test]
    async fn ingestion_for_unknown_decision_is_not_found() {
        let manager = LifecycleManager::new();
        let result = manager
            .record_execution(ExecutionAppend::new("missing", ExecutionStatus::Pending))
            .await;
        assert!(matches!(result, Err(LifecycleError::NotFound(_))));
    }

    #[tokio::test]
    async fn updated_at_moves_only_on_transitions() {
        let manager = LifecycleManager::new();
        let created = manager.record_decision(draft("d1")).await.unwrap();
        assert_eq!(created.created_at, created.updated_at);

        manager
            .record_execution(ExecutionAppend::new("d1", ExecutionStatus::Pending))
            .await
            .unwrap();
        let after_append = manager.get_decision("d1").await.unwrap().unwrap();
        assert_eq!(after_append.updated_at, created.updated_at);

        let approved = manager.approve("d1", "alice").await.unwrap();
        assert!(approved.updated_at >= created.updated_at);
        assert_eq!(approved.approved_at, Some(approved.updated_at));
    }

    #[derive(Debug, Clone)]
    enum LifecycleOp {
        Approve,
        Reject,
        Execute,
    }

    fn op_strategy() -> impl Strategy<Value = Vec<LifecycleOp>> {
        proptest::collection::vec(
            prop_oneof![
                Just(LifecycleOp::Approve),
                Just(LifecycleOp::Reject),
                Just(LifecycleOp::Execute),
            ],
            0..12,
        )
    }

    proptest! {
        #[test]
        fn property_oversight_invariants_hold(
            ops in op_strategy(),
            approval_required in any::<bool>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");

            rt.block_on(async move {
                let manager = LifecycleManager::new();
                manager
                    .record_decision(draft("d1").approval_required(approval_required))
                    .await
                    .expect("decision");

                let mut first_approver: Option<String> = None;
                for op in ops {
                    let _ = match op {
                        LifecycleOp::Approve => manager.approve("d1", "alice").await,
                        LifecycleOp::Reject => manager.reject("d1", "bob").await,
                        LifecycleOp::Execute => manager.mark_executed("d1").await,
                    };

                    let current = manager
                        .get_decision("d1")
                        .await
                        .expect("query")
                        .expect("record");

                    if current.human_approval_given {
                        assert!(matches!(
                            current.status,
                            DecisionStatus::Approved | DecisionStatus::Executed
                        ));
                    }
                    if current.status == DecisionStatus::Rejected {
                        assert!(!current.human_approval_given);
                    }
                    match (&first_approver, &current.approved_by) {
                        (None, Some(actor)) => first_approver = Some(actor.clone()),
                        (Some(first), Some(actor)) => assert_eq!(first, actor),
                        _ => {}
                    }
                }
            });
        }
    }

    fn draft(id: &str) -> DecisionDraft {
        DecisionDraft::new(id, "adjust_routing")
            .with_confidence(0.9)
            .with_anomaly_score(0.2)
    }
}
