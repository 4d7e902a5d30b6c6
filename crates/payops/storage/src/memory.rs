//! In-memory reference implementation of the PayOps storage traits.
//!
//! Deterministic and test-friendly. Locks are held only inside the
//! synchronous sections, never across an await.

use crate::traits::{
    AuditLogFilter, AuditStore, DecisionFilter, DecisionStore, DecisionTransition, ExecutionStore,
    OutcomeStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use payops_types::{AuditEntry, Decision, DecisionStatus, Execution, Outcome};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory PayOps storage adapter.
#[derive(Default)]
pub struct InMemoryPayopsStore {
    decisions: RwLock<HashMap<String, Decision>>,
    executions: RwLock<Vec<Execution>>,
    outcomes: RwLock<Vec<Outcome>>,
    audit_logs: RwLock<Vec<AuditEntry>>,
}

impl InMemoryPayopsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DecisionStore for InMemoryPayopsStore {
    async fn create_decision(&self, decision: Decision) -> StorageResult<()> {
        let mut guard = self
            .decisions
            .write()
            .map_err(|_| StorageError::Backend("decisions lock poisoned".to_string()))?;

        if guard.contains_key(&decision.id) {
            return Err(StorageError::Conflict(format!(
                "decision {} already exists",
                decision.id
            )));
        }

        guard.insert(decision.id.clone(), decision);
        Ok(())
    }

    async fn get_decision(&self, decision_id: &str) -> StorageResult<Option<Decision>> {
        let guard = self
            .decisions
            .read()
            .map_err(|_| StorageError::Backend("decisions lock poisoned".to_string()))?;
        Ok(guard.get(decision_id).cloned())
    }

    async fn list_decisions(&self, filter: DecisionFilter) -> StorageResult<Vec<Decision>> {
        let guard = self
            .decisions
            .read()
            .map_err(|_| StorageError::Backend("decisions lock poisoned".to_string()))?;
        let values = guard.values().cloned().collect::<Vec<_>>();
        Ok(filter.apply(&values))
    }

    async fn transition_decision(
        &self,
        decision_id: &str,
        expected_from: DecisionStatus,
        change: DecisionTransition,
    ) -> StorageResult<Decision> {
        let mut guard = self
            .decisions
            .write()
            .map_err(|_| StorageError::Backend("decisions lock poisoned".to_string()))?;
        let record = guard
            .get_mut(decision_id)
            .ok_or_else(|| StorageError::NotFound(format!("decision {} not found", decision_id)))?;

        if record.status != expected_from {
            return Err(StorageError::InvariantViolation(format!(
                "invalid lifecycle transition: expected {:?}, found {:?}",
                expected_from, record.status
            )));
        }

        record.status = change.to;
        record.updated_at = change.updated_at;
        if let Some(stamp) = change.approval {
            record.human_approval_given = true;
            record.approved_by = Some(stamp.approved_by);
            record.approved_at = Some(stamp.approved_at);
        }
        Ok(record.clone())
    }
}

#[async_trait]
impl ExecutionStore for InMemoryPayopsStore {
    async fn append_execution(&self, execution: Execution) -> StorageResult<()> {
        let mut guard = self
            .executions
            .write()
            .map_err(|_| StorageError::Backend("executions lock poisoned".to_string()))?;
        guard.push(execution);
        Ok(())
    }

    async fn list_executions(&self, decision_id: &str) -> StorageResult<Vec<Execution>> {
        let guard = self
            .executions
            .read()
            .map_err(|_| StorageError::Backend("executions lock poisoned".to_string()))?;
        let mut values = guard
            .iter()
            .filter(|e| e.decision_id == decision_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(values)
    }
}

#[async_trait]
impl OutcomeStore for InMemoryPayopsStore {
    async fn append_outcome(&self, outcome: Outcome) -> StorageResult<()> {
        let mut guard = self
            .outcomes
            .write()
            .map_err(|_| StorageError::Backend("outcomes lock poisoned".to_string()))?;
        guard.push(outcome);
        Ok(())
    }

    async fn list_outcomes(&self, decision_id: &str) -> StorageResult<Vec<Outcome>> {
        let guard = self
            .outcomes
            .read()
            .map_err(|_| StorageError::Backend("outcomes lock poisoned".to_string()))?;
        let mut values = guard
            .iter()
            .filter(|o| o.decision_id == decision_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(values)
    }
}

#[async_trait]
impl AuditStore for InMemoryPayopsStore {
    async fn append_audit_log(&self, entry: AuditEntry) -> StorageResult<()> {
        let mut guard = self
            .audit_logs
            .write()
            .map_err(|_| StorageError::Backend("audit lock poisoned".to_string()))?;
        guard.push(entry);
        Ok(())
    }

    async fn list_audit_logs(&self, filter: AuditLogFilter) -> StorageResult<Vec<AuditEntry>> {
        let guard = self
            .audit_logs
            .read()
            .map_err(|_| StorageError::Backend("audit lock poisoned".to_string()))?;
        Ok(filter.apply(&guard))
    }
}
