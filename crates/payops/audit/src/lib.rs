//! PayOps audit trail.
//!
//! Severity and module tags are assigned where an event is emitted; this
//! crate owns those conventions and the filtered query surface. Nothing
//! here reinterprets a stored entry; queries only filter and order.

#![deny(unsafe_code)]

use payops_storage::{AuditLogFilter, AuditStore, StorageError};
use payops_types::{AuditEntry, AuditLevel};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// Canonical `module` tags for audit emission.
pub mod modules {
    pub const LIFECYCLE: &str = "lifecycle";
    pub const CORRELATION: &str = "correlation";
    pub const METRICS: &str = "metrics";
    pub const COMPLIANCE: &str = "compliance";
}

/// Severity for an adapter failure: backend faults (lost storage, poisoned
/// locks) are critical, everything else is an error.
pub fn storage_failure_level(err: &StorageError) -> AuditLevel {
    match err {
        StorageError::Backend(_) => AuditLevel::Critical,
        _ => AuditLevel::Error,
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Query (and manual emission) facade over the audit log.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Appends a pre-classified entry.
    pub async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        if let Err(err) = self.store.append_audit_log(entry).await {
            error!(error = %err, "audit append failed");
            return Err(err.into());
        }
        Ok(())
    }

    /// Matching entries, most-recent-first (equal timestamps keep
    /// insertion order).
    pub async fn recent(&self, filter: AuditLogFilter) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.store.list_audit_logs(filter).await?)
    }

    /// Latest entries for one module.
    pub async fn recent_for_module(
        &self,
        module: impl Into<String>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        self.recent(AuditLogFilter::new().with_module(module).with_limit(limit))
            .await
    }
}
