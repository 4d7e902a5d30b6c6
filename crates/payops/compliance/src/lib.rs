//! PayOps compliance reports - deterministic snapshots of a time window.
//!
//! A report covers the half-open window `[start, end)`: every decision
//! created in the window with its full execution/outcome history, plus
//! every audit entry emitted in the window. The rendered `content` is
//! deterministic, so regenerating a report over the same stored window
//! always produces byte-identical output; that reproducibility is what
//! gives the report audit value. Only `generated_at` varies.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use payops_audit::{modules, storage_failure_level};
use payops_insight::{CorrelationEngine, DecisionDetail, InsightError};
use payops_storage::{AuditLogFilter, DecisionFilter, PayopsStore};
use payops_types::{AuditEntry, AuditLevel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Deterministic body of a compliance report. Rendered to JSON as the
/// report `content`; everything in here comes from immutable stored
/// records, never from the wall clock.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub decisions: Vec<DecisionDetail>,
    pub audit_logs: Vec<AuditEntry>,
}

/// Finished compliance report. `generated_at` is stamped outside the
/// rendered content and is the only field that differs between repeated
/// generations over the same window.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub content: String,
    pub content_digest: String,
    pub generated_at: DateTime<Utc>,
}

/// Assembles windowed compliance reports from the storage adapter.
pub struct ComplianceReporter {
    store: Arc<dyn PayopsStore>,
    correlation: CorrelationEngine,
}

impl ComplianceReporter {
    pub fn new(store: Arc<dyn PayopsStore>) -> Self {
        Self {
            correlation: CorrelationEngine::new(Arc::clone(&store)),
            store,
        }
    }

    /// Builds the report for `[start, end)`.
    ///
    /// Decisions are selected by `created_at` and ordered ascending with
    /// ties broken by id; each carries its full execution and outcome
    /// history, wherever those fall in time. Audit entries are selected
    /// and ordered ascending by `timestamp`. Fails with `InvalidRange`
    /// unless `start < end`, and atomically with `GenerationFailed` if
    /// the adapter fails mid-assembly. Successful generation performs no
    /// writes, so a report can never disturb the window it describes.
    pub async fn generate(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ComplianceReport, ComplianceError> {
        if start >= end {
            warn!(%start, %end, "rejected report request with inverted range");
            return Err(ComplianceError::InvalidRange {
                from: start,
                to: end,
            });
        }

        let mut decisions = match self.store.list_decisions(DecisionFilter::new()).await {
            Ok(decisions) => decisions,
            Err(err) => {
                return Err(self
                    .generation_failed(storage_failure_level(&err), err.to_string())
                    .await)
            }
        };
        decisions.retain(|d| d.created_at >= start && d.created_at < end);
        decisions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut details = Vec::with_capacity(decisions.len());
        for decision in &decisions {
            match self.correlation.decision_detail(&decision.id).await {
                Ok(detail) => details.push(detail),
                Err(err) => {
                    let level = match &err {
                        InsightError::Storage(inner) => storage_failure_level(inner),
                        _ => AuditLevel::Error,
                    };
                    return Err(self.generation_failed(level, err.to_string()).await);
                }
            }
        }

        let mut audit_logs = match self.store.list_audit_logs(AuditLogFilter::new()).await {
            Ok(entries) => entries,
            Err(err) => {
                return Err(self
                    .generation_failed(storage_failure_level(&err), err.to_string())
                    .await)
            }
        };
        audit_logs.retain(|e| e.timestamp >= start && e.timestamp < end);
        audit_logs.sort_by_key(|e| e.timestamp);

        let decision_count = details.len();
        let audit_count = audit_logs.len();
        let document = ReportDocument {
            start_time: start,
            end_time: end,
            decisions: details,
            audit_logs,
        };
        let content = match serde_json::to_string_pretty(&document) {
            Ok(content) => content,
            Err(err) => {
                return Err(self
                    .generation_failed(AuditLevel::Error, err.to_string())
                    .await)
            }
        };
        let content_digest = digest_content(&content);

        info!(
            %start,
            %end,
            decisions = decision_count,
            audit_entries = audit_count,
            "compliance report generated"
        );
        Ok(ComplianceReport {
            start_time: start,
            end_time: end,
            content,
            content_digest,
            generated_at: Utc::now(),
        })
    }

    /// Classifies and audits the failure, then converts it. The audit
    /// entry is best-effort: the generation error stays primary.
    async fn generation_failed(&self, level: AuditLevel, reason: String) -> ComplianceError {
        error!(error = %reason, "report generation failed");
        let entry = AuditEntry::new(level, modules::COMPLIANCE, "report generation failed")
            .with_metadata("reason", &reason);
        if let Err(append_err) = self.store.append_audit_log(entry).await {
            error!(error = %append_err, "audit append failed for generation failure");
        }
        ComplianceError::GenerationFailed(reason)
    }
}

fn digest_content(content: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"payops-compliance-report-v1:");
    hasher.update(content.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Compliance report errors.
#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("invalid report range: start {from} is not before end {to}")]
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("report generation failed: {0}")]
    GenerationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use payops_storage::{
        AuditStore, DecisionStore, ExecutionStore, InMemoryPayopsStore, OutcomeStore,
    };
    use payops_types::{
        Decision, DecisionDraft, ExecutionAppend, ExecutionStatus, OutcomeAppend,
    };

    #[tokio::test]
    async fn repeat_generation_is_byte_identical_except_generated_at() {
        let store = Arc::new(InMemoryPayopsStore::new());
        let base = Utc::now();
        seed_decision(&store, "dec-1", base + Duration::minutes(1)).await;
        seed_execution(&store, "dec-1", base + Duration::minutes(2)).await;
        seed_outcome(&store, "dec-1", base + Duration::minutes(3)).await;
        store
            .append_audit_log(
                AuditEntry::info("lifecycle", "decision approved").at(base + Duration::minutes(1)),
            )
            .await
            .unwrap();

        let reporter = ComplianceReporter::new(store);
        let window_end = base + Duration::hours(1);
        let first = reporter.generate(base, window_end).await.unwrap();
        let second = reporter.generate(base, window_end).await.unwrap();

        assert_eq!(first.content, second.content);
        assert_eq!(first.content_digest, second.content_digest);
        assert!(second.generated_at >= first.generated_at);

        let body: serde_json::Value = serde_json::from_str(&first.content).unwrap();
        assert_eq!(body["decisions"].as_array().unwrap().len(), 1);
        assert_eq!(body["auditLogs"].as_array().unwrap().len(), 1);
        assert_eq!(body["decisions"][0]["executions"][0]["duration"], 250);
    }

    #[tokio::test]
    async fn inverted_or_empty_range_is_invalid() {
        let store = Arc::new(InMemoryPayopsStore::new());
        let reporter = ComplianceReporter::new(store.clone());
        let t = Utc::now();

        let same = reporter.generate(t, t).await;
        assert!(matches!(same, Err(ComplianceError::InvalidRange { .. })));

        let inverted = reporter.generate(t + Duration::seconds(1), t).await;
        assert!(matches!(
            inverted,
            Err(ComplianceError::InvalidRange { .. })
        ));

        let audit = store.list_audit_logs(AuditLogFilter::new()).await.unwrap();
        assert!(audit.is_empty());
    }

    #[tokio::test]
    async fn window_is_half_open_on_created_at() {
        let store = Arc::new(InMemoryPayopsStore::new());
        let start = Utc::now();
        let end = start + Duration::minutes(10);
        seed_decision(&store, "at-start", start).await;
        seed_decision(&store, "inside", start + Duration::minutes(5)).await;
        seed_decision(&store, "at-end", end).await;

        let reporter = ComplianceReporter::new(store);
        let report = reporter.generate(start, end).await.unwrap();

        let body: serde_json::Value = serde_json::from_str(&report.content).unwrap();
        let ids: Vec<&str> = body["decisions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["decision"]["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["at-start", "inside"]);
    }

    #[tokio::test]
    async fn decisions_order_by_created_at_then_id() {
        let store = Arc::new(InMemoryPayopsStore::new());
        let base = Utc::now();
        seed_decision(&store, "b-second", base + Duration::minutes(1)).await;
        seed_decision(&store, "a-second", base + Duration::minutes(1)).await;
        seed_decision(&store, "z-first", base).await;

        let reporter = ComplianceReporter::new(store);
        let report = reporter
            .generate(base, base + Duration::hours(1))
            .await
            .unwrap();

        let body: serde_json::Value = serde_json::from_str(&report.content).unwrap();
        let ids: Vec<&str> = body["decisions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["decision"]["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["z-first", "a-second", "b-second"]);
    }

    #[tokio::test]
    async fn audit_entries_ascend_by_timestamp() {
        let store = Arc::new(InMemoryPayopsStore::new());
        let base = Utc::now();
        for (message, offset) in [("late", 30), ("early", 10), ("middle", 20)] {
            store
                .append_audit_log(
                    AuditEntry::info("lifecycle", message).at(base + Duration::seconds(offset)),
                )
                .await
                .unwrap();
        }

        let reporter = ComplianceReporter::new(store);
        let report = reporter
            .generate(base, base + Duration::hours(1))
            .await
            .unwrap();

        let body: serde_json::Value = serde_json::from_str(&report.content).unwrap();
        let messages: Vec<&str> = body["auditLogs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["message"].as_str().unwrap())
            .collect();
        assert_eq!(messages, vec!["early", "middle", "late"]);
    }

    #[tokio::test]
    async fn children_follow_their_decision_regardless_of_window() {
        let store = Arc::new(InMemoryPayopsStore::new());
        let start = Utc::now();
        let end = start + Duration::minutes(10);
        seed_decision(&store, "dec-1", start).await;
        seed_execution(&store, "dec-1", end + Duration::minutes(5)).await;

        let reporter = ComplianceReporter::new(store);
        let report = reporter.generate(start, end).await.unwrap();

        let body: serde_json::Value = serde_json::from_str(&report.content).unwrap();
        assert_eq!(
            body["decisions"][0]["executions"].as_array().unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn empty_window_generates_empty_report() {
        let reporter = ComplianceReporter::new(Arc::new(InMemoryPayopsStore::new()));
        let start = Utc::now();
        let report = reporter
            .generate(start, start + Duration::minutes(1))
            .await
            .unwrap();

        let body: serde_json::Value = serde_json::from_str(&report.content).unwrap();
        assert!(body["decisions"].as_array().unwrap().is_empty());
        assert!(body["auditLogs"].as_array().unwrap().is_empty());
        assert_eq!(report.content_digest.len(), 64);
    }

    async fn seed_decision(store: &InMemoryPayopsStore, id: &str, created_at: DateTime<Utc>) {
        let decision = Decision::from_draft(
            DecisionDraft::new(id, "adjust_routing").with_confidence(0.8),
            created_at,
        );
        store.create_decision(decision).await.unwrap();
    }

    async fn seed_execution(store: &InMemoryPayopsStore, decision_id: &str, at: DateTime<Utc>) {
        let execution = ExecutionAppend::new(decision_id, ExecutionStatus::Success)
            .with_duration_ms(250)
            .at(at)
            .into_execution(at);
        store.append_execution(execution).await.unwrap();
    }

    async fn seed_outcome(store: &InMemoryPayopsStore, decision_id: &str, at: DateTime<Utc>) {
        let outcome = OutcomeAppend::new(decision_id, "improved", "improved", 0.9)
            .at(at)
            .into_outcome(at);
        store.append_outcome(outcome).await.unwrap();
    }
}
