use crate::InsightError;
use chrono::{Duration, Utc};
use payops_audit::{modules, storage_failure_level};
use payops_storage::{DecisionFilter, PayopsStore, StorageError};
use payops_types::{
    ActionTypeStats, AuditEntry, DecisionStatus, ExecutionStatus, MetricsSnapshot,
};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

/// Computes KPI snapshots from the entity population.
///
/// Every computation scans storage from scratch, so the numbers can
/// never drift from the underlying entities. A bounded-staleness cache
/// is available through [`snapshot`](MetricsAggregator::snapshot) for
/// callers that tolerate slightly stale reads.
pub struct MetricsAggregator {
    store: Arc<dyn PayopsStore>,
    cache: RwLock<Option<MetricsSnapshot>>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn PayopsStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(None),
        }
    }

    /// Fresh snapshot over the full decision population. Averages and
    /// rates over an empty population are `0.0`, never `NaN`.
    pub async fn compute(&self) -> Result<MetricsSnapshot, InsightError> {
        let decisions = match self.store.list_decisions(DecisionFilter::new()).await {
            Ok(decisions) => decisions,
            Err(err) => return Err(self.aggregation_failed(err).await),
        };
        if decisions.is_empty() {
            return Ok(MetricsSnapshot::empty(Utc::now()));
        }

        let mut executed = 0u64;
        let mut approved = 0u64;
        let mut rejected = 0u64;
        let mut confidence_sum = 0.0;
        let mut total_executions = 0u64;
        let mut successful_executions = 0u64;
        let mut total_outcomes = 0u64;
        let mut accuracy_sum = 0.0;

        for decision in &decisions {
            match decision.status {
                DecisionStatus::Executed => executed += 1,
                DecisionStatus::Approved => approved += 1,
                DecisionStatus::Rejected => rejected += 1,
                DecisionStatus::Pending => {}
            }
            confidence_sum += decision.confidence;

            let executions = match self.store.list_executions(&decision.id).await {
                Ok(executions) => executions,
                Err(err) => return Err(self.aggregation_failed(err).await),
            };
            total_executions += executions.len() as u64;
            successful_executions += executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Success)
                .count() as u64;

            let outcomes = match self.store.list_outcomes(&decision.id).await {
                Ok(outcomes) => outcomes,
                Err(err) => return Err(self.aggregation_failed(err).await),
            };
            total_outcomes += outcomes.len() as u64;
            accuracy_sum += outcomes.iter().map(|o| o.accuracy).sum::<f64>();
        }

        let snapshot = MetricsSnapshot {
            total_decisions: decisions.len() as u64,
            executed,
            approved,
            rejected,
            avg_confidence: mean(confidence_sum, decisions.len() as u64),
            avg_accuracy: mean(accuracy_sum, total_outcomes),
            success_rate: ratio(successful_executions, total_executions),
            last_updated: Utc::now(),
        };
        debug!(
            total_decisions = snapshot.total_decisions,
            success_rate = snapshot.success_rate,
            "metrics recomputed"
        );
        Ok(snapshot)
    }

    /// Serves the cached snapshot while it is younger than
    /// `max_staleness`, recomputing otherwise. `Duration::zero()` forces
    /// a recomputation.
    pub async fn snapshot(&self, max_staleness: Duration) -> Result<MetricsSnapshot, InsightError> {
        let now = Utc::now();
        {
            let guard = self
                .cache
                .read()
                .map_err(|_| InsightError::Aggregation("metrics cache lock poisoned".to_string()))?;
            if let Some(cached) = guard.as_ref() {
                if now - cached.last_updated <= max_staleness {
                    return Ok(cached.clone());
                }
            }
        }

        let fresh = self.compute().await?;
        let mut guard = self
            .cache
            .write()
            .map_err(|_| InsightError::Aggregation("metrics cache lock poisoned".to_string()))?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    /// Per-action-type statistics over the full population, keyed in
    /// deterministic (lexicographic) order.
    pub async fn action_type_breakdown(
        &self,
    ) -> Result<BTreeMap<String, ActionTypeStats>, InsightError> {
        let decisions = match self.store.list_decisions(DecisionFilter::new()).await {
            Ok(decisions) => decisions,
            Err(err) => return Err(self.aggregation_failed(err).await),
        };

        let mut accumulators: BTreeMap<String, TypeAccumulator> = BTreeMap::new();
        for decision in &decisions {
            let executions = match self.store.list_executions(&decision.id).await {
                Ok(executions) => executions,
                Err(err) => return Err(self.aggregation_failed(err).await),
            };
            let outcomes = match self.store.list_outcomes(&decision.id).await {
                Ok(outcomes) => outcomes,
                Err(err) => return Err(self.aggregation_failed(err).await),
            };

            let acc = accumulators
                .entry(decision.action_type.clone())
                .or_default();
            acc.decisions += 1;
            acc.executions += executions.len() as u64;
            acc.successful += executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Success)
                .count() as u64;
            acc.failed += executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Failed)
                .count() as u64;
            acc.outcomes += outcomes.len() as u64;
            acc.accuracy_sum += outcomes.iter().map(|o| o.accuracy).sum::<f64>();
        }

        Ok(accumulators
            .into_iter()
            .map(|(action_type, acc)| (action_type, acc.finish()))
            .collect())
    }

    /// Classifies and audits an adapter failure, then converts it. The
    /// audit entry is best-effort: the aggregation error stays primary.
    async fn aggregation_failed(&self, err: StorageError) -> InsightError {
        error!(error = %err, "metrics aggregation failed");
        let entry = AuditEntry::new(
            storage_failure_level(&err),
            modules::METRICS,
            "metrics aggregation failed",
        )
        .with_metadata("reason", err.to_string());
        if let Err(append_err) = self.store.append_audit_log(entry).await {
            error!(error = %append_err, "audit append failed for aggregation failure");
        }
        InsightError::Aggregation(err.to_string())
    }
}

#[derive(Default)]
struct TypeAccumulator {
    decisions: u64,
    executions: u64,
    successful: u64,
    failed: u64,
    outcomes: u64,
    accuracy_sum: f64,
}

impl TypeAccumulator {
    fn finish(self) -> ActionTypeStats {
        ActionTypeStats {
            decisions: self.decisions,
            executions: self.executions,
            successful_executions: self.successful,
            failed_executions: self.failed,
            success_rate: ratio(self.successful, self.executions),
            avg_accuracy: mean(self.accuracy_sum, self.outcomes),
        }
    }
}

fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payops_storage::{
        DecisionStore, DecisionTransition, ExecutionStore, InMemoryPayopsStore, OutcomeStore,
    };
    use payops_types::{Decision, DecisionDraft, ExecutionAppend, OutcomeAppend};

    #[tokio::test]
    async fn empty_population_computes_zeroes() {
        let aggregator = MetricsAggregator::new(Arc::new(InMemoryPayopsStore::new()));
        let snapshot = aggregator.compute().await.unwrap();

        assert_eq!(snapshot.total_decisions, 0);
        assert_eq!(snapshot.executed, 0);
        assert_eq!(snapshot.avg_confidence, 0.0);
        assert_eq!(snapshot.avg_accuracy, 0.0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert!(!snapshot.avg_accuracy.is_nan());
    }

    #[tokio::test]
    async fn counts_rates_and_averages_follow_population() {
        let store = Arc::new(InMemoryPayopsStore::new());
        seed_decision(&store, "d1", "adjust_routing", 0.9).await;
        seed_decision(&store, "d2", "retry_policy", 0.5).await;
        store
            .transition_decision(
                "d1",
                DecisionStatus::Pending,
                DecisionTransition::to(DecisionStatus::Executed, Utc::now()),
            )
            .await
            .unwrap();
        seed_execution(&store, "d1", ExecutionStatus::Success).await;
        seed_execution(&store, "d1", ExecutionStatus::Failed).await;
        seed_outcome(&store, "d1", 0.8).await;

        let aggregator = MetricsAggregator::new(store);
        let snapshot = aggregator.compute().await.unwrap();

        assert_eq!(snapshot.total_decisions, 2);
        assert_eq!(snapshot.executed, 1);
        assert_eq!(snapshot.approved, 0);
        assert_eq!(snapshot.rejected, 0);
        assert!((snapshot.avg_confidence - 0.7).abs() < 1e-12);
        assert_eq!(snapshot.avg_accuracy, 0.8);
        assert_eq!(snapshot.success_rate, 0.5);
    }

    #[tokio::test]
    async fn repeat_computation_matches_population() {
        let store = Arc::new(InMemoryPayopsStore::new());
        seed_decision(&store, "d1", "adjust_routing", 0.9).await;
        seed_execution(&store, "d1", ExecutionStatus::Success).await;

        let aggregator = MetricsAggregator::new(store);
        let first = aggregator.compute().await.unwrap();
        let second = aggregator.compute().await.unwrap();
        assert!(first.same_population(&second));
    }

    #[tokio::test]
    async fn snapshot_respects_max_staleness() {
        let store = Arc::new(InMemoryPayopsStore::new());
        seed_decision(&store, "d1", "adjust_routing", 0.9).await;

        let aggregator = MetricsAggregator::new(store.clone());
        let first = aggregator.snapshot(Duration::minutes(5)).await.unwrap();
        assert_eq!(first.total_decisions, 1);

        seed_decision(&store, "d2", "retry_policy", 0.5).await;

        let cached = aggregator.snapshot(Duration::minutes(5)).await.unwrap();
        assert_eq!(cached.total_decisions, 1);
        assert_eq!(cached.last_updated, first.last_updated);

        let fresh = aggregator.snapshot(Duration::zero()).await.unwrap();
        assert_eq!(fresh.total_decisions, 2);
    }

    #[tokio::test]
    async fn breakdown_groups_by_action_type_in_key_order() {
        let store = Arc::new(InMemoryPayopsStore::new());
        seed_decision(&store, "d1", "retry_policy", 0.6).await;
        seed_decision(&store, "d2", "adjust_routing", 0.9).await;
        seed_decision(&store, "d3", "adjust_routing", 0.7).await;
        seed_execution(&store, "d2", ExecutionStatus::Success).await;
        seed_execution(&store, "d2", ExecutionStatus::Failed).await;
        seed_outcome(&store, "d2", 0.6).await;

        let aggregator = MetricsAggregator::new(store);
        let breakdown = aggregator.action_type_breakdown().await.unwrap();

        let keys: Vec<_> = breakdown.keys().cloned().collect();
        assert_eq!(keys, vec!["adjust_routing", "retry_policy"]);

        let routing = &breakdown["adjust_routing"];
        assert_eq!(routing.decisions, 2);
        assert_eq!(routing.executions, 2);
        assert_eq!(routing.successful_executions, 1);
        assert_eq!(routing.failed_executions, 1);
        assert_eq!(routing.success_rate, 0.5);
        assert_eq!(routing.avg_accuracy, 0.6);

        let retry = &breakdown["retry_policy"];
        assert_eq!(retry.decisions, 1);
        assert_eq!(retry.executions, 0);
        assert_eq!(retry.success_rate, 0.0);
    }

    #[tokio::test]
    async fn snapshot_payload_renders_camel_case() {
        let aggregator = MetricsAggregator::new(Arc::new(InMemoryPayopsStore::new()));
        let snapshot = aggregator.compute().await.unwrap();

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["totalDecisions"].is_u64());
        assert!(json["successRate"].is_f64());
        assert!(json["lastUpdated"].is_string());
    }

    async fn seed_decision(
        store: &InMemoryPayopsStore,
        id: &str,
        action_type: &str,
        confidence: f64,
    ) {
        let decision = Decision::from_draft(
            DecisionDraft::new(id, action_type).with_confidence(confidence),
            Utc::now(),
        );
        store.create_decision(decision).await.unwrap();
    }

    async fn seed_execution(
        store: &InMemoryPayopsStore,
        decision_id: &str,
        status: ExecutionStatus,
    ) {
        let execution = ExecutionAppend::new(decision_id, status)
            .with_risk(0.2)
            .into_execution(Utc::now());
        store.append_execution(execution).await.unwrap();
    }

    async fn seed_outcome(store: &InMemoryPayopsStore, decision_id: &str, accuracy: f64) {
        let outcome = OutcomeAppend::new(decision_id, "improved", "improved", accuracy)
            .into_outcome(Utc::now());
        store.append_outcome(outcome).await.unwrap();
    }
}
