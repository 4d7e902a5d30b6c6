use crate::InsightError;
use payops_storage::PayopsStore;
use payops_types::{Decision, Execution, Outcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Fully correlated view of one decision: the record itself plus its
/// execution and outcome history. This is the decision-detail payload
/// served to presentation layers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionDetail {
    pub decision: Decision,
    pub executions: Vec<Execution>,
    pub outcomes: Vec<Outcome>,
}

/// Joins decisions with their append-only children.
pub struct CorrelationEngine {
    store: Arc<dyn PayopsStore>,
}

impl CorrelationEngine {
    pub fn new(store: Arc<dyn PayopsStore>) -> Self {
        Self { store }
    }

    /// Correlated detail for one decision. Executions and outcomes come
    /// back ascending by timestamp; a decision without children yields
    /// empty vectors, an unknown id fails with `NotFound`.
    ///
    /// The three reads are back-to-back adapter calls, so the view is
    /// best-effort consistent rather than transactional.
    pub async fn decision_detail(&self, decision_id: &str) -> Result<DecisionDetail, InsightError> {
        let decision = self
            .store
            .get_decision(decision_id)
            .await?
            .ok_or_else(|| InsightError::NotFound(decision_id.to_string()))?;

        let mut executions = self.store.list_executions(decision_id).await?;
        let mut outcomes = self.store.list_outcomes(decision_id).await?;
        executions.sort_by_key(|e| e.timestamp);
        outcomes.sort_by_key(|o| o.timestamp);

        debug!(
            decision_id = %decision_id,
            executions = executions.len(),
            outcomes = outcomes.len(),
            "correlated decision detail"
        );
        Ok(DecisionDetail {
            decision,
            executions,
            outcomes,
        })
    }
}
