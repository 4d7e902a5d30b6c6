//! PayOps shared entity model.
//!
//! Everything the lifecycle, insight, and compliance layers exchange lives
//! here:
//! - decisions and their oversight lifecycle status
//! - execution attempts and predicted-vs-actual outcomes
//! - classified audit entries
//! - derived metrics snapshots
//!
//! Entities serialize camelCase to match the external payload contract;
//! closed status enums serialize snake_case.

#![deny(unsafe_code)]

pub mod audit;
pub mod decision;
pub mod execution;
pub mod metrics;
pub mod outcome;

pub use audit::{AuditEntry, AuditLevel};
pub use decision::{AnomalyTier, Decision, DecisionDraft, DecisionStatus, Pattern};
pub use execution::{Execution, ExecutionAppend, ExecutionStatus};
pub use metrics::{ActionTypeStats, MetricsSnapshot};
pub use outcome::{Outcome, OutcomeAppend};
