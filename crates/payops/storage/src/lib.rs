//! PayOps storage abstractions.
//!
//! Defines the adapter contract the lifecycle, insight, and compliance
//! layers consume:
//! - decision records with a compare-and-set status transition
//! - append-only execution and outcome collections
//! - append-only classified audit log
//!
//! The in-memory adapter is the deterministic reference implementation;
//! persistent backends implement the same traits out of tree. Adapters
//! return owned snapshots, so callers never hold live references into
//! the store.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryPayopsStore;
pub use traits::{
    ApprovalStamp, AuditLogFilter, AuditStore, DecisionFilter, DecisionStore, DecisionTransition,
    ExecutionStore, OutcomeStore, PayopsStore,
};
