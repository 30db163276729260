//! Job store: the authoritative job table and its derived aggregates.

pub mod aggregate;
pub mod changes;
pub mod job_store;

pub use aggregate::{aggregate, AggregateSummary};
pub use changes::{ChangeBroadcaster, StoreChange};
pub use job_store::{ConflictPolicy, JobSnapshot, JobStore, ReplaceReport, UpsertOutcome};
