//! Status bucket counts derived from the job table.

use serde::{Deserialize, Serialize};

use crate::record::{JobRecord, JobStatus};

/// Summary counts per status bucket. `pending` covers both PENDING and
/// PROCESSING, so `total == pending + completed + failed` always holds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateSummary {
    pub total: u64,
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
}

impl AggregateSummary {
    /// Counts `records` from scratch.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a JobRecord>) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.insert(record.status);
        }
        summary
    }

    fn bucket_mut(&mut self, status: JobStatus) -> &mut u64 {
        match status {
            JobStatus::Pending | JobStatus::Processing => &mut self.pending,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Failed => &mut self.failed,
        }
    }

    /// Accounts for a newly inserted record.
    pub fn insert(&mut self, status: JobStatus) {
        self.total += 1;
        *self.bucket_mut(status) += 1;
    }

    /// Moves one record from the `old` bucket to the `new` one. `total` is
    /// unchanged.
    pub fn transition(&mut self, old: JobStatus, new: JobStatus) {
        let from = self.bucket_mut(old);
        *from = from.saturating_sub(1);
        *self.bucket_mut(new) += 1;
    }

    /// Accounts for a removed record.
    pub fn remove(&mut self, status: JobStatus) {
        self.total = self.total.saturating_sub(1);
        let bucket = self.bucket_mut(status);
        *bucket = bucket.saturating_sub(1);
    }

    /// Returns true if the buckets add up to the total.
    pub fn is_conserved(&self) -> bool {
        self.total == self.pending + self.completed + self.failed
    }
}

impl std::fmt::Display for AggregateSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "total={} pending={} completed={} failed={}",
            self.total, self.pending, self.completed, self.failed
        )
    }
}

/// Recomputes the summary for `records` from scratch.
pub fn aggregate<'a>(records: impl IntoIterator<Item = &'a JobRecord>) -> AggregateSummary {
    AggregateSummary::from_records(records)
}
