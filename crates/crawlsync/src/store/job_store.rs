//! In-memory table of canonical job records.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use super::aggregate::{aggregate, AggregateSummary};
use super::changes::{ChangeBroadcaster, StoreChange};
use crate::error::ValidationError;
use crate::record::{normalize, JobId, JobRecord};

// ─── Types ──────────────────────────────────────────────────────────────────

/// How the store resolves an incoming record against the one it holds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The most recently applied payload wins, whatever its timestamp.
    #[default]
    ArrivalOrder,
    /// A payload whose `updatedAt` is older than the stored record's is
    /// ignored. Records without timestamps always apply.
    NewestWins,
}

/// Result of applying a single payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Identical to the stored record; nothing changed.
    Unchanged,
    /// Older than the stored record under [`ConflictPolicy::NewestWins`].
    Stale,
    /// The payload failed validation and was skipped.
    Rejected(ValidationError),
}

impl UpsertOutcome {
    /// Returns true if the table changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted | UpsertOutcome::Updated)
    }
}

/// Result of a bulk replace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceReport {
    /// Records now in the table.
    pub accepted: usize,
    /// Payloads skipped for failing validation.
    pub rejected: usize,
    /// Payloads superseded by a later payload with the same id.
    pub duplicates: usize,
    /// Stored records kept because the incoming copy was older.
    pub kept_newer: usize,
}

/// Read-only copy of the table and its summary.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    /// Records in ascending id order.
    pub jobs: Vec<JobRecord>,
    pub summary: AggregateSummary,
    /// Incremented on every change; equal revisions mean equal contents.
    pub revision: u64,
}

impl JobSnapshot {
    /// Records ordered for display: newest `createdAt` first, ties and
    /// untimestamped records by descending id.
    pub fn newest_first(&self) -> Vec<&JobRecord> {
        let mut jobs: Vec<&JobRecord> = self.jobs.iter().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        jobs
    }

    pub fn get(&self, id: JobId) -> Option<&JobRecord> {
        self.jobs
            .binary_search_by_key(&id, |job| job.id)
            .ok()
            .map(|idx| &self.jobs[idx])
    }
}

#[derive(Default)]
struct TableState {
    jobs: BTreeMap<JobId, JobRecord>,
    summary: AggregateSummary,
    revision: u64,
}

fn is_older(incoming: &JobRecord, existing: &JobRecord) -> bool {
    match (incoming.updated_at, existing.updated_at) {
        (Some(incoming), Some(existing)) => incoming < existing,
        _ => false,
    }
}

// ─── JobStore ───────────────────────────────────────────────────────────────

/// Authoritative table of job records.
///
/// Every mutation takes the write lock for its whole duration, so
/// `replace_all`, `upsert` and `remove` are atomic with respect to each other
/// and to `snapshot`. Share it behind an `Arc`; separate instances are fully
/// independent.
pub struct JobStore {
    state: RwLock<TableState>,
    policy: ConflictPolicy,
    changes: ChangeBroadcaster,
}

impl JobStore {
    /// Creates an empty store using arrival-order conflict resolution.
    pub fn new() -> Self {
        Self::with_options(ConflictPolicy::default(), 256)
    }

    /// Creates an empty store with the given conflict policy and change
    /// channel capacity.
    pub fn with_options(policy: ConflictPolicy, change_capacity: usize) -> Self {
        Self {
            state: RwLock::new(TableState::default()),
            policy,
            changes: ChangeBroadcaster::new(change_capacity),
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    fn read_state(&self) -> RwLockReadGuard<'_, TableState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, TableState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Replaces the whole table with the normalized `raw_records`.
    ///
    /// Malformed elements are skipped without affecting the rest. When ids
    /// repeat, the last occurrence wins. The summary is recomputed from
    /// scratch.
    pub fn replace_all(&self, raw_records: &[Value]) -> ReplaceReport {
        let mut report = ReplaceReport::default();
        let mut incoming: BTreeMap<JobId, JobRecord> = BTreeMap::new();

        for raw in raw_records {
            match normalize(raw) {
                Ok(record) => {
                    if incoming.insert(record.id, record).is_some() {
                        report.duplicates += 1;
                    }
                }
                Err(e) => {
                    log::warn!("Skipping job in bulk load: {}", e);
                    report.rejected += 1;
                }
            }
        }

        let count = {
            let mut guard = self.write_state();
            let state = &mut *guard;

            if self.policy == ConflictPolicy::NewestWins {
                for (id, record) in incoming.iter_mut() {
                    if let Some(existing) = state.jobs.get(id) {
                        if is_older(record, existing) {
                            *record = existing.clone();
                            report.kept_newer += 1;
                        }
                    }
                }
            }

            state.summary = aggregate(incoming.values());
            state.jobs = incoming;
            state.revision += 1;
            state.jobs.len()
        };

        report.accepted = count;
        log::info!(
            "Loaded {} jobs ({} rejected, {} duplicate ids)",
            report.accepted,
            report.rejected,
            report.duplicates
        );
        self.changes.send(StoreChange::Replaced { count });
        report
    }

    /// Normalizes `raw` and inserts or replaces the record with its id.
    pub fn upsert(&self, raw: &Value) -> UpsertOutcome {
        match normalize(raw) {
            Ok(record) => self.upsert_record(record),
            Err(e) => {
                log::warn!("Rejected job update: {}", e);
                UpsertOutcome::Rejected(e)
            }
        }
    }

    /// Inserts or replaces an already-normalized record.
    ///
    /// The summary is adjusted incrementally. Applying the same record
    /// twice is a no-op the second time.
    pub fn upsert_record(&self, record: JobRecord) -> UpsertOutcome {
        let id = record.id;
        let status = record.status;

        let outcome = {
            let mut guard = self.write_state();
            let state = &mut *guard;

            let outcome = match state.jobs.get(&id) {
                Some(existing) if *existing == record => UpsertOutcome::Unchanged,
                Some(existing) if self.policy == ConflictPolicy::NewestWins
                    && is_older(&record, existing) =>
                {
                    UpsertOutcome::Stale
                }
                Some(existing) => {
                    state.summary.transition(existing.status, status);
                    UpsertOutcome::Updated
                }
                None => {
                    state.summary.insert(status);
                    UpsertOutcome::Inserted
                }
            };

            if outcome.is_applied() {
                state.jobs.insert(id, record);
                state.revision += 1;
            }
            debug_assert_eq!(state.summary, aggregate(state.jobs.values()));
            outcome
        };

        match outcome {
            UpsertOutcome::Inserted | UpsertOutcome::Updated => {
                log::debug!("Job {} is now {}", id, status);
                self.changes.send(StoreChange::Upserted { id, status });
            }
            UpsertOutcome::Stale => {
                log::debug!("Ignoring stale update for job {}", id);
            }
            _ => {}
        }

        outcome
    }

    /// Removes the records with the given ids. Unknown ids are ignored.
    /// Returns how many records were removed.
    pub fn remove(&self, ids: impl IntoIterator<Item = JobId>) -> usize {
        let removed: Vec<JobId> = {
            let mut guard = self.write_state();
            let state = &mut *guard;

            let mut removed = Vec::new();
            for id in ids {
                if let Some(record) = state.jobs.remove(&id) {
                    state.summary.remove(record.status);
                    removed.push(id);
                }
            }
            if !removed.is_empty() {
                state.revision += 1;
            }
            debug_assert_eq!(state.summary, aggregate(state.jobs.values()));
            removed
        };

        let count = removed.len();
        if count > 0 {
            log::debug!("Removed {} jobs", count);
            self.changes.send(StoreChange::Removed { ids: removed });
        }
        count
    }

    /// Returns the current table and summary.
    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.read_state();
        JobSnapshot {
            jobs: state.jobs.values().cloned().collect(),
            summary: state.summary,
            revision: state.revision,
        }
    }

    /// Returns a specific job by id.
    pub fn get(&self, id: JobId) -> Option<JobRecord> {
        self.read_state().jobs.get(&id).cloned()
    }

    pub fn summary(&self) -> AggregateSummary {
        self.read_state().summary
    }

    pub fn revision(&self) -> u64 {
        self.read_state().revision
    }

    pub fn len(&self) -> usize {
        self.read_state().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().jobs.is_empty()
    }

    /// Subscribes to changes applied after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::stream::EventSink for JobStore {
    fn deliver(&self, payload: Value) {
        self.upsert(&payload);
    }
}
