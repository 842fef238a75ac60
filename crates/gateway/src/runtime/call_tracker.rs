//! Per-run dispatch ledger: dedup, stats, and cancellation short-circuit
//! (spec §4.2).

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use hae_domain::model::{task_fingerprint, CallRecord, CallStatus, RunStatistics};

use super::cancel::CancelToken;

/// Result of `CallTracker::open`.
pub enum DispatchOutcome {
    /// The caller may proceed; invoke the child agent under `call_id`.
    Allowed { call_id: String },
    /// `prevent_duplicate` blocked this dispatch; the caller must not invoke
    /// the child and should return the sentinel text instead (spec §4.5).
    Duplicate { call_id: String },
    /// The run's `CancelToken` was already signalled; the caller must not
    /// dispatch (spec invariant 5).
    Cancelled,
}

struct Inner {
    records: HashMap<String, CallRecord>,
    /// `(team_name, worker_name, task_fingerprint)` -> call_id, for records
    /// currently `in_progress` or `completed` (spec invariant 4). Worker
    /// dedup uses `worker_name = Some(..)`; team-level calls (global ->
    /// team) key on `worker_name = None`.
    dedup_index: HashMap<(String, Option<String>, u64), String>,
}

/// A per-run ledger of dispatch attempts, enforcing `prevent_duplicate` and
/// exposing statistics for `Run.statistics`.
pub struct CallTracker {
    cancel_token: CancelToken,
    inner: Mutex<Inner>,
}

impl CallTracker {
    pub fn new(cancel_token: CancelToken) -> Self {
        Self {
            cancel_token,
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                dedup_index: HashMap::new(),
            }),
        }
    }

    /// Open a dispatch attempt. `prevent_duplicate` is the caller's own
    /// config flag (`TeamConfig.prevent_duplicate`); the tracker does not
    /// carry config itself.
    pub fn open(
        &self,
        team_name: &str,
        worker_name: Option<&str>,
        task: &str,
        prevent_duplicate: bool,
    ) -> DispatchOutcome {
        // Safe point: short-circuit before touching the ledger (spec §4.3).
        if self.cancel_token.is_cancelled() {
            return DispatchOutcome::Cancelled;
        }

        let fingerprint = task_fingerprint(task);
        let key = (
            team_name.to_string(),
            worker_name.map(|w| w.to_string()),
            fingerprint,
        );

        let mut inner = self.inner.lock();

        if prevent_duplicate {
            if let Some(existing_id) = inner.dedup_index.get(&key) {
                // Tie-break: the first opener wins; this caller is blocked.
                return DispatchOutcome::Duplicate {
                    call_id: existing_id.clone(),
                };
            }
        }

        let call_id = Uuid::new_v4().to_string();
        let record = CallRecord {
            call_id: call_id.clone(),
            team_name: team_name.to_string(),
            worker_name: worker_name.map(|w| w.to_string()),
            task: task.to_string(),
            status: CallStatus::InProgress,
            task_fingerprint: fingerprint,
            start_time: Utc::now(),
            end_time: None,
            result_preview: None,
        };
        inner.records.insert(call_id.clone(), record);
        if prevent_duplicate {
            inner.dedup_index.insert(key, call_id.clone());
        }

        DispatchOutcome::Allowed { call_id }
    }

    /// Finalize a dispatch attempt.
    pub fn close(&self, call_id: &str, outcome: CallStatus, result_digest: Option<&str>) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.records.get_mut(call_id) {
            record.status = outcome;
            record.end_time = Some(Utc::now());
            record.result_preview = result_digest.map(|s| s.chars().take(200).collect());
        }
    }

    /// Aggregate statistics for `Run.statistics` (spec §4.2).
    pub fn statistics(&self) -> RunStatistics {
        let inner = self.inner.lock();
        let mut stats = RunStatistics::default();

        for record in inner.records.values() {
            stats.total_calls += 1;
            if record.status == CallStatus::Completed {
                stats.completed_calls += 1;
            }
            match &record.worker_name {
                Some(worker) => {
                    *stats.by_worker.entry(worker.clone()).or_insert(0) += 1;
                }
                None => {
                    *stats.by_team.entry(record.team_name.clone()).or_insert(0) += 1;
                }
            }
            if let Some(end) = record.end_time {
                let duration = (end - record.start_time).num_milliseconds().max(0) as u64;
                let key = record
                    .worker_name
                    .clone()
                    .unwrap_or_else(|| record.team_name.clone());
                stats.durations_ms.insert(key, duration);
            }
        }

        stats
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
