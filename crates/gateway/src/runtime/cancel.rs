//! Per-run cooperative-cancellation flag (spec §4.3).
//!
//! One `CancelToken` is registered per run and shared by every agent in that
//! run's hierarchy (global supervisor, team supervisors, workers). There is
//! no cascading group structure here — unlike the teacher's `CancelMap`,
//! which fans a parent session's cancellation out to independently-keyed
//! child sessions, a single run's whole agent tree shares one token, so
//! signalling it once is enough to reach every agent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use hae_domain::error::{Error, Result};

/// A cancellation flag checked by the runtime loop at well-defined safe
/// points: dispatch entry, token enqueue, and the top of each team
/// iteration (spec §4.3).
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns `Err(Error::Cancelled)` if cancellation has been signalled.
    pub fn throw_if_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry of per-run cancel tokens.
pub struct CancelRegistry {
    tokens: Mutex<HashMap<u64, CancelToken>>,
}

impl Default for CancelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create and register a new cancel token for a run.
    pub fn register(&self, run_id: u64) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(run_id, token.clone());
        token
    }

    /// Signal cancellation for a run. Idempotent; returns `true` if a token
    /// was found (a `false` return is not an error — it just means the run
    /// is unknown or already settled, per spec §7's RunManager.cancel policy).
    pub fn signal(&self, run_id: u64) -> bool {
        if let Some(token) = self.tokens.lock().get(&run_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Look up the token for a run without mutating it.
    pub fn token(&self, run_id: u64) -> Option<CancelToken> {
        self.tokens.lock().get(&run_id).cloned()
    }

    /// Remove a run's token once it has settled.
    pub fn remove(&self, run_id: u64) {
        self.tokens.lock().remove(&run_id);
    }
}
