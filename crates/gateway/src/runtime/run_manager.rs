//! Process-wide singleton that accepts run requests, materializes `Runner`s
//! on a bounded worker pool, and tracks active runs (spec §4.9).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Semaphore;

use hae_domain::error::{Error, Result};
use hae_domain::model::{HierarchyConfig, Run, RunStatus};

use hae_providers::traits::LlmClient;

use super::call_tracker::CallTracker;
use super::cancel::{CancelRegistry, CancelToken};
use super::event_bus::{EventBus, EventBusRegistry};
use super::event_store::EventStore;
use super::runner::Runner;
use super::tool_provider::ToolProvider;

/// External collaborator: resolves a `hierarchy_id` to its `HierarchyConfig`
/// (spec §1, "Persistent configuration store").
#[async_trait::async_trait]
pub trait HierarchyResolver: Send + Sync {
    async fn resolve(&self, hierarchy_id: &str) -> Result<HierarchyConfig>;
}

struct ActiveRun {
    run: Arc<RwLock<Run>>,
}

/// A process-wide singleton exposing `start`/`cancel`/`is_running`/`active`/
/// `shutdown`. The worker pool provides parallelism across runs; each
/// individual run is single-logical-thread except for LLM callbacks.
pub struct RunManager {
    hierarchies: Arc<dyn HierarchyResolver>,
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolProvider>,
    event_store: Arc<dyn EventStore>,
    cancel_registry: Arc<CancelRegistry>,
    event_buses: Arc<EventBusRegistry>,
    active: RwLock<HashMap<u64, ActiveRun>>,
    next_run_id: AtomicU64,
    pool: Arc<Semaphore>,
    subscriber_buffer: usize,
}

impl RunManager {
    pub fn new(
        hierarchies: Arc<dyn HierarchyResolver>,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolProvider>,
        event_store: Arc<dyn EventStore>,
        pool_size: usize,
        subscriber_buffer: usize,
    ) -> Self {
        Self {
            hierarchies,
            llm,
            tools,
            event_store,
            cancel_registry: Arc::new(CancelRegistry::new()),
            event_buses: Arc::new(EventBusRegistry::new()),
            active: RwLock::new(HashMap::new()),
            next_run_id: AtomicU64::new(1),
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
            subscriber_buffer,
        }
    }

    pub fn event_buses(&self) -> &Arc<EventBusRegistry> {
        &self.event_buses
    }

    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.event_store
    }

    /// Resolve the hierarchy, validate it, create a `Run` in `pending`,
    /// register its `CancelToken`, and submit a `Runner` to the bounded
    /// worker pool. Returns immediately; the run executes on a spawned task.
    pub async fn start(&self, hierarchy_id: &str, task: &str) -> Result<Arc<RwLock<Run>>> {
        let config = self.hierarchies.resolve(hierarchy_id).await?;
        config.validate()?;

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let run = Arc::new(RwLock::new(Run::new(run_id, hierarchy_id, task)));

        let cancel = self.cancel_registry.register(run_id);
        let bus = Arc::new(EventBus::new(run_id, self.event_store.clone(), self.subscriber_buffer));
        self.event_buses.register(bus.clone());
        let call_tracker = Arc::new(CallTracker::new(cancel.clone()));

        self.active.write().insert(run_id, ActiveRun { run: run.clone() });

        let runner = Runner::new(
            run.clone(),
            Arc::new(config),
            bus,
            cancel,
            self.llm.clone(),
            self.tools.clone(),
            call_tracker,
        );

        let pool = self.pool.clone();
        let cancel_registry = self.cancel_registry.clone();
        let event_buses = self.event_buses.clone();
        let active_handle = run.clone();
        tokio::spawn(async move {
            // Pool saturation causes new starts to queue at this boundary (FIFO, spec §5).
            let permit = pool.acquire_owned().await;
            runner.run().await;
            drop(permit);
            cancel_registry.remove(run_id);
            event_buses.remove(run_id);
            let _ = active_handle; // kept alive until settlement; RunManager.active() still lists it until pruned
        });

        Ok(run)
    }

    /// Signal the run's `CancelToken`. If the run is still `pending`,
    /// transitions it directly to `cancelled` (it may never reach the pool).
    pub fn cancel(&self, run_id: u64) -> bool {
        let signalled = self.cancel_registry.signal(run_id);
        if let Some(active) = self.active.read().get(&run_id) {
            let mut run = active.run.write();
            if run.status == RunStatus::Pending {
                run.status = RunStatus::Cancelled;
                run.completed_at = Some(chrono::Utc::now());
            }
        }
        signalled
    }

    pub fn is_running(&self, run_id: u64) -> bool {
        self.active
            .read()
            .get(&run_id)
            .map(|a| !a.run.read().status.is_terminal())
            .unwrap_or(false)
    }

    pub fn get(&self, run_id: u64) -> Option<Arc<RwLock<Run>>> {
        self.active.read().get(&run_id).map(|a| a.run.clone())
    }

    pub fn active(&self) -> Vec<u64> {
        self.active
            .read()
            .iter()
            .filter(|(_, a)| !a.run.read().status.is_terminal())
            .map(|(id, _)| *id)
            .collect()
    }

    /// All run ids known to this process, active or settled. `start` never
    /// evicts an entry, so this also backs the `list` API (spec §6.1/6.2).
    pub fn all(&self) -> Vec<u64> {
        self.active.read().keys().copied().collect()
    }

    /// Signal every active run's token; does not wait for settlement (the
    /// caller is expected to await outstanding tasks separately).
    pub fn shutdown(&self) {
        for run_id in self.active.read().keys() {
            self.cancel_registry.signal(*run_id);
        }
    }

    pub fn cancel_token(&self, run_id: u64) -> Option<CancelToken> {
        self.cancel_registry.token(run_id)
    }
}
