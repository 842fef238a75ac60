//! Drives one run end-to-end: build, start, stream, settle (spec §4.8).

use std::sync::Arc;

use parking_lot::RwLock;

use hae_domain::error::Error;
use hae_domain::model::{EventAction, HierarchyConfig, Run, RunStatus, Source};

use hae_providers::traits::LlmClient;

use super::agent::Agent;
use super::call_tracker::CallTracker;
use super::cancel::CancelToken;
use super::event_bus::EventBus;
use super::hierarchy::HierarchyBuilder;
use super::tool_provider::ToolProvider;

/// Owns a single `Run` for the duration of its execution (spec §3.4: "A
/// `Run` is exclusively owned by its `Runner`").
pub struct Runner {
    run: Arc<RwLock<Run>>,
    config: Arc<HierarchyConfig>,
    bus: Arc<EventBus>,
    cancel: CancelToken,
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolProvider>,
    call_tracker: Arc<CallTracker>,
}

impl Runner {
    pub fn new(
        run: Arc<RwLock<Run>>,
        config: Arc<HierarchyConfig>,
        bus: Arc<EventBus>,
        cancel: CancelToken,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolProvider>,
        call_tracker: Arc<CallTracker>,
    ) -> Self {
        Self {
            run,
            config,
            bus,
            cancel,
            llm,
            tools,
            call_tracker,
        }
    }

    /// Run to settlement. Consumes `self`; intended to be spawned as its
    /// own task by `RunManager`.
    pub async fn run(self) {
        let run_id = self.run.read().run_id;
        let task = self.run.read().task.clone();

        {
            let mut run = self.run.write();
            run.status = RunStatus::Running;
            run.started_at = Some(chrono::Utc::now());
        }

        let built = match HierarchyBuilder::build(
            &self.config,
            run_id,
            self.llm.clone(),
            self.tools.clone(),
            self.bus.clone(),
            self.call_tracker.clone(),
        ) {
            Ok(built) => built,
            Err(err) => {
                self.settle_failed(&err.to_string());
                return;
            }
        };

        // Snapshot immutability: frozen once the run leaves `pending` (invariant 3).
        {
            let mut run = self.run.write();
            run.topology_snapshot = Some(built.topology.clone());
        }
        // S1's trace has `system.topology` precede the system's own
        // `lifecycle.started` — the topology is a fact about the run's
        // shape, settled before the run announces it has begun executing.
        self.bus.publish(
            Source::system(),
            EventAction::Topology,
            serde_json::to_value(&built.topology).unwrap_or(serde_json::Value::Null),
        );
        self.bus
            .publish(Source::system(), EventAction::Started, serde_json::json!({}));

        match built.global.invoke(&task, &self.cancel).await {
            Ok(text) => self.settle_completed(text),
            Err(Error::Cancelled) => self.settle_cancelled(),
            Err(err) => self.settle_failed(&err.to_string()),
        }

        self.bus
            .publish(Source::system(), EventAction::Close, serde_json::json!({}));
        self.bus.close_all();
    }

    fn settle_completed(&self, text: String) {
        let mut run = self.run.write();
        run.result = Some(text);
        run.statistics = self.call_tracker.statistics();
        run.status = RunStatus::Completed;
        run.completed_at = Some(chrono::Utc::now());
        drop(run);
        self.bus
            .publish(Source::system(), EventAction::Completed, serde_json::json!({}));
    }

    fn settle_cancelled(&self) {
        let mut run = self.run.write();
        run.statistics = self.call_tracker.statistics();
        run.status = RunStatus::Cancelled;
        run.completed_at = Some(chrono::Utc::now());
        drop(run);
        self.bus
            .publish(Source::system(), EventAction::Cancelled, serde_json::json!({}));
    }

    fn settle_failed(&self, message: &str) {
        let mut run = self.run.write();
        run.error = Some(message.to_string());
        run.statistics = self.call_tracker.statistics();
        run.status = RunStatus::Failed;
        run.completed_at = Some(chrono::Utc::now());
        drop(run);
        self.bus.publish(
            Source::system(),
            EventAction::Failed,
            serde_json::json!({ "error": message }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::event_store::MemoryEventStore;
    use crate::runtime::tool_provider::NullToolProvider;
    use hae_domain::model::{LlmParams, TeamConfig, WorkerConfig};
    use hae_providers::stub::{ScriptedTurn, StubLlmClient};

    fn config() -> HierarchyConfig {
        HierarchyConfig {
            global_prompt: "boss".into(),
            global_llm: LlmParams::default(),
            global_agent_id: "agent-G".into(),
            execution_mode: Default::default(),
            enable_context_sharing: false,
            max_turns_per_agent: 25,
            teams: vec![TeamConfig {
                id: "team-1".into(),
                name: "T".into(),
                agent_id: "agent-T".into(),
                supervisor_prompt: "lead".into(),
                supervisor_llm: LlmParams::default(),
                prevent_duplicate: true,
                share_context: false,
                workers: vec![WorkerConfig {
                    id: "worker-1".into(),
                    name: "W".into(),
                    agent_id: "agent-W".into(),
                    role: "does things".into(),
                    system_prompt: "you work".into(),
                    llm: LlmParams::default(),
                    tools: vec![],
                }],
            }],
        }
    }

    #[tokio::test]
    async fn happy_path_settles_completed_with_result() {
        let stub = Arc::new(StubLlmClient::new());
        stub.script("agent-W", vec![ScriptedTurn::text("hi")]);
        stub.script(
            "agent-T",
            vec![
                ScriptedTurn::tool_call("W", serde_json::json!({"task": "say hi"})),
                ScriptedTurn::text("team says hi"),
            ],
        );
        stub.script(
            "agent-G",
            vec![
                ScriptedTurn::tool_call("T", serde_json::json!({"task": "say hi"})),
                ScriptedTurn::text("hi"),
            ],
        );

        let bus = Arc::new(EventBus::new(1, Arc::new(MemoryEventStore::new(1000)), 1000));
        let cancel = CancelToken::new();
        let tracker = Arc::new(CallTracker::new(cancel.clone()));
        let run = Arc::new(RwLock::new(Run::new(1, "h1", "say hi")));

        let runner = Runner::new(
            run.clone(),
            Arc::new(config()),
            bus,
            cancel,
            stub,
            Arc::new(NullToolProvider),
            tracker,
        );
        runner.run().await;

        let run = run.read();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.result.as_deref(), Some("hi"));
        assert_eq!(run.statistics.by_team.get("T"), Some(&1));
        assert_eq!(run.statistics.by_worker.get("W"), Some(&1));
        assert!(run.topology_snapshot.is_some());
    }

    #[tokio::test]
    async fn cancelled_before_start_settles_cancelled() {
        let stub = Arc::new(StubLlmClient::new());
        let bus = Arc::new(EventBus::new(1, Arc::new(MemoryEventStore::new(1000)), 1000));
        let cancel = CancelToken::new();
        cancel.cancel();
        let tracker = Arc::new(CallTracker::new(cancel.clone()));
        let run = Arc::new(RwLock::new(Run::new(1, "h1", "say hi")));

        let runner = Runner::new(
            run.clone(),
            Arc::new(config()),
            bus,
            cancel,
            stub,
            Arc::new(NullToolProvider),
            tracker,
        );
        runner.run().await;

        assert_eq!(run.read().status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn unknown_tool_call_settles_failed() {
        // The global supervisor calls a team name that doesn't exist in the
        // hierarchy; `GlobalSupervisor::dispatch_team` errors, which must
        // propagate out of `invoke` and settle the run as `failed`.
        let stub = Arc::new(StubLlmClient::new());
        stub.script(
            "agent-G",
            vec![ScriptedTurn::tool_call("NoSuchTeam", serde_json::json!({"task": "x"}))],
        );

        let bus = Arc::new(EventBus::new(1, Arc::new(MemoryEventStore::new(1000)), 1000));
        let cancel = CancelToken::new();
        let tracker = Arc::new(CallTracker::new(cancel.clone()));
        let run = Arc::new(RwLock::new(Run::new(1, "h1", "say hi")));

        let runner = Runner::new(
            run.clone(),
            Arc::new(config()),
            bus,
            cancel,
            stub,
            Arc::new(NullToolProvider),
            tracker,
        );
        runner.run().await;

        assert_eq!(run.read().status, RunStatus::Failed);
        assert!(run.read().error.is_some());
    }
}
