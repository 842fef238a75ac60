//! End-to-end scenario tests against `RunManager`, exercising the engine the
//! way an HTTP caller would: `start` a hierarchy and poll `Run.status` to
//! settlement (spec.md §8's S2-S6; S1 is covered by `runtime::runner`'s own
//! unit tests). Every scenario drives real `HierarchyBuilder`/`Runner`/
//! `EventBus`/`CallTracker` code against the in-process `StubLlmClient` —
//! no network, no mocked engine internals.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use hae_domain::error::Result;
use hae_domain::model::{
    EventAction, ExecutionMode, HierarchyConfig, LlmParams, RunStatus, TeamConfig, WorkerConfig,
};
use hae_gateway::runtime::event_store::MemoryEventStore;
use hae_gateway::runtime::run_manager::{HierarchyResolver, RunManager};
use hae_gateway::runtime::tool_provider::NullToolProvider;
use hae_providers::stub::{ScriptedTurn, StubLlmClient};

struct StaticResolver(HierarchyConfig);

#[async_trait::async_trait]
impl HierarchyResolver for StaticResolver {
    async fn resolve(&self, _hierarchy_id: &str) -> Result<HierarchyConfig> {
        Ok(self.0.clone())
    }
}

fn manager(config: HierarchyConfig, stub: Arc<StubLlmClient>) -> RunManager {
    RunManager::new(
        Arc::new(StaticResolver(config)),
        stub,
        Arc::new(NullToolProvider),
        Arc::new(MemoryEventStore::new(10_000)),
        10,
        1024,
    )
}

async fn await_settlement(run: &Arc<parking_lot::RwLock<hae_domain::model::Run>>) {
    for _ in 0..500 {
        if run.read().status.is_terminal() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run did not settle within timeout");
}

fn one_team_one_worker(prevent_duplicate: bool) -> HierarchyConfig {
    HierarchyConfig {
        global_prompt: "boss".into(),
        global_llm: LlmParams::default(),
        global_agent_id: "agent-G".into(),
        execution_mode: ExecutionMode::Sequential,
        enable_context_sharing: false,
        max_turns_per_agent: 25,
        teams: vec![TeamConfig {
            id: "team-1".into(),
            name: "T".into(),
            agent_id: "agent-T".into(),
            supervisor_prompt: "lead".into(),
            supervisor_llm: LlmParams::default(),
            prevent_duplicate,
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

/// S2. Duplicate dispatch blocked: team T tries to dispatch worker W twice
/// with identical sub-task "x". Only one `lifecycle.started(W)`; the second
/// call returns the sentinel text and emits exactly one `system.warning`
/// with `data.reason == "duplicate"`. Run ends `completed`.
#[tokio::test]
async fn s2_duplicate_worker_dispatch_is_blocked() {
    let stub = Arc::new(StubLlmClient::new());
    stub.script("agent-W", vec![ScriptedTurn::text("done")]);
    stub.script(
        "agent-T",
        vec![
            ScriptedTurn::tool_call("W", serde_json::json!({"task": "x"})),
            ScriptedTurn::tool_call("W", serde_json::json!({"task": "x"})),
            ScriptedTurn::text("team done"),
        ],
    );
    stub.script(
        "agent-G",
        vec![
            ScriptedTurn::tool_call("T", serde_json::json!({"task": "x"})),
            ScriptedTurn::text("done"),
        ],
    );

    let manager = manager(one_team_one_worker(true), stub);
    let run = manager.start("h1", "x").await.unwrap();
    let run_id = run.read().run_id;
    await_settlement(&run).await;

    assert_eq!(run.read().status, RunStatus::Completed);
    assert_eq!(run.read().statistics.by_worker.get("W"), Some(&1));

    let events = manager.event_store().range(run_id, "-", "+", None).unwrap();
    let worker_started = events
        .iter()
        .filter(|e| e.source.agent_name == "W" && e.event.action == EventAction::Started)
        .count();
    assert_eq!(worker_started, 1, "worker W must only start once");

    let warnings: Vec<_> = events
        .iter()
        .filter(|e| e.event.action == EventAction::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].data["reason"].as_str(), Some("duplicate"));
    assert_eq!(warnings[0].data["worker"].as_str(), Some("W"));
}

/// S3. Cancellation mid-stream: the worker's stub stream emits a token
/// every 20ms; the operator cancels ~60ms after start, well before the
/// stream would finish on its own. `Run.status` must settle `cancelled`
/// and no `dispatch.*` event may appear after the cancel instant.
#[tokio::test]
async fn s3_cancellation_mid_stream_settles_cancelled() {
    let stub = Arc::new(StubLlmClient::new());
    stub.script(
        "agent-W",
        vec![ScriptedTurn::slow_text(
            "a b c d e f g h i j k l m n o p q r s t",
            Duration::from_millis(20),
        )],
    );
    stub.script(
        "agent-T",
        vec![ScriptedTurn::tool_call("W", serde_json::json!({"task": "long task"}))],
    );
    stub.script(
        "agent-G",
        vec![ScriptedTurn::tool_call("T", serde_json::json!({"task": "long task"}))],
    );

    let manager = manager(one_team_one_worker(true), stub);
    let run = manager.start("h1", "long task").await.unwrap();
    let run_id = run.read().run_id;

    tokio::time::sleep(Duration::from_millis(60)).await;
    let cancel_instant = chrono::Utc::now();
    assert!(manager.cancel(run_id));

    await_settlement(&run).await;
    assert_eq!(run.read().status, RunStatus::Cancelled);

    let events = manager.event_store().range(run_id, "-", "+", None).unwrap();
    let dispatches_after_cancel = events
        .iter()
        .filter(|e| {
            matches!(e.event.action, EventAction::Team | EventAction::Worker)
                && e.timestamp > cancel_instant
        })
        .count();
    assert_eq!(dispatches_after_cancel, 0, "no dispatch after the cancel instant");
    assert!(events
        .last()
        .map(|e| e.event.action == EventAction::Cancelled || e.event.action == EventAction::Close)
        .unwrap_or(false));
}

fn two_teams(execution_mode: ExecutionMode, enable_context_sharing: bool) -> HierarchyConfig {
    let make_team = |id: &str, name: &str| TeamConfig {
        id: id.into(),
        name: name.into(),
        agent_id: format!("agent-{name}"),
        supervisor_prompt: "lead".into(),
        supervisor_llm: LlmParams::default(),
        prevent_duplicate: false,
        share_context: false,
        workers: vec![],
    };
    HierarchyConfig {
        global_prompt: "boss".into(),
        global_llm: LlmParams::default(),
        global_agent_id: "agent-G".into(),
        execution_mode,
        enable_context_sharing,
        max_turns_per_agent: 25,
        teams: vec![make_team("team-a", "A"), make_team("team-b", "B")],
    }
}

/// S4. Sequential vs parallel dispatch: the global supervisor invokes both
/// team tools in the same turn. In `sequential` mode the two teams' active
/// intervals must not overlap; in `parallel` mode they may (and, with
/// artificial per-team latency, provably do).
#[tokio::test]
async fn s4_sequential_dispatch_does_not_overlap() {
    let stub = Arc::new(StubLlmClient::new());
    stub.script(
        "agent-A",
        vec![ScriptedTurn::slow_text("alpha response", Duration::from_millis(15))],
    );
    stub.script(
        "agent-B",
        vec![ScriptedTurn::slow_text("beta response", Duration::from_millis(15))],
    );
    stub.script(
        "agent-G",
        vec![
            ScriptedTurn::tool_calls(vec![
                ("A", serde_json::json!({"task": "a"})),
                ("B", serde_json::json!({"task": "b"})),
            ]),
            ScriptedTurn::text("done"),
        ],
    );

    let manager = manager(two_teams(ExecutionMode::Sequential, false), stub);
    let run = manager.start("h1", "go").await.unwrap();
    let run_id = run.read().run_id;
    await_settlement(&run).await;
    assert_eq!(run.read().status, RunStatus::Completed);

    let events = manager.event_store().range(run_id, "-", "+", None).unwrap();
    let interval = |name: &str| {
        let started = events
            .iter()
            .find(|e| e.source.agent_name == name && e.event.action == EventAction::Started)
            .unwrap()
            .timestamp;
        let completed = events
            .iter()
            .find(|e| e.source.agent_name == name && e.event.action == EventAction::Completed)
            .unwrap()
            .timestamp;
        (started, completed)
    };
    let (a_start, a_end) = interval("A");
    let (b_start, b_end) = interval("B");
    let overlaps = a_start < b_end && b_start < a_end;
    assert!(!overlaps, "sequential mode must not overlap team intervals");
}

#[tokio::test]
async fn s4_parallel_dispatch_may_overlap() {
    let stub = Arc::new(StubLlmClient::new());
    stub.script(
        "agent-A",
        vec![ScriptedTurn::slow_text("alpha response", Duration::from_millis(40))],
    );
    stub.script(
        "agent-B",
        vec![ScriptedTurn::slow_text("beta response", Duration::from_millis(40))],
    );
    stub.script(
        "agent-G",
        vec![
            ScriptedTurn::tool_calls(vec![
                ("A", serde_json::json!({"task": "a"})),
                ("B", serde_json::json!({"task": "b"})),
            ]),
            ScriptedTurn::text("done"),
        ],
    );

    let manager = manager(two_teams(ExecutionMode::Parallel, false), stub);
    let run = manager.start("h1", "go").await.unwrap();
    let run_id = run.read().run_id;
    await_settlement(&run).await;
    assert_eq!(run.read().status, RunStatus::Completed);

    let events = manager.event_store().range(run_id, "-", "+", None).unwrap();
    let interval = |name: &str| {
        let started = events
            .iter()
            .find(|e| e.source.agent_name == name && e.event.action == EventAction::Started)
            .unwrap()
            .timestamp;
        let completed = events
            .iter()
            .find(|e| e.source.agent_name == name && e.event.action == EventAction::Completed)
            .unwrap()
            .timestamp;
        (started, completed)
    };
    let (a_start, a_end) = interval("A");
    let (b_start, b_end) = interval("B");
    assert!(
        a_start < b_end && b_start < a_end,
        "parallel dispatch with overlapping latency should overlap"
    );
}

/// S5. Context sharing: with `enable_context_sharing = true`, team B's
/// recorded prompt contains team A's result under the delimited header;
/// team A's prompt never references team B (it runs first).
#[tokio::test]
async fn s5_context_sharing_prefixes_later_team_prompt() {
    let stub = Arc::new(StubLlmClient::new());
    stub.script("agent-A", vec![ScriptedTurn::text("alpha")]);
    stub.script("agent-B", vec![ScriptedTurn::text("beta")]);
    stub.script(
        "agent-G",
        vec![
            ScriptedTurn::tool_call("A", serde_json::json!({"task": "do a"})),
            ScriptedTurn::tool_call("B", serde_json::json!({"task": "do b"})),
            ScriptedTurn::text("done"),
        ],
    );

    let manager = manager(two_teams(ExecutionMode::Sequential, true), stub.clone());
    let run = manager.start("h1", "go").await.unwrap();
    await_settlement(&run).await;
    assert_eq!(run.read().status, RunStatus::Completed);

    let b_requests = stub.requests_for("agent-B");
    assert!(!b_requests.is_empty());
    let b_prompt = b_requests[0].messages[1].content.text().unwrap_or_default();
    assert!(b_prompt.contains("=== Prior team results ==="));
    assert!(b_prompt.contains("alpha"));

    let a_requests = stub.requests_for("agent-A");
    assert!(!a_requests.is_empty());
    let a_prompt = a_requests[0].messages[1].content.text().unwrap_or_default();
    assert!(!a_prompt.contains("beta"));
    assert!(!a_prompt.contains("Prior team results"));
}

/// S6. Replay equivalence: after a run settles, a full `"-"`..`"+"` range
/// scan returns events whose sequences are exactly `1..N` with no gaps, in
/// order, matching the total event count `EventBus` assigned.
#[tokio::test]
async fn s6_replay_returns_full_contiguous_sequence() {
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

    let manager = manager(one_team_one_worker(true), stub);
    let run = manager.start("h1", "say hi").await.unwrap();
    let run_id = run.read().run_id;
    await_settlement(&run).await;
    assert_eq!(run.read().status, RunStatus::Completed);

    let events = manager.event_store().range(run_id, "-", "+", None).unwrap();
    assert!(!events.is_empty());

    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    let expected: Vec<u64> = (1..=sequences.len() as u64).collect();
    assert_eq!(sequences, expected, "replay must be exactly 1..N with no gaps");

    let unique: HashSet<u64> = sequences.iter().copied().collect();
    assert_eq!(unique.len(), sequences.len(), "no duplicate sequences");

    for w in events.windows(2) {
        assert!(w[0].timestamp <= w[1].timestamp);
    }

    let paged_first = manager
        .event_store()
        .range(run_id, "-", &(sequences.len() as u64 / 2).max(1).to_string(), None)
        .unwrap();
    let next_id = (paged_first.last().unwrap().sequence + 1).to_string();
    let paged_second = manager.event_store().range(run_id, &next_id, "+", None).unwrap();
    let mut reassembled = paged_first;
    reassembled.extend(paged_second);
    let reassembled_sequences: Vec<u64> = reassembled.iter().map(|e| e.sequence).collect();
    assert_eq!(reassembled_sequences, expected, "paged replay reproduces the full log");
}

