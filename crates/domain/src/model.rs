//! The data model driving one run of the hierarchical agent engine:
//! the configuration a run is built from, the mutable `Run`/`Event`/`CallRecord`
//! entities produced while it executes, and the closed category/action sets
//! events are drawn from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hierarchy configuration (input value; immutable for the life of a run)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

/// Sampling parameters for one agent's LLM calls. All optional with defaults
/// resolved by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmParams {
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub agent_id: String,
    pub role: String,
    pub system_prompt: String,
    #[serde(default)]
    pub llm: LlmParams,
    /// Tool names this worker may call, resolved at dispatch time via
    /// the external `ToolProvider` collaborator.
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub agent_id: String,
    pub supervisor_prompt: String,
    #[serde(default)]
    pub supervisor_llm: LlmParams,
    /// Enables per-worker dedup within this team for a given task.
    #[serde(default)]
    pub prevent_duplicate: bool,
    /// When true, this team's prompt is prefixed with prior teams' results,
    /// independent of the hierarchy-wide `enable_context_sharing` flag.
    #[serde(default)]
    pub share_context: bool,
    pub workers: Vec<WorkerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    pub global_prompt: String,
    #[serde(default)]
    pub global_llm: LlmParams,
    #[serde(default)]
    pub global_agent_id: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// When true, every team's prompt is prefixed with all prior teams' results.
    #[serde(default)]
    pub enable_context_sharing: bool,
    /// Per-agent tool-loop ceiling (see SPEC_FULL.md A.6). Default mirrors the
    /// teacher's MAX_TOOL_LOOPS constant.
    #[serde(default = "default_max_turns_per_agent")]
    pub max_turns_per_agent: u32,
    pub teams: Vec<TeamConfig>,
}

fn default_max_turns_per_agent() -> u32 {
    25
}

impl HierarchyConfig {
    /// Structural validation performed synchronously at `RunManager::start`,
    /// before a `Run` is created (spec §7, "Configuration errors").
    pub fn validate(&self) -> std::result::Result<(), crate::error::Error> {
        if self.teams.is_empty() {
            return Err(crate::error::Error::Config(
                "hierarchy must declare at least one team".into(),
            ));
        }
        if self.global_prompt.trim().is_empty() {
            return Err(crate::error::Error::Config(
                "global_prompt must not be empty".into(),
            ));
        }
        let mut team_names = std::collections::HashSet::new();
        for team in &self.teams {
            if team.name.trim().is_empty() {
                return Err(crate::error::Error::Config(
                    "team name must not be empty".into(),
                ));
            }
            if !team_names.insert(team.name.as_str()) {
                return Err(crate::error::Error::Config(format!(
                    "duplicate team name \"{}\"",
                    team.name
                )));
            }
            if team.supervisor_prompt.trim().is_empty() {
                return Err(crate::error::Error::Config(format!(
                    "team \"{}\" missing supervisor_prompt",
                    team.name
                )));
            }
            let mut worker_names = std::collections::HashSet::new();
            for worker in &team.workers {
                if worker.name.trim().is_empty() {
                    return Err(crate::error::Error::Config(format!(
                        "team \"{}\" has a worker with an empty name",
                        team.name
                    )));
                }
                if !worker_names.insert(worker.name.as_str()) {
                    return Err(crate::error::Error::Config(format!(
                        "team \"{}\" has duplicate worker name \"{}\"",
                        team.name, worker.name
                    )));
                }
                if worker.system_prompt.trim().is_empty() {
                    return Err(crate::error::Error::Config(format!(
                        "worker \"{}\" in team \"{}\" missing system_prompt",
                        worker.name, team.name
                    )));
                }
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run (the central mutable entity)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: u64,
    pub hierarchy_id: String,
    pub task: String,
    pub status: RunStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub statistics: RunStatistics,
    /// Materialized IDs of global/team/worker at start of run; frozen for audit
    /// (invariant 3: read-only once the run leaves `pending`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology_snapshot: Option<TopologySnapshot>,
}

impl Run {
    pub fn new(run_id: u64, hierarchy_id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            run_id,
            hierarchy_id: hierarchy_id.into(),
            task: task.into(),
            status: RunStatus::Pending,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            statistics: RunStatistics::default(),
            topology_snapshot: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunStatistics {
    pub total_calls: u64,
    pub completed_calls: u64,
    pub by_team: HashMap<String, u64>,
    pub by_worker: HashMap<String, u64>,
    pub durations_ms: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub global_agent_id: String,
    pub teams: Vec<TeamTopology>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamTopology {
    pub team_id: String,
    pub team_name: String,
    pub supervisor_id: String,
    pub workers: Vec<WorkerTopology>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerTopology {
    pub worker_id: String,
    pub worker_name: String,
    pub role: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event (append-only, the data-flow heart)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    GlobalSupervisor,
    TeamSupervisor,
    Worker,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub agent_id: String,
    pub agent_type: AgentType,
    pub agent_name: String,
    /// Null for global and system sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
}

impl Source {
    pub fn system() -> Self {
        Self {
            agent_id: "system".into(),
            agent_type: AgentType::System,
            agent_name: "system".into(),
            team_name: None,
        }
    }
}

/// The closed `(category, action)` set events are drawn from (spec §6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Lifecycle,
    Llm,
    Dispatch,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    // lifecycle
    Started,
    Completed,
    Failed,
    Cancelled,
    // llm
    Stream,
    Reasoning,
    ToolCall,
    ToolResult,
    // dispatch
    Team,
    Worker,
    // system
    Topology,
    Warning,
    Error,
    Close,
}

impl EventAction {
    pub fn category(self) -> EventCategory {
        use EventAction::*;
        match self {
            Started | Completed | Failed | Cancelled => EventCategory::Lifecycle,
            Stream | Reasoning | ToolCall | ToolResult => EventCategory::Llm,
            Team | Worker => EventCategory::Dispatch,
            Topology | Warning | Error | Close => EventCategory::System,
        }
    }

    /// The SSE `event:` field, e.g. `"lifecycle.started"`.
    pub fn wire_name(self) -> String {
        format!("{:?}.{:?}", self.category(), self)
            .to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventKind {
    pub category: EventCategory,
    pub action: EventAction,
}

impl From<EventAction> for EventKind {
    fn from(action: EventAction) -> Self {
        Self {
            category: action.category(),
            action,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub run_id: u64,
    pub sequence: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source: Source,
    pub event: EventKind,
    pub data: serde_json::Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CallRecord (per run, per dispatch attempt)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    InProgress,
    Completed,
    DuplicateBlocked,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub team_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    pub task: String,
    pub status: CallStatus,
    pub task_fingerprint: u64,
    pub start_time: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    /// First 200 chars of the returned text — observability only, never
    /// used for correctness decisions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_preview: Option<String>,
}

/// Normalize and hash a task string into a stable fingerprint for dedup.
///
/// Normalization: trim, collapse internal whitespace, lowercase — so that
/// `"  Say Hi "` and `"say hi"` dedup as the same task.
pub fn task_fingerprint(task: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let normalized = task
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    normalized.hash(&mut hasher);
    hasher.finish()
}
