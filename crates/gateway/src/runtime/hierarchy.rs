//! Turns a `HierarchyConfig` into a fully wired tree of agents bound to one
//! run (spec §4.4).

use std::sync::Arc;

use hae_domain::error::{Error, Result};
use hae_domain::model::{HierarchyConfig, TeamTopology, TopologySnapshot, WorkerTopology};

use hae_providers::traits::LlmClient;

use super::agent::{Agent, GlobalSupervisor, TeamSupervisor, Worker};
use super::call_tracker::CallTracker;
use super::context::ContextAccumulator;
use super::event_bus::EventBus;
use super::tool_provider::ToolProvider;

/// Output of `HierarchyBuilder::build`: the root agent, the configured team
/// names in declared order, and the frozen topology snapshot for the run.
pub struct BuiltHierarchy {
    pub global: Arc<GlobalSupervisor>,
    pub team_names: Vec<String>,
    pub topology: TopologySnapshot,
}

fn resolved_id(configured: &str, fallback: &str) -> String {
    if configured.trim().is_empty() {
        fallback.to_string()
    } else {
        configured.to_string()
    }
}

pub struct HierarchyBuilder;

impl HierarchyBuilder {
    /// Build the agent tree for one run. `config` must already have passed
    /// `HierarchyConfig::validate` (duplicate team/worker names are rejected
    /// there); this defensively re-checks worker name uniqueness per team.
    pub fn build(
        config: &HierarchyConfig,
        run_id: u64,
        llm_client: Arc<dyn LlmClient>,
        tool_provider: Arc<dyn ToolProvider>,
        bus: Arc<EventBus>,
        call_tracker: Arc<CallTracker>,
    ) -> Result<BuiltHierarchy> {
        let context: Option<Arc<ContextAccumulator>> = if config.enable_context_sharing {
            Some(Arc::new(ContextAccumulator::new()))
        } else {
            None
        };
        // Even when the global flag is off, a team's own `share_context` can
        // opt in, so an accumulator must exist regardless; it's simply never
        // consulted unless sharing is enabled for that team (spec §4.4).
        let context = context.unwrap_or_else(|| Arc::new(ContextAccumulator::new()));

        let mut team_names = Vec::with_capacity(config.teams.len());
        let mut team_topologies = Vec::with_capacity(config.teams.len());
        let mut teams = Vec::with_capacity(config.teams.len());

        for team_cfg in &config.teams {
            let mut seen = std::collections::HashSet::new();
            let mut workers = Vec::with_capacity(team_cfg.workers.len());
            let mut worker_topologies = Vec::with_capacity(team_cfg.workers.len());

            for worker_cfg in &team_cfg.workers {
                if !seen.insert(worker_cfg.name.as_str()) {
                    return Err(Error::Config(format!(
                        "team \"{}\" has duplicate worker name \"{}\"",
                        team_cfg.name, worker_cfg.name
                    )));
                }

                let worker_agent_id = resolved_id(&worker_cfg.agent_id, &worker_cfg.id);
                let worker = Arc::new(Worker::new(
                    worker_agent_id.clone(),
                    worker_cfg.name.clone(),
                    worker_cfg.role.clone(),
                    worker_cfg.system_prompt.clone(),
                    worker_cfg.llm.clone(),
                    worker_cfg.tools.clone(),
                    team_cfg.name.clone(),
                    llm_client.clone(),
                    tool_provider.clone(),
                    bus.clone(),
                    config.max_turns_per_agent as usize,
                ));

                worker_topologies.push(WorkerTopology {
                    worker_id: worker_cfg.id.clone(),
                    worker_name: worker_cfg.name.clone(),
                    role: worker_cfg.role.clone(),
                });
                workers.push((worker, worker_cfg.role.clone()));
            }

            let team_agent_id = resolved_id(&team_cfg.agent_id, &team_cfg.id);
            let sharing_enabled = config.enable_context_sharing || team_cfg.share_context;

            let team = Arc::new(TeamSupervisor::new(
                team_agent_id.clone(),
                team_cfg.name.clone(),
                team_cfg.supervisor_prompt.clone(),
                team_cfg.supervisor_llm.clone(),
                team_cfg.prevent_duplicate,
                sharing_enabled,
                workers,
                llm_client.clone(),
                call_tracker.clone(),
                context.clone(),
                bus.clone(),
                config.max_turns_per_agent as usize,
            ));

            team_topologies.push(TeamTopology {
                team_id: team_cfg.id.clone(),
                team_name: team_cfg.name.clone(),
                supervisor_id: team_agent_id,
                workers: worker_topologies,
            });
            team_names.push(team_cfg.name.clone());
            teams.push(team);
        }

        let global_agent_id = resolved_id(&config.global_agent_id, "global");
        let global = Arc::new(GlobalSupervisor::new(
            global_agent_id.clone(),
            config.global_prompt.clone(),
            config.global_llm.clone(),
            config.execution_mode,
            teams,
            llm_client,
            call_tracker,
            bus,
            config.max_turns_per_agent as usize,
        ));

        let topology = TopologySnapshot {
            global_agent_id,
            teams: team_topologies,
        };

        let _ = run_id; // run identity lives on the EventBus/CallTracker, not the tree itself

        Ok(BuiltHierarchy {
            global,
            team_names,
            topology,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::event_store::MemoryEventStore;
    use crate::runtime::tool_provider::NullToolProvider;
    use hae_domain::model::{TeamConfig, WorkerConfig};
    use hae_providers::stub::StubLlmClient;

    fn sample_config() -> HierarchyConfig {
        HierarchyConfig {
            global_prompt: "you are the boss".into(),
            global_llm: Default::default(),
            global_agent_id: "".into(),
            execution_mode: Default::default(),
            enable_context_sharing: false,
            max_turns_per_agent: 25,
            teams: vec![TeamConfig {
                id: "team-1".into(),
                name: "Research".into(),
                agent_id: "".into(),
                supervisor_prompt: "lead the research".into(),
                supervisor_llm: Default::default(),
                prevent_duplicate: true,
                share_context: false,
                workers: vec![WorkerConfig {
                    id: "worker-1".into(),
                    name: "Scout".into(),
                    agent_id: "".into(),
                    role: "finds sources".into(),
                    system_prompt: "you scout".into(),
                    llm: Default::default(),
                    tools: vec![],
                }],
            }],
        }
    }

    fn deps() -> (Arc<dyn LlmClient>, Arc<dyn ToolProvider>, Arc<EventBus>, Arc<CallTracker>) {
        let llm: Arc<dyn LlmClient> = Arc::new(StubLlmClient::new());
        let tools: Arc<dyn ToolProvider> = Arc::new(NullToolProvider);
        let bus = Arc::new(EventBus::new(1, Arc::new(MemoryEventStore::new(100)), 100));
        let tracker = Arc::new(CallTracker::new(crate::runtime::cancel::CancelToken::new()));
        (llm, tools, bus, tracker)
    }

    #[test]
    fn build_produces_expected_topology() {
        let config = sample_config();
        let (llm, tools, bus, tracker) = deps();
        let built = HierarchyBuilder::build(&config, 1, llm, tools, bus, tracker).unwrap();

        assert_eq!(built.team_names, vec!["Research".to_string()]);
        assert_eq!(built.topology.teams.len(), 1);
        assert_eq!(built.topology.teams[0].team_name, "Research");
        assert_eq!(built.topology.teams[0].workers[0].worker_name, "Scout");
        assert_eq!(built.topology.global_agent_id, "global");
    }

    #[test]
    fn build_rejects_duplicate_worker_names() {
        let mut config = sample_config();
        let dup = config.teams[0].workers[0].clone();
        config.teams[0].workers.push(dup);
        let (llm, tools, bus, tracker) = deps();
        let result = HierarchyBuilder::build(&config, 1, llm, tools, bus, tracker);
        assert!(result.is_err());
    }

    #[test]
    fn global_agent_id_falls_back_to_literal_global_when_unconfigured() {
        let config = sample_config();
        let (llm, tools, bus, tracker) = deps();
        let built = HierarchyBuilder::build(&config, 1, llm, tools, bus, tracker).unwrap();
        assert_eq!(built.global.source().agent_id, "global");
    }
}
