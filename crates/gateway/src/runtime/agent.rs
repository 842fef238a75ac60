//! The Agent family: Worker, TeamSupervisor, GlobalSupervisor (spec §4.5).
//!
//! All three share the same turn loop (prompt the LLM, stream the response
//! through an `LlmCallbackHandler`, resolve any tool calls, feed results
//! back) but differ in what their "tools" resolve to: a `Worker`'s tools
//! come from the external `ToolProvider`; a `TeamSupervisor`'s tools are its
//! configured `Worker`s; a `GlobalSupervisor`'s tools are its teams.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::Semaphore;

use hae_domain::error::{Error, Result};
use hae_domain::model::{AgentType, CallStatus, EventAction, ExecutionMode, LlmParams, Source};
use hae_domain::stream::StreamEvent;
use hae_domain::tool::{Message, ToolCall, ToolDefinition};

use hae_providers::traits::{ChatRequest, LlmClient};

use super::call_tracker::{CallTracker, DispatchOutcome};
use super::callback::LlmCallbackHandler;
use super::cancel::CancelToken;
use super::context::ContextAccumulator;
use super::event_bus::EventBus;
use super::tool_provider::ToolProvider;

/// Shared contract for every tier of the hierarchy: invoke with a task,
/// return the agent's final text (spec §4.5 "Common contract").
#[async_trait]
pub trait Agent: Send + Sync {
    fn source(&self) -> &Source;
    async fn invoke(&self, task: &str, cancel: &CancelToken) -> Result<String>;
}

fn task_tool_definition(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": { "task": { "type": "string" } },
            "required": ["task"]
        }),
    }
}

fn extract_task(arguments: &serde_json::Value) -> String {
    arguments
        .get("task")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Runs one turn loop to completion: streams the LLM response, collects
/// text and any finished tool calls. Returns `(text, tool_calls)`.
///
/// Polls `cancel` before processing each frame (spec §4.3: "before
/// enqueuing each token chunk" is a cancellation safe point) so a signal
/// raised mid-stream unwinds the turn without waiting for the stream to
/// finish draining.
async fn run_turn(
    llm: &Arc<dyn LlmClient>,
    handler: &LlmCallbackHandler,
    request: &ChatRequest,
    cancel: &CancelToken,
) -> Result<(String, Vec<ToolCall>)> {
    let mut stream = llm.chat_stream(request).await?;
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    while let Some(frame) = stream.next().await {
        cancel.throw_if_cancelled()?;
        let frame = frame?;
        handler.handle(&frame);
        match frame {
            StreamEvent::Token { text: chunk } => text.push_str(&chunk),
            StreamEvent::ToolCallFinished {
                call_id,
                tool_name,
                arguments,
            } => tool_calls.push(ToolCall {
                call_id,
                tool_name,
                arguments,
            }),
            StreamEvent::Error { message } => {
                return Err(Error::Provider {
                    provider: llm.provider_id().to_string(),
                    message,
                });
            }
            StreamEvent::Done { .. } => break,
            _ => {}
        }
    }

    Ok((text, tool_calls))
}

fn model_tag(llm: &LlmParams, agent_id: &str) -> Option<String> {
    llm.model_id.clone().or_else(|| Some(agent_id.to_string()))
}

/// A leaf agent: sees its `system_prompt`, whatever tools its
/// `tool_names` resolve to via the `ToolProvider`, and the task text. No
/// child agents (spec §4.5 "Worker").
pub struct Worker {
    name: String,
    llm_params: LlmParams,
    tool_names: Vec<String>,
    system_prompt: String,
    source: Source,
    llm_client: Arc<dyn LlmClient>,
    tool_provider: Arc<dyn ToolProvider>,
    bus: Arc<EventBus>,
    max_turns: usize,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: String,
        name: String,
        role: String,
        system_prompt: String,
        llm_params: LlmParams,
        tool_names: Vec<String>,
        team_name: String,
        llm_client: Arc<dyn LlmClient>,
        tool_provider: Arc<dyn ToolProvider>,
        bus: Arc<EventBus>,
        max_turns: usize,
    ) -> Self {
        let source = Source {
            agent_id,
            agent_type: AgentType::Worker,
            agent_name: name.clone(),
            team_name: Some(team_name),
        };
        let _ = &role; // carried via tool_definition's description, not stored separately
        Self {
            name,
            llm_params,
            tool_names,
            system_prompt,
            source,
            llm_client,
            tool_provider,
            bus,
            max_turns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tool_definition(&self, role: &str) -> ToolDefinition {
        task_tool_definition(&self.name, role)
    }
}

#[async_trait]
impl Agent for Worker {
    fn source(&self) -> &Source {
        &self.source
    }

    async fn invoke(&self, task: &str, cancel: &CancelToken) -> Result<String> {
        self.bus
            .publish(self.source.clone(), EventAction::Started, serde_json::json!({ "task": task }));

        let handler = LlmCallbackHandler::new(self.source.clone(), self.bus.clone());
        let tool_defs = self.tool_provider.definitions(&self.tool_names);
        let mut messages = vec![Message::system(&self.system_prompt), Message::user(task)];

        let result = async {
            for _turn in 0..self.max_turns {
                cancel.throw_if_cancelled()?;

                let request = ChatRequest {
                    messages: messages.clone(),
                    tools: tool_defs.clone(),
                    temperature: self.llm_params.temperature,
                    max_tokens: self.llm_params.max_tokens,
                    json_mode: false,
                    model: model_tag(&self.llm_params, &self.source.agent_id),
                };

                let (text, tool_calls) = run_turn(&self.llm_client, &handler, &request, cancel).await?;

                if tool_calls.is_empty() {
                    return Ok(format!("[{}] {}", self.name, text));
                }

                messages.push(Message::assistant(&text));
                for call in tool_calls {
                    cancel.throw_if_cancelled()?;
                    let outcome = self
                        .tool_provider
                        .invoke(&call.tool_name, call.arguments.clone())
                        .await;
                    let result_text = match outcome {
                        Ok(text) => text,
                        Err(err) => format!("error: {err}"),
                    };
                    handler.tool_result(&call.call_id, &call.tool_name, &result_text);
                    messages.push(Message::tool_result(call.call_id, result_text));
                }
            }
            Err(Error::Other(format!(
                "worker '{}' exceeded max_turns_per_agent",
                self.name
            )))
        }
        .await;

        self.emit_terminal(&result);
        result
    }
}

impl Worker {
    fn emit_terminal(&self, result: &Result<String>) {
        match result {
            Ok(text) => {
                self.bus.publish(
                    self.source.clone(),
                    EventAction::Completed,
                    serde_json::json!({ "result": text }),
                );
            }
            Err(Error::Cancelled) => {
                self.bus
                    .publish(self.source.clone(), EventAction::Cancelled, serde_json::json!({}));
            }
            Err(err) => {
                self.bus.publish(
                    self.source.clone(),
                    EventAction::Failed,
                    serde_json::json!({ "error": err.to_string() }),
                );
            }
        }
    }
}

/// Wraps a configured set of `Worker`s as callable tools, deduping dispatch
/// through the run's `CallTracker` and (optionally) sharing cross-team
/// context (spec §4.5 "TeamSupervisor").
pub struct TeamSupervisor {
    team_name: String,
    supervisor_prompt: String,
    llm_params: LlmParams,
    prevent_duplicate: bool,
    sharing_enabled: bool,
    source: Source,
    workers: Vec<(Arc<Worker>, String)>,
    llm_client: Arc<dyn LlmClient>,
    call_tracker: Arc<CallTracker>,
    context: Arc<ContextAccumulator>,
    bus: Arc<EventBus>,
    max_turns: usize,
}

impl TeamSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: String,
        team_name: String,
        supervisor_prompt: String,
        llm_params: LlmParams,
        prevent_duplicate: bool,
        sharing_enabled: bool,
        workers: Vec<(Arc<Worker>, String)>,
        llm_client: Arc<dyn LlmClient>,
        call_tracker: Arc<CallTracker>,
        context: Arc<ContextAccumulator>,
        bus: Arc<EventBus>,
        max_turns: usize,
    ) -> Self {
        let source = Source {
            agent_id,
            agent_type: AgentType::TeamSupervisor,
            agent_name: team_name.clone(),
            team_name: Some(team_name.clone()),
        };
        Self {
            team_name,
            supervisor_prompt,
            llm_params,
            prevent_duplicate,
            sharing_enabled,
            source,
            workers,
            llm_client,
            call_tracker,
            context,
            bus,
            max_turns,
        }
    }

    pub fn team_name(&self) -> &str {
        &self.team_name
    }

    pub fn prevent_duplicate(&self) -> bool {
        self.prevent_duplicate
    }

    pub fn tool_definition(&self) -> ToolDefinition {
        task_tool_definition(&self.team_name, &format!("Team '{}'", self.team_name))
    }

    fn worker_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.workers
            .iter()
            .map(|(w, role)| w.tool_definition(role))
            .collect()
    }

    fn find_worker(&self, name: &str) -> Option<&Arc<Worker>> {
        self.workers.iter().find(|(w, _)| w.name() == name).map(|(w, _)| w)
    }

    async fn dispatch_worker(&self, worker_name: &str, sub_task: &str, cancel: &CancelToken) -> Result<String> {
        let outcome = self
            .call_tracker
            .open(&self.team_name, Some(worker_name), sub_task, self.prevent_duplicate);

        match outcome {
            DispatchOutcome::Cancelled => Err(Error::Cancelled),
            DispatchOutcome::Duplicate { .. } => {
                self.bus.publish(
                    Source::system(),
                    EventAction::Warning,
                    serde_json::json!({ "reason": "duplicate", "worker": worker_name, "team": self.team_name }),
                );
                Ok(format!("[{worker_name}] already executed; reuse previous result"))
            }
            DispatchOutcome::Allowed { call_id } => {
                self.bus.publish(
                    self.source.clone(),
                    EventAction::Worker,
                    serde_json::json!({ "worker": worker_name, "team": self.team_name, "call_id": call_id }),
                );

                let Some(worker) = self.find_worker(worker_name) else {
                    let message = format!("unknown worker '{worker_name}' in team '{}'", self.team_name);
                    self.call_tracker.close(&call_id, CallStatus::Failed, Some(&message));
                    return Err(Error::Other(message));
                };

                match worker.invoke(sub_task, cancel).await {
                    Ok(text) => {
                        self.call_tracker.close(&call_id, CallStatus::Completed, Some(&text));
                        Ok(text)
                    }
                    Err(Error::Cancelled) => {
                        self.call_tracker.close(&call_id, CallStatus::Failed, Some("cancelled"));
                        Err(Error::Cancelled)
                    }
                    Err(err) => {
                        self.call_tracker.close(&call_id, CallStatus::Failed, Some(&err.to_string()));
                        Err(err)
                    }
                }
            }
        }
    }

    fn emit_terminal(&self, result: &Result<String>) {
        match result {
            Ok(text) => {
                self.context.record(&self.team_name, text);
                self.bus.publish(
                    self.source.clone(),
                    EventAction::Completed,
                    serde_json::json!({ "result": text }),
                );
            }
            Err(Error::Cancelled) => {
                self.bus
                    .publish(self.source.clone(), EventAction::Cancelled, serde_json::json!({}));
            }
            Err(err) => {
                self.bus.publish(
                    self.source.clone(),
                    EventAction::Failed,
                    serde_json::json!({ "error": err.to_string() }),
                );
            }
        }
    }
}

#[async_trait]
impl Agent for TeamSupervisor {
    fn source(&self) -> &Source {
        &self.source
    }

    async fn invoke(&self, task: &str, cancel: &CancelToken) -> Result<String> {
        let primed_task = if self.sharing_enabled {
            self.context.prime(task)
        } else {
            task.to_string()
        };

        self.bus
            .publish(self.source.clone(), EventAction::Started, serde_json::json!({ "task": task }));

        let handler = LlmCallbackHandler::new(self.source.clone(), self.bus.clone());
        let tool_defs = self.worker_tool_definitions();
        let mut messages = vec![Message::system(&self.supervisor_prompt), Message::user(&primed_task)];

        let result = async {
            for _turn in 0..self.max_turns {
                cancel.throw_if_cancelled()?;

                let request = ChatRequest {
                    messages: messages.clone(),
                    tools: tool_defs.clone(),
                    temperature: self.llm_params.temperature,
                    max_tokens: self.llm_params.max_tokens,
                    json_mode: false,
                    model: model_tag(&self.llm_params, &self.source.agent_id),
                };

                let (text, tool_calls) = run_turn(&self.llm_client, &handler, &request, cancel).await?;

                if tool_calls.is_empty() {
                    return Ok(text);
                }

                messages.push(Message::assistant(&text));
                for call in tool_calls {
                    cancel.throw_if_cancelled()?;
                    let sub_task = extract_task(&call.arguments);
                    let result_text = self.dispatch_worker(&call.tool_name, &sub_task, cancel).await?;
                    handler.tool_result(&call.call_id, &call.tool_name, &result_text);
                    messages.push(Message::tool_result(call.call_id, result_text));
                }
            }
            Err(Error::Other(format!(
                "team '{}' exceeded max_turns_per_agent",
                self.team_name
            )))
        }
        .await;

        self.emit_terminal(&result);
        result
    }
}

/// The run's root agent. Structurally identical to `TeamSupervisor` but its
/// tools are teams, and in `sequential` mode a size-1 semaphore serializes
/// team dispatch even when the LLM requests several team calls in one turn
/// (spec §4.5 "GlobalSupervisor").
pub struct GlobalSupervisor {
    global_prompt: String,
    llm_params: LlmParams,
    execution_mode: ExecutionMode,
    source: Source,
    teams: Vec<Arc<TeamSupervisor>>,
    llm_client: Arc<dyn LlmClient>,
    call_tracker: Arc<CallTracker>,
    bus: Arc<EventBus>,
    max_turns: usize,
    sequential_gate: Option<Arc<Semaphore>>,
}

impl GlobalSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: String,
        global_prompt: String,
        llm_params: LlmParams,
        execution_mode: ExecutionMode,
        teams: Vec<Arc<TeamSupervisor>>,
        llm_client: Arc<dyn LlmClient>,
        call_tracker: Arc<CallTracker>,
        bus: Arc<EventBus>,
        max_turns: usize,
    ) -> Self {
        let source = Source {
            agent_id,
            agent_type: AgentType::GlobalSupervisor,
            agent_name: "global".into(),
            team_name: None,
        };
        let sequential_gate =
            matches!(execution_mode, ExecutionMode::Sequential).then(|| Arc::new(Semaphore::new(1)));
        Self {
            global_prompt,
            llm_params,
            execution_mode,
            source,
            teams,
            llm_client,
            call_tracker,
            bus,
            max_turns,
            sequential_gate,
        }
    }

    fn find_team(&self, name: &str) -> Option<&Arc<TeamSupervisor>> {
        self.teams.iter().find(|t| t.team_name() == name)
    }

    async fn dispatch_team(&self, team_name: &str, sub_task: &str, cancel: &CancelToken) -> Result<String> {
        let _permit = match &self.sequential_gate {
            Some(gate) => Some(gate.clone().acquire_owned().await.map_err(|_| Error::Cancelled)?),
            None => None,
        };

        let Some(team) = self.find_team(team_name) else {
            return Err(Error::Other(format!("unknown team '{team_name}'")));
        };

        let outcome = self
            .call_tracker
            .open(team_name, None, sub_task, team.prevent_duplicate());

        match outcome {
            DispatchOutcome::Cancelled => Err(Error::Cancelled),
            DispatchOutcome::Duplicate { .. } => {
                self.bus.publish(
                    Source::system(),
                    EventAction::Warning,
                    serde_json::json!({ "reason": "duplicate", "team": team_name }),
                );
                Ok(format!("[{team_name}] already executed; reuse previous result"))
            }
            DispatchOutcome::Allowed { call_id } => {
                self.bus.publish(
                    self.source.clone(),
                    EventAction::Team,
                    serde_json::json!({ "team": team_name, "call_id": call_id }),
                );

                match team.invoke(sub_task, cancel).await {
                    Ok(text) => {
                        self.call_tracker.close(&call_id, CallStatus::Completed, Some(&text));
                        Ok(text)
                    }
                    Err(Error::Cancelled) => {
                        self.call_tracker.close(&call_id, CallStatus::Failed, Some("cancelled"));
                        Err(Error::Cancelled)
                    }
                    Err(err) => {
                        self.call_tracker.close(&call_id, CallStatus::Failed, Some(&err.to_string()));
                        Err(err)
                    }
                }
            }
        }
    }

    fn emit_terminal(&self, result: &Result<String>) {
        match result {
            Ok(text) => {
                self.bus.publish(
                    self.source.clone(),
                    EventAction::Completed,
                    serde_json::json!({ "result": text }),
                );
            }
            Err(Error::Cancelled) => {
                self.bus
                    .publish(self.source.clone(), EventAction::Cancelled, serde_json::json!({}));
            }
            Err(err) => {
                self.bus.publish(
                    self.source.clone(),
                    EventAction::Failed,
                    serde_json::json!({ "error": err.to_string() }),
                );
            }
        }
    }
}

#[async_trait]
impl Agent for GlobalSupervisor {
    fn source(&self) -> &Source {
        &self.source
    }

    async fn invoke(&self, task: &str, cancel: &CancelToken) -> Result<String> {
        self.bus
            .publish(self.source.clone(), EventAction::Started, serde_json::json!({ "task": task }));

        let handler = LlmCallbackHandler::new(self.source.clone(), self.bus.clone());
        let tool_defs: Vec<ToolDefinition> = self.teams.iter().map(|t| t.tool_definition()).collect();
        let mut messages = vec![Message::system(&self.global_prompt), Message::user(task)];

        let result = async {
            for _turn in 0..self.max_turns {
                cancel.throw_if_cancelled()?;

                let request = ChatRequest {
                    messages: messages.clone(),
                    tools: tool_defs.clone(),
                    temperature: self.llm_params.temperature,
                    max_tokens: self.llm_params.max_tokens,
                    json_mode: false,
                    model: model_tag(&self.llm_params, &self.source.agent_id),
                };

                let (text, tool_calls) = run_turn(&self.llm_client, &handler, &request, cancel).await?;

                if tool_calls.is_empty() {
                    return Ok(text);
                }

                messages.push(Message::assistant(&text));

                let dispatches: Vec<(String, String, Result<String>)> =
                    if matches!(self.execution_mode, ExecutionMode::Parallel) {
                        let futures = tool_calls.iter().map(|call| {
                            let sub_task = extract_task(&call.arguments);
                            let call_id = call.call_id.clone();
                            let tool_name = call.tool_name.clone();
                            async move {
                                let outcome = self.dispatch_team(&tool_name, &sub_task, cancel).await;
                                (call_id, tool_name, outcome)
                            }
                        });
                        futures_util::future::join_all(futures).await
                    } else {
                        let mut out = Vec::with_capacity(tool_calls.len());
                        for call in &tool_calls {
                            cancel.throw_if_cancelled()?;
                            let sub_task = extract_task(&call.arguments);
                            let outcome = self.dispatch_team(&call.tool_name, &sub_task, cancel).await;
                            out.push((call.call_id.clone(), call.tool_name.clone(), outcome));
                        }
                        out
                    };

                for (call_id, tool_name, outcome) in dispatches {
                    let result_text = outcome?;
                    handler.tool_result(&call_id, &tool_name, &result_text);
                    messages.push(Message::tool_result(call_id, result_text));
                }
            }
            Err(Error::Other("global supervisor exceeded max_turns_per_agent".into()))
        }
        .await;

        self.emit_terminal(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::event_store::MemoryEventStore;
    use crate::runtime::tool_provider::NullToolProvider;
    use hae_providers::stub::{ScriptedTurn, StubLlmClient};

    fn make_worker(agent_id: &str, name: &str, team: &str, llm: Arc<dyn LlmClient>, bus: Arc<EventBus>) -> Arc<Worker> {
        Arc::new(Worker::new(
            agent_id.into(),
            name.into(),
            "role".into(),
            "sys".into(),
            LlmParams::default(),
            vec![],
            team.into(),
            llm,
            Arc::new(NullToolProvider),
            bus,
            25,
        ))
    }

    #[tokio::test]
    async fn worker_wraps_output_with_name() {
        let stub = Arc::new(StubLlmClient::new());
        stub.script("agent-Researcher", vec![ScriptedTurn::text("done")]);
        let bus = Arc::new(EventBus::new(1, Arc::new(MemoryEventStore::new(100)), 100));
        let worker = make_worker("agent-Researcher", "Researcher", "Team", stub, bus);

        let cancel = CancelToken::new();
        let result = worker.invoke("find things", &cancel).await.unwrap();
        assert_eq!(result, "[Researcher] done");
    }

    #[tokio::test]
    async fn worker_respects_cancellation_before_first_turn() {
        let stub = Arc::new(StubLlmClient::new());
        let bus = Arc::new(EventBus::new(1, Arc::new(MemoryEventStore::new(100)), 100));
        let worker = make_worker("agent-W", "W", "T", stub, bus);

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = worker.invoke("x", &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn team_supervisor_dispatches_worker() {
        let stub = Arc::new(StubLlmClient::new());
        let bus = Arc::new(EventBus::new(1, Arc::new(MemoryEventStore::new(100)), 100));
        let worker = make_worker("agent-W", "W", "T", stub.clone(), bus.clone());

        stub.script("agent-W", vec![ScriptedTurn::text("worker output")]);
        stub.script(
            "agent-T",
            vec![
                ScriptedTurn::tool_call("W", serde_json::json!({"task": "x"})),
                ScriptedTurn::text("team done"),
            ],
        );

        let cancel = CancelToken::new();
        let tracker = Arc::new(CallTracker::new(cancel.clone()));
        let ctx = Arc::new(ContextAccumulator::new());

        let team = TeamSupervisor::new(
            "agent-T".into(),
            "T".into(),
            "sys".into(),
            LlmParams::default(),
            true,
            false,
            vec![(worker, "role".to_string())],
            stub,
            tracker,
            ctx,
            bus,
            25,
        );

        let result = team.invoke("do it", &cancel).await.unwrap();
        assert_eq!(result, "team done");
    }

    #[tokio::test]
    async fn team_supervisor_blocks_duplicate_worker_dispatch() {
        let stub = Arc::new(StubLlmClient::new());
        let bus = Arc::new(EventBus::new(1, Arc::new(MemoryEventStore::new(100)), 100));
        let worker = make_worker("agent-W", "W", "T", stub.clone(), bus.clone());

        stub.script("agent-W", vec![ScriptedTurn::text("only once")]);
        stub.script(
            "agent-T",
            vec![
                ScriptedTurn::tool_call("W", serde_json::json!({"task": "same task"})),
                ScriptedTurn::tool_call("W", serde_json::json!({"task": "same task"})),
                ScriptedTurn::text("team done"),
            ],
        );

        let cancel = CancelToken::new();
        let tracker = Arc::new(CallTracker::new(cancel.clone()));
        let ctx = Arc::new(ContextAccumulator::new());

        let team = TeamSupervisor::new(
            "agent-T".into(),
            "T".into(),
            "sys".into(),
            LlmParams::default(),
            true,
            false,
            vec![(worker, "role".to_string())],
            stub.clone(),
            tracker,
            ctx,
            bus,
            25,
        );

        let result = team.invoke("do it", &cancel).await.unwrap();
        assert_eq!(result, "team done");
        // second scripted turn for the worker should never have been consumed
        assert!(stub.requests_for("agent-W").len() == 1);
    }

    #[tokio::test]
    async fn global_supervisor_dispatches_team_sequentially() {
        let stub = Arc::new(StubLlmClient::new());
        let bus = Arc::new(EventBus::new(1, Arc::new(MemoryEventStore::new(100)), 100));
        let worker = make_worker("agent-W", "W", "T", stub.clone(), bus.clone());

        stub.script("agent-W", vec![ScriptedTurn::text("worker output")]);
        stub.script(
            "agent-T",
            vec![
                ScriptedTurn::tool_call("W", serde_json::json!({"task": "x"})),
                ScriptedTurn::text("team done"),
            ],
        );
        stub.script(
            "agent-G",
            vec![
                ScriptedTurn::tool_call("T", serde_json::json!({"task": "do it"})),
                ScriptedTurn::text("global done"),
            ],
        );

        let cancel = CancelToken::new();
        let tracker = Arc::new(CallTracker::new(cancel.clone()));
        let ctx = Arc::new(ContextAccumulator::new());

        let team = Arc::new(TeamSupervisor::new(
            "agent-T".into(),
            "T".into(),
            "sys".into(),
            LlmParams::default(),
            true,
            false,
            vec![(worker, "role".to_string())],
            stub.clone(),
            tracker.clone(),
            ctx,
            bus.clone(),
            25,
        ));

        let global = GlobalSupervisor::new(
            "agent-G".into(),
            "sys".into(),
            LlmParams::default(),
            ExecutionMode::Sequential,
            vec![team],
            stub,
            tracker,
            bus,
            25,
        );

        let result = global.invoke("task", &cancel).await.unwrap();
        assert_eq!(result, "global done");
    }
}
