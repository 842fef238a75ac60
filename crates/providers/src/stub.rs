//! In-process `LlmClient` stub used by the test suite to drive the engine
//! deterministically without a network call (spec.md §8's S1-S6 scenarios).
//!
//! Scripted by agent id: each call to `chat`/`chat_stream` pops the next
//! [`ScriptedTurn`] queued for that id (or replays the last one once the
//! queue is drained, so a test can under-script a chatty loop).

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use hae_domain::error::Result;
use hae_domain::stream::{BoxStream, StreamEvent, Usage};
use hae_domain::tool::ToolCall;

use crate::traits::{ChatRequest, ChatResponse, LlmClient};

/// One scripted model turn: either plain text, or one-or-more tool calls.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    pub text: String,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    /// Simulated per-token latency, so tests can exercise mid-stream
    /// cancellation (spec.md §8 S3) without a real provider.
    pub token_delay: Option<std::time::Duration>,
}

impl ScriptedTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Like [`Self::text`], but the stream sleeps `delay` before each token
    /// chunk, simulating a slow provider for cancellation tests.
    pub fn slow_text(text: impl Into<String>, delay: std::time::Duration) -> Self {
        Self {
            text: text.into(),
            token_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool_calls: vec![ToolCall {
                call_id: format!("call_{}", name_hash(&arguments)),
                tool_name: name.into(),
                arguments,
            }],
            ..Default::default()
        }
    }

    /// A single turn requesting several tool calls at once, so a test can
    /// exercise a supervisor's `parallel` execution mode (spec.md §8 S4).
    pub fn tool_calls(calls: Vec<(impl Into<String>, serde_json::Value)>) -> Self {
        Self {
            tool_calls: calls
                .into_iter()
                .map(|(name, arguments)| ToolCall {
                    call_id: format!("call_{}", name_hash(&arguments)),
                    tool_name: name.into(),
                    arguments,
                })
                .collect(),
            ..Default::default()
        }
    }
}

fn name_hash(v: &serde_json::Value) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    v.to_string().hash(&mut hasher);
    hasher.finish()
}

/// A scriptable, in-process stand-in for a real provider. Tests key scripts
/// by `agent_id` (the stub has no notion of agents itself — callers pass the
/// id as the provider-request correlation key via [`StubLlmClient::for_agent`]).
pub struct StubLlmClient {
    id: String,
    scripts: Mutex<HashMap<String, VecDeque<ScriptedTurn>>>,
    /// Every request this stub has seen, keyed by the same correlation id,
    /// in call order — used by tests to assert on prompt contents (e.g.
    /// context-sharing's prepended header).
    requests: Mutex<HashMap<String, Vec<ChatRequest>>>,
}

impl Default for StubLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StubLlmClient {
    pub fn new() -> Self {
        Self {
            id: "stub".into(),
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Queue scripted turns for a given correlation key (conventionally the
    /// agent id). Calls for that key pop turns in order.
    pub fn script(&self, key: impl Into<String>, turns: Vec<ScriptedTurn>) {
        self.scripts
            .lock()
            .entry(key.into())
            .or_default()
            .extend(turns);
    }

    /// Requests recorded for `key`, in call order.
    pub fn requests_for(&self, key: &str) -> Vec<ChatRequest> {
        self.requests.lock().get(key).cloned().unwrap_or_default()
    }

    fn next_turn(&self, key: &str) -> ScriptedTurn {
        let mut scripts = self.scripts.lock();
        let queue = scripts.entry(key.to_string()).or_default();
        queue.pop_front().unwrap_or_else(|| ScriptedTurn::text(""))
    }

    fn record(&self, key: &str, req: &ChatRequest) {
        self.requests
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(req.clone());
    }

    /// Extract the correlation key a `ChatRequest` was scripted under. The
    /// engine's agents tag every request's `model` field with their agent id
    /// when no explicit model override is configured so the stub can find
    /// the right script without any other coupling to the engine.
    fn key_of(req: &ChatRequest) -> String {
        req.model.clone().unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for StubLlmClient {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let key = Self::key_of(req);
        self.record(&key, req);
        let turn = self.next_turn(&key);
        Ok(ChatResponse {
            content: turn.text,
            tool_calls: turn.tool_calls,
            usage: Some(Usage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            }),
            model: key,
            finish_reason: Some("stop".into()),
        })
    }

    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let key = Self::key_of(req);
        self.record(&key, req);
        let turn = self.next_turn(&key);

        let mut events = Vec::new();
        if let Some(reasoning) = turn.reasoning {
            if !reasoning.is_empty() {
                events.push(Ok(StreamEvent::Reasoning { text: reasoning }));
            }
        }
        for word in turn.text.split_inclusive(' ') {
            events.push(Ok(StreamEvent::Token {
                text: word.to_string(),
            }));
        }
        for call in &turn.tool_calls {
            events.push(Ok(StreamEvent::ToolCallStarted {
                call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
            }));
            events.push(Ok(StreamEvent::ToolCallFinished {
                call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                arguments: call.arguments.clone(),
            }));
        }
        events.push(Ok(StreamEvent::Done {
            usage: Some(Usage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            }),
            finish_reason: Some("stop".into()),
        }));

        match turn.token_delay {
            Some(delay) => {
                let stream = async_stream::stream! {
                    for event in events {
                        tokio::time::sleep(delay).await;
                        yield event;
                    }
                };
                Ok(Box::pin(stream))
            }
            None => Ok(Box::pin(futures_util::stream::iter(events))),
        }
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn chat_replays_scripted_text() {
        let stub = StubLlmClient::new();
        stub.script("global", vec![ScriptedTurn::text("hello there")]);
        let req = ChatRequest {
            model: Some("global".into()),
            ..Default::default()
        };
        let resp = stub.chat(&req).await.unwrap();
        assert_eq!(resp.content, "hello there");
    }

    #[tokio::test]
    async fn chat_replays_last_turn_once_queue_drained() {
        let stub = StubLlmClient::new();
        stub.script("w", vec![ScriptedTurn::text("only one")]);
        let req = ChatRequest {
            model: Some("w".into()),
            ..Default::default()
        };
        let _ = stub.chat(&req).await.unwrap();
        let second = stub.chat(&req).await.unwrap();
        assert_eq!(second.content, "");
    }

    #[tokio::test]
    async fn chat_stream_emits_tokens_then_done() {
        let stub = StubLlmClient::new();
        stub.script("w", vec![ScriptedTurn::text("hi there")]);
        let req = ChatRequest {
            model: Some("w".into()),
            ..Default::default()
        };
        let stream = stub.chat_stream(&req).await.unwrap();
        let events: Vec<_> = stream.collect().await;
        assert!(matches!(events.last().unwrap(), Ok(StreamEvent::Done { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, Ok(StreamEvent::Token { .. }))));
    }

    #[tokio::test]
    async fn chat_stream_emits_tool_call_events() {
        let stub = StubLlmClient::new();
        stub.script(
            "team",
            vec![ScriptedTurn::tool_call("W", serde_json::json!({"task": "x"}))],
        );
        let req = ChatRequest {
            model: Some("team".into()),
            ..Default::default()
        };
        let stream = stub.chat_stream(&req).await.unwrap();
        let events: Vec<_> = stream.collect().await;
        assert!(events
            .iter()
            .any(|e| matches!(e, Ok(StreamEvent::ToolCallStarted { .. }))));
        assert!(events
            .iter()
            .any(|e| matches!(e, Ok(StreamEvent::ToolCallFinished { .. }))));
    }

    #[tokio::test]
    async fn requests_are_recorded_for_assertions() {
        let stub = StubLlmClient::new();
        stub.script("w", vec![ScriptedTurn::text("ok")]);
        let req = ChatRequest {
            model: Some("w".into()),
            messages: vec![hae_domain::tool::Message::user("prompt body")],
            ..Default::default()
        };
        let _ = stub.chat(&req).await.unwrap();
        let recorded = stub.requests_for("w");
        assert_eq!(recorded.len(), 1);
        assert_eq!(
            recorded[0].messages[0].content.text(),
            Some("prompt body")
        );
    }
}
