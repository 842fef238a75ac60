//! Translates LLM SDK stream frames into typed `Event` records bound to a
//! fixed `Source` (spec §4.6).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use hae_domain::model::{EventAction, Source};
use hae_domain::stream::StreamEvent;

use super::event_bus::EventBus;

/// Bound at construction to one agent's `Source` and the run's `EventBus`;
/// every frame it handles is emitted through that pairing.
pub struct LlmCallbackHandler {
    source: Source,
    bus: Arc<EventBus>,
    last_tool_name: Mutex<Option<String>>,
    tool_call_counter: AtomicU64,
}

impl LlmCallbackHandler {
    pub fn new(source: Source, bus: Arc<EventBus>) -> Self {
        Self {
            source,
            bus,
            last_tool_name: Mutex::new(None),
            tool_call_counter: AtomicU64::new(0),
        }
    }

    /// Handle one frame from the LLM stream, publishing zero or one event.
    pub fn handle(&self, frame: &StreamEvent) {
        match frame {
            StreamEvent::Reasoning { text } => {
                if !text.is_empty() {
                    self.bus.publish(
                        self.source.clone(),
                        EventAction::Reasoning,
                        serde_json::json!({ "text": text }),
                    );
                }
            }
            StreamEvent::Token { text } => {
                if !text.is_empty() {
                    self.bus.publish(
                        self.source.clone(),
                        EventAction::Stream,
                        serde_json::json!({ "text": text }),
                    );
                }
            }
            StreamEvent::ToolCallStarted { call_id, tool_name } => {
                let mut last = self.last_tool_name.lock();
                if last.as_deref() != Some(tool_name.as_str()) {
                    let index = self.tool_call_counter.fetch_add(1, Ordering::Relaxed);
                    *last = Some(tool_name.clone());
                    drop(last);
                    self.bus.publish(
                        self.source.clone(),
                        EventAction::ToolCall,
                        serde_json::json!({
                            "call_id": call_id,
                            "tool_name": tool_name,
                            "index": index,
                        }),
                    );
                }
            }
            // Argument deltas accumulate client-side; only a new tool name
            // triggers a wire event (spec §4.6).
            StreamEvent::ToolCallDelta { .. } => {}
            StreamEvent::ToolCallFinished { .. } => {}
            StreamEvent::Done { .. } => {
                *self.last_tool_name.lock() = None;
            }
            StreamEvent::Error { message } => {
                self.bus.publish(
                    self.source.clone(),
                    EventAction::Error,
                    serde_json::json!({ "message": message }),
                );
            }
        }
    }

    /// Explicit result event, emitted by the agent once a tool call's
    /// outcome is known (spec §4.5 "tool results become `llm.tool_result`").
    pub fn tool_result(&self, call_id: &str, tool_name: &str, result: &str) {
        self.bus.publish(
            self.source.clone(),
            EventAction::ToolResult,
            serde_json::json!({
                "call_id": call_id,
                "tool_name": tool_name,
                "result": result,
            }),
        );
    }

    pub fn source(&self) -> &Source {
        &self.source
    }
}
