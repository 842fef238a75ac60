//! The six `POST /api/executor/v1/runs/*` handlers (spec §6.1/§6.2).

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use async_stream::stream;
use serde::{Deserialize, Serialize};

use hae_domain::model::{Run, RunStatus};

use crate::state::AppState;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// start
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct StartRequest {
    pub hierarchy_id: String,
    pub task: String,
}

#[derive(Serialize)]
pub struct StartResponse {
    pub id: u64,
    pub hierarchy_id: String,
    pub task: String,
    pub status: RunStatus,
    pub stream_url: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub async fn start(State(state): State<AppState>, Json(req): Json<StartRequest>) -> Response {
    match state.run_manager.start(&req.hierarchy_id, &req.task).await {
        Ok(run) => {
            let run = run.read();
            let body = StartResponse {
                id: run.run_id,
                hierarchy_id: run.hierarchy_id.clone(),
                task: run.task.clone(),
                status: run.status,
                stream_url: format!("/api/executor/v1/runs/stream?run_id={}", run.run_id),
                created_at: run.created_at,
            };
            Json(body).into_response()
        }
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct StreamRequest {
    pub id: u64,
}

pub async fn stream(
    State(state): State<AppState>,
    Json(req): Json<StreamRequest>,
) -> Response {
    let Some(bus) = state.run_manager.event_buses().get(req.id) else {
        return error_response(StatusCode::NOT_FOUND, format!("run {} has no live stream", req.id));
    };

    let handle = bus.subscribe();
    let body = stream! {
        loop {
            match handle.recv().await {
                Some(event) => {
                    let name = event.event.action.wire_name();
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok::<_, Infallible>(SseEvent::default().event(name).data(data));
                    if matches!(event.event.action, hae_domain::model::EventAction::Close) {
                        break;
                    }
                }
                None => break,
            }
        }
    };

    Sse::new(body)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("heartbeat"))
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// events (durable replay)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const MAX_EVENTS_LIMIT: usize = 10_000;

#[derive(Deserialize)]
pub struct EventsRequest {
    pub id: u64,
    #[serde(default)]
    pub start_id: Option<String>,
    #[serde(default)]
    pub end_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub run_id: u64,
    pub events: Vec<hae_domain::model::Event>,
    pub count: usize,
    pub has_more: bool,
    pub next_id: Option<u64>,
}

pub async fn events(State(state): State<AppState>, Json(req): Json<EventsRequest>) -> Response {
    let start = req.start_id.as_deref().unwrap_or("-");
    let end = req.end_id.as_deref().unwrap_or("+");
    let limit = req.limit.unwrap_or(MAX_EVENTS_LIMIT).min(MAX_EVENTS_LIMIT);

    // Ask for one extra to learn whether more events remain past `limit`.
    match state
        .run_manager
        .event_store()
        .range(req.id, start, end, Some(limit + 1))
    {
        Ok(mut found) => {
            let has_more = found.len() > limit;
            if has_more {
                found.truncate(limit);
            }
            let next_id = found.last().map(|e| e.sequence);
            Json(EventsResponse {
                run_id: req.id,
                count: found.len(),
                events: found,
                has_more,
                next_id,
            })
            .into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// get
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct GetRequest {
    pub id: u64,
}

pub async fn get(State(state): State<AppState>, Json(req): Json<GetRequest>) -> Response {
    match state.run_manager.get(req.id) {
        Some(run) => Json(run.read().clone()).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("unknown run_id {}", req.id)),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// cancel
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct CancelRequest {
    pub id: u64,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub run_id: u64,
    pub cancelled: bool,
}

pub async fn cancel(State(state): State<AppState>, Json(req): Json<CancelRequest>) -> Response {
    let cancelled = state.run_manager.cancel(req.id);
    if !cancelled && state.run_manager.get(req.id).is_none() {
        return error_response(StatusCode::NOT_FOUND, format!("unknown run_id {}", req.id));
    }
    Json(CancelResponse { run_id: req.id, cancelled }).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// list
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize, Default)]
pub struct ListRequest {
    #[serde(default)]
    pub status: Option<RunStatus>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub runs: Vec<Run>,
}

pub async fn list(State(state): State<AppState>, Json(filter): Json<ListRequest>) -> Response {
    let mut runs: Vec<Run> = state
        .run_manager
        .all()
        .into_iter()
        .filter_map(|id| state.run_manager.get(id))
        .map(|r| r.read().clone())
        .collect();

    if let Some(status) = filter.status {
        runs.retain(|r| r.status == status);
    }
    runs.sort_by_key(|r| r.run_id);

    Json(ListResponse { runs }).into_response()
}
