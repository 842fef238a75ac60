pub mod runs;

use axum::routing::post;
use axum::Router;

use crate::state::AppState;

/// The HTTP surface of the run execution engine: six endpoints under
/// `/api/executor/v1/runs`, all `POST` (spec §6.1).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/executor/v1/runs/start", post(runs::start))
        .route("/api/executor/v1/runs/stream", post(runs::stream))
        .route("/api/executor/v1/runs/events", post(runs::events))
        .route("/api/executor/v1/runs/get", post(runs::get))
        .route("/api/executor/v1/runs/cancel", post(runs::cancel))
        .route("/api/executor/v1/runs/list", post(runs::list))
        .with_state(state)
}
