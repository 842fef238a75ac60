/// Shared error type for the run execution engine and its collaborators.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    /// A dispatch was blocked by `CallTracker.prevent_duplicate`.
    #[error("duplicate dispatch blocked: team={team_name} worker={worker_name:?}")]
    DuplicateDispatch {
        team_name: String,
        worker_name: Option<String>,
    },

    /// Observed at a safe point after `CancelRegistry::signal`.
    #[error("run cancelled")]
    Cancelled,

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// `EventStore::append` failed. Never propagated out of `EventBus::publish`;
    /// only logged and turned into a `system.error` event.
    #[error("event sink: {0}")]
    Sink(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
