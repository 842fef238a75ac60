use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The durable event-log backend the core's `EventStore` collaborator writes
/// through (spec §1 lists this as an external collaborator; this is the
/// ambient default implementation's configuration).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum EventStoreBackend {
    /// Bounded in-memory ring, no persistence across process restarts.
    Memory,
    /// One append-only JSONL file per run under `dir`.
    File { dir: PathBuf },
}

impl Default for EventStoreBackend {
    fn default() -> Self {
        EventStoreBackend::Memory
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventStoreConfig {
    #[serde(flatten)]
    pub backend: EventStoreBackend,
}
