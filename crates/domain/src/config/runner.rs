use serde::{Deserialize, Serialize};

/// Tunables for `RunManager` and the per-run `EventBus` (spec §6.4, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Size of the bounded worker pool `RunManager::start` submits onto.
    #[serde(default = "d_pool_size")]
    pub pool_size: usize,
    /// Per-subscriber live-event buffer capacity (drop-oldest beyond this).
    #[serde(default = "d_subscriber_buffer")]
    pub subscriber_buffer: usize,
    /// TTL applied to a run's durable event-log stream once it settles.
    #[serde(default = "d_event_log_ttl_secs")]
    pub event_log_ttl_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            pool_size: d_pool_size(),
            subscriber_buffer: d_subscriber_buffer(),
            event_log_ttl_secs: d_event_log_ttl_secs(),
        }
    }
}

fn d_pool_size() -> usize {
    10
}
fn d_subscriber_buffer() -> usize {
    1024
}
fn d_event_log_ttl_secs() -> u64 {
    86_400
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.pool_size, 10);
        assert_eq!(cfg.subscriber_buffer, 1024);
        assert_eq!(cfg.event_log_ttl_secs, 86_400);
    }
}
