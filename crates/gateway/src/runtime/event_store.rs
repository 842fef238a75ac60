//! Durable event log (spec §6.3): one append-only stream per run, with a
//! bounded-memory and a JSONL-on-disk backend selectable via
//! `EventStoreConfig` (spec §1 lists the event log as an external
//! collaborator; these are the ambient default implementations).
//!
//! Message IDs are simply `sequence.to_string()` in decimal, so pagination
//! by message id and by sequence agree by construction (spec §6.3).

use std::collections::{HashMap, VecDeque};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write as _};
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::RwLock;

use hae_domain::error::{Error, Result};
use hae_domain::model::Event;

/// "-" means earliest available, "+" means latest. A literal decimal string
/// is parsed as a sequence number.
pub fn parse_range_bound(raw: &str, earliest: u64, latest: u64) -> Result<u64> {
    match raw {
        "-" => Ok(earliest),
        "+" => Ok(latest),
        _ => raw
            .parse::<u64>()
            .map_err(|_| Error::Other(format!("invalid event id: {raw}"))),
    }
}

pub trait EventStore: Send + Sync {
    /// Append an event to its run's durable log. Must preserve arrival order
    /// for a single run (sequence is already monotonic by construction).
    fn append(&self, event: &Event) -> Result<()>;

    /// Inclusive range scan over `[start, end]`, both decimal sequence
    /// strings or the `"-"`/`"+"` sentinels.
    fn range(&self, run_id: u64, start: &str, end: &str, limit: Option<usize>) -> Result<Vec<Event>>;

    /// Drop runs whose last event is older than `ttl_secs` (spec §4.9,
    /// `RunnerConfig.event_log_ttl_secs`).
    fn prune_expired(&self, ttl_secs: u64);
}

struct RunLog {
    events: VecDeque<Event>,
    base_seq: u64,
    last_write: chrono::DateTime<Utc>,
}

impl RunLog {
    fn new() -> Self {
        Self {
            events: VecDeque::new(),
            base_seq: 0,
            last_write: Utc::now(),
        }
    }

    fn idx(&self, sequence: u64) -> Option<usize> {
        if sequence < self.base_seq {
            return None;
        }
        let idx = (sequence - self.base_seq) as usize;
        if idx < self.events.len() {
            Some(idx)
        } else {
            None
        }
    }
}

/// Bounded in-memory ring per run. No persistence across process restarts.
pub struct MemoryEventStore {
    runs: RwLock<HashMap<u64, RunLog>>,
    cap_per_run: usize,
}

impl MemoryEventStore {
    pub fn new(cap_per_run: usize) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            cap_per_run,
        }
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl EventStore for MemoryEventStore {
    fn append(&self, event: &Event) -> Result<()> {
        let mut runs = self.runs.write();
        let log = runs.entry(event.run_id).or_insert_with(RunLog::new);
        if log.events.is_empty() {
            log.base_seq = event.sequence;
        }
        log.events.push_back(event.clone());
        log.last_write = Utc::now();
        while log.events.len() > self.cap_per_run {
            log.events.pop_front();
            log.base_seq += 1;
        }
        Ok(())
    }

    fn range(&self, run_id: u64, start: &str, end: &str, limit: Option<usize>) -> Result<Vec<Event>> {
        let runs = self.runs.read();
        let Some(log) = runs.get(&run_id) else {
            return Ok(Vec::new());
        };
        if log.events.is_empty() {
            return Ok(Vec::new());
        }
        let earliest = log.base_seq;
        let latest = log.base_seq + log.events.len() as u64 - 1;
        let start_seq = parse_range_bound(start, earliest, latest)?;
        let end_seq = parse_range_bound(end, earliest, latest)?;

        let mut out = Vec::new();
        for seq in start_seq..=end_seq {
            if let Some(idx) = log.idx(seq) {
                out.push(log.events[idx].clone());
            }
            if let Some(limit) = limit {
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    fn prune_expired(&self, ttl_secs: u64) {
        let mut runs = self.runs.write();
        let now = Utc::now();
        runs.retain(|_, log| (now - log.last_write).num_seconds() < ttl_secs as i64);
    }
}

/// One append-only JSONL file per run under `dir`.
pub struct FileEventStore {
    dir: PathBuf,
}

impl FileEventStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, run_id: u64) -> PathBuf {
        self.dir.join(format!("{run_id}.jsonl"))
    }

    fn read_all(&self, run_id: u64) -> Result<Vec<Event>> {
        let path = self.path_for(run_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }
}

impl EventStore for FileEventStore {
    fn append(&self, event: &Event) -> Result<()> {
        let path = self.path_for(event.run_id);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn range(&self, run_id: u64, start: &str, end: &str, limit: Option<usize>) -> Result<Vec<Event>> {
        let events = self.read_all(run_id)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let earliest = events.first().unwrap().sequence;
        let latest = events.last().unwrap().sequence;
        let start_seq = parse_range_bound(start, earliest, latest)?;
        let end_seq = parse_range_bound(end, earliest, latest)?;

        let mut out: Vec<Event> = events
            .into_iter()
            .filter(|e| e.sequence >= start_seq && e.sequence <= end_seq)
            .collect();
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    fn prune_expired(&self, ttl_secs: u64) {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        let now = std::time::SystemTime::now();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    if let Ok(age) = now.duration_since(modified) {
                        if age.as_secs() > ttl_secs {
                            let _ = std::fs::remove_file(&path);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hae_domain::model::{EventAction, EventKind, Source};

    fn event(run_id: u64, sequence: u64) -> Event {
        Event {
            run_id,
            sequence,
            timestamp: Utc::now(),
            source: Source::system(),
            event: EventKind::from(EventAction::Started),
            data: serde_json::json!({}),
        }
    }

    #[test]
    fn memory_store_appends_and_ranges() {
        let store = MemoryEventStore::new(100);
        for seq in 1..=5 {
            store.append(&event(1, seq)).unwrap();
        }
        let all = store.range(1, "-", "+", None).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].sequence, 1);
        assert_eq!(all[4].sequence, 5);
    }

    #[test]
    fn memory_store_bounds_are_inclusive() {
        let store = MemoryEventStore::new(100);
        for seq in 1..=5 {
            store.append(&event(1, seq)).unwrap();
        }
        let mid = store.range(1, "2", "4", None).unwrap();
        assert_eq!(mid.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn memory_store_evicts_oldest_beyond_capacity() {
        let store = MemoryEventStore::new(3);
        for seq in 1..=5 {
            store.append(&event(1, seq)).unwrap();
        }
        let all = store.range(1, "-", "+", None).unwrap();
        assert_eq!(all.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn memory_store_unknown_run_returns_empty() {
        let store = MemoryEventStore::new(100);
        assert!(store.range(999, "-", "+", None).unwrap().is_empty());
    }

    #[test]
    fn memory_store_respects_limit() {
        let store = MemoryEventStore::new(100);
        for seq in 1..=5 {
            store.append(&event(1, seq)).unwrap();
        }
        let limited = store.range(1, "-", "+", Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileEventStore::new(dir.path().to_path_buf()).unwrap();
            for seq in 1..=3 {
                store.append(&event(7, seq)).unwrap();
            }
        }
        let reopened = FileEventStore::new(dir.path().to_path_buf()).unwrap();
        let events = reopened.range(7, "-", "+", None).unwrap();
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn file_store_separates_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path().to_path_buf()).unwrap();
        store.append(&event(1, 1)).unwrap();
        store.append(&event(2, 1)).unwrap();
        assert_eq!(store.range(1, "-", "+", None).unwrap().len(), 1);
        assert_eq!(store.range(2, "-", "+", None).unwrap().len(), 1);
    }

    #[test]
    fn parse_range_bound_sentinels() {
        assert_eq!(parse_range_bound("-", 5, 20).unwrap(), 5);
        assert_eq!(parse_range_bound("+", 5, 20).unwrap(), 20);
        assert_eq!(parse_range_bound("12", 5, 20).unwrap(), 12);
        assert!(parse_range_bound("nope", 5, 20).is_err());
    }
}
