//! Cross-team prompt sharing (spec §4.7): a small per-run append-only list
//! of `(team_name, result_text)`, serialized behind the run's mutex.

use parking_lot::Mutex;

const HEADER: &str = "=== Prior team results ===";

/// Accumulates team results for a run so later teams can observe earlier
/// teams' outputs when `enable_context_sharing` or `share_context` is set.
#[derive(Default)]
pub struct ContextAccumulator {
    entries: Mutex<Vec<(String, String)>>,
}

impl ContextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a team's result once it completes.
    pub fn record(&self, team_name: &str, result: &str) {
        self.entries
            .lock()
            .push((team_name.to_string(), result.to_string()));
    }

    /// Whether any prior team has recorded a result yet.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Render accumulated results under a delimited header, for prepending
    /// to a team's user prompt.
    pub fn render(&self) -> Option<String> {
        let entries = self.entries.lock();
        if entries.is_empty() {
            return None;
        }
        let mut out = String::from(HEADER);
        out.push('\n');
        for (team_name, result) in entries.iter() {
            out.push_str(&format!("[{team_name}]\n{result}\n"));
        }
        Some(out)
    }

    /// Prepend prior results to `prompt` if any have been recorded, else
    /// return `prompt` unchanged.
    pub fn prime(&self, prompt: &str) -> String {
        match self.render() {
            Some(prefix) => format!("{prefix}\n{prompt}"),
            None => prompt.to_string(),
        }
    }
}
