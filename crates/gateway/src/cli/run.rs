//! `hae run` — one-shot execution command.
//!
//! Starts a single run against a configured hierarchy, waits for it to
//! settle, and prints the result. Useful for scripting and smoke-testing a
//! hierarchy config without standing up the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use hae_domain::config::Config;
use hae_domain::model::RunStatus;

use crate::bootstrap;

pub async fn run(config: Arc<Config>, hierarchy_id: String, task: String, json: bool) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config).await?;

    let handle = state.run_manager.start(&hierarchy_id, &task).await?;
    let run_id = handle.read().run_id;
    tracing::info!(run_id, hierarchy_id = %hierarchy_id, "run started");

    loop {
        if handle.read().status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let run = handle.read().clone();

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        match run.status {
            RunStatus::Completed => println!("{}", run.result.unwrap_or_default()),
            RunStatus::Failed => {
                eprintln!("run failed: {}", run.error.unwrap_or_default());
                std::process::exit(1);
            }
            RunStatus::Cancelled => {
                eprintln!("run cancelled");
                std::process::exit(1);
            }
            RunStatus::Pending | RunStatus::Running => unreachable!("loop only exits on terminal status"),
        }
    }

    Ok(())
}
