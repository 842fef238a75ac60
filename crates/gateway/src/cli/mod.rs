pub mod run;

use clap::{Parser, Subcommand};

/// hae — a hierarchical LLM agent run execution engine.
#[derive(Debug, Parser)]
#[command(name = "hae", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Tracing output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP/SSE gateway server (default when no subcommand is given).
    Serve,
    /// Start a single run against a configured hierarchy and print its result.
    Run {
        /// `hierarchy_id` from the loaded configuration.
        hierarchy_id: String,
        /// The task handed to the global supervisor.
        task: String,
        /// Print the full settled `Run` record as JSON instead of just the result text.
        #[arg(long)]
        json: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any validation issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the configuration from the path named by `HAE_CONFIG` (or
/// `config.toml` by default). Shared by `serve`, `run`, and `config`.
pub fn load_config() -> anyhow::Result<(hae_domain::config::Config, String)> {
    let config_path = std::env::var("HAE_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        hae_domain::config::Config::default()
    };

    Ok((config, config_path))
}

pub fn validate(config: &hae_domain::config::Config, config_path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("{config_path}: OK, no issues found");
        return true;
    }
    for issue in &issues {
        println!("{issue}");
    }
    !issues
        .iter()
        .any(|i| i.severity == hae_domain::config::ConfigSeverity::Error)
}

pub fn show(config: &hae_domain::config::Config) {
    match toml::to_string_pretty(config) {
        Ok(toml) => println!("{toml}"),
        Err(e) => eprintln!("failed to serialize config: {e}"),
    }
}
