use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use hae_gateway::cli::{self, Cli, Command, ConfigCommand, LogFormat};
use hae_gateway::{api, bootstrap};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        None | Some(Command::Serve) => {
            let (config, _path) = cli::load_config()?;
            serve(Arc::new(config)).await
        }
        Some(Command::Run { hierarchy_id, task, json }) => {
            let (config, _path) = cli::load_config()?;
            cli::run::run(Arc::new(config), hierarchy_id, task, json).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _path) = cli::load_config()?;
            cli::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("hae {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

async fn serve(config: Arc<hae_domain::config::Config>) -> anyhow::Result<()> {
    tracing::info!("hae starting");

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = bootstrap::build_app_state(config)
        .await
        .context("building application state")?;

    let cors = CorsLayer::permissive();
    let app = api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {bind_addr}"))?;

    tracing::info!(addr = %bind_addr, "hae listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}
