//! `AppState` construction, shared by the `serve` and `run` CLI commands so
//! both can boot the full runtime without duplicating the wiring.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;

use hae_domain::config::{Config, ConfigSeverity, EventStoreBackend, LlmProvider};
use hae_domain::error::{Error, Result as DomainResult};
use hae_domain::model::HierarchyConfig;

use hae_providers::anthropic::AnthropicClient;
use hae_providers::openai_compat::OpenAiCompatClient;
use hae_providers::traits::LlmClient;

use crate::runtime::event_store::{EventStore, FileEventStore, MemoryEventStore};
use crate::runtime::run_manager::{HierarchyResolver, RunManager};
use crate::runtime::tool_provider::{NullToolProvider, ToolProvider};
use crate::state::AppState;

/// Resolves `hierarchy_id` against the hierarchies declared in `config.toml`.
///
/// This is the ambient default implementation of the "persistent
/// configuration store" collaborator (spec §1); a deployment that needs
/// hot-reloadable or externally-managed hierarchies would swap this for a
/// different `HierarchyResolver`, not change anything in `RunManager`.
struct StaticHierarchyResolver {
    hierarchies: HashMap<String, HierarchyConfig>,
}

#[async_trait::async_trait]
impl HierarchyResolver for StaticHierarchyResolver {
    async fn resolve(&self, hierarchy_id: &str) -> DomainResult<HierarchyConfig> {
        self.hierarchies
            .get(hierarchy_id)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown hierarchy_id \"{hierarchy_id}\"")))
    }
}

fn build_llm_client(config: &Config) -> anyhow::Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match &config.llm.provider {
        LlmProvider::OpenAiCompat { base_url } => {
            Arc::new(OpenAiCompatClient::from_llm_config(&config.llm, base_url.clone())?)
        }
        LlmProvider::Anthropic => Arc::new(AnthropicClient::from_llm_config(&config.llm)?),
    };
    Ok(client)
}

fn build_event_store(config: &Config) -> anyhow::Result<Arc<dyn EventStore>> {
    let store: Arc<dyn EventStore> = match &config.event_store.backend {
        EventStoreBackend::Memory => Arc::new(MemoryEventStore::default()),
        EventStoreBackend::File { dir } => Arc::new(
            FileEventStore::new(dir.clone()).context("initializing file event store")?,
        ),
    };
    Ok(store)
}

/// Build the full `AppState`: config validation, the LLM client, the event
/// store backend, the hierarchy resolver, and the `RunManager` itself.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let llm = build_llm_client(&config).context("initializing LLM client")?;
    tracing::info!(provider = llm.provider_id(), "LLM client ready");

    let event_store = build_event_store(&config).context("initializing event store")?;

    let tools: Arc<dyn ToolProvider> = Arc::new(NullToolProvider);

    let resolver = Arc::new(StaticHierarchyResolver {
        hierarchies: config.hierarchies.clone(),
    });
    tracing::info!(count = config.hierarchies.len(), "hierarchies loaded");

    let run_manager = Arc::new(RunManager::new(
        resolver,
        llm,
        tools,
        event_store,
        config.runner.pool_size,
        config.runner.subscriber_buffer,
    ));

    Ok(AppState {
        config,
        run_manager,
    })
}
