use std::sync::Arc;

use quorum_market_data::{ConsensusServiceTrait, SourceRegistry};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub struct AppState {
    pub consensus_service: Arc<dyn ConsensusServiceTrait>,
}

pub fn init_tracing() {
    let log_format = std::env::var("QUORUM_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Build the shared state with the real adapters and environment credentials.
pub fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let registry = config.feed.build_registry()?;
    build_state_with_registry(config, registry)
}

pub fn build_state_with_registry(
    config: &Config,
    registry: SourceRegistry,
) -> anyhow::Result<Arc<AppState>> {
    for (name, status) in registry.status() {
        tracing::info!(
            "Source {}: enabled={} weight={} priority={}",
            name,
            status.enabled,
            status.weight,
            status.priority
        );
    }
    if registry.enabled_count() == 0 {
        tracing::warn!("No source is enabled; every answer will be DEGRADED");
    }

    let service = config.feed.build_service_with_registry(registry)?;
    Ok(Arc::new(AppState {
        consensus_service: Arc::new(service),
    }))
}
