use std::net::SocketAddr;

use anyhow::Context;
use quorum_market_data::FeedConfig;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Process configuration for the server binary.
#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub feed: FeedConfig,
}

impl Config {
    /// `QUORUM_LISTEN_ADDR`, an optional JSON file at `QUORUM_CONFIG`, then
    /// the feed's `QUORUM_*` overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = std::env::var("QUORUM_LISTEN_ADDR")
            .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr: SocketAddr = listen_addr
            .parse()
            .with_context(|| format!("QUORUM_LISTEN_ADDR={:?} is not a socket address", listen_addr))?;

        let feed = match std::env::var("QUORUM_CONFIG") {
            Ok(path) if !path.trim().is_empty() => FeedConfig::load(path.trim())?,
            _ => FeedConfig::default(),
        };
        let feed = feed.with_env_overrides()?;

        Ok(Self { listen_addr, feed })
    }
}
