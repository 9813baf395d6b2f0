// src/config/collector.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::AiConfig;
use crate::ingest::providers::agent::DEFAULT_AGENT_ENDPOINT;

const ENV_PATH: &str = "COLLECTOR_CONFIG_PATH";
const ENV_STORE_PATH: &str = "COLLECTOR_STORE_PATH";

fn default_max_in_flight() -> usize {
    10
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_run_budget_secs() -> u64 {
    300
}
fn default_schedule_interval_secs() -> u64 {
    300
}
fn default_user_agent() -> String {
    concat!("news-collector/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_agent_endpoint() -> String {
    DEFAULT_AGENT_ENDPOINT.to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from("data/collector.json")
}

/// Runtime knobs for the collector, its HTTP client and the periodic job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Upper bound on sources fetched at the same time.
    pub max_in_flight: usize,
    pub fetch_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Whole-run budget; `0` disables it.
    pub run_budget_secs: u64,
    pub schedule_interval_secs: u64,
    pub user_agent: String,
    pub agent_endpoint: String,
    pub store_path: PathBuf,
    /// Restrict scheduled runs to one team's sources.
    pub team: Option<String>,
    pub ai: AiConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            run_budget_secs: default_run_budget_secs(),
            schedule_interval_secs: default_schedule_interval_secs(),
            user_agent: default_user_agent(),
            agent_endpoint: default_agent_endpoint(),
            store_path: default_store_path(),
            team: None,
            ai: AiConfig::default(),
        }
    }
}

impl CollectorConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn run_budget(&self) -> Option<Duration> {
        (self.run_budget_secs > 0).then(|| Duration::from_secs(self.run_budget_secs))
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs)
    }

    /// Load from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading collector config from {}", path.display()))?;
        let cfg: CollectorConfig = toml::from_str(&content)
            .with_context(|| format!("parsing collector config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks:
    /// 1) $COLLECTOR_CONFIG_PATH
    /// 2) config/collector.toml
    /// 3) built-in defaults
    ///
    /// `$COLLECTOR_STORE_PATH` overrides `store_path` in every case.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let fallback = PathBuf::from("config/collector.toml");
            if fallback.exists() {
                Self::load_from(&fallback)?
            } else {
                Self::default()
            }
        };

        if let Ok(store) = std::env::var(ENV_STORE_PATH) {
            if !store.trim().is_empty() {
                cfg.store_path = PathBuf::from(store.trim());
            }
        }
        Ok(cfg)
    }

    fn sanitized(mut self) -> Self {
        if self.max_in_flight == 0 {
            self.max_in_flight = 1;
        }
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = default_fetch_timeout_secs();
        }
        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > self.fetch_timeout_secs {
            self.connect_timeout_secs = self.fetch_timeout_secs.min(default_connect_timeout_secs());
        }
        if self.schedule_interval_secs == 0 {
            self.schedule_interval_secs = default_schedule_interval_secs();
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = default_user_agent();
        }
        if self.agent_endpoint.trim().is_empty() {
            self.agent_endpoint = default_agent_endpoint();
        }
        self.team = self
            .team
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self.ai = self.ai.sanitized();
        self
    }
}
