// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

const ENV_API_KEY: &str = "OPENROUTER_API_KEY";

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}
fn default_interval_secs() -> u64 {
    60
}
fn default_request_timeout_secs() -> u64 {
    60
}

/// `[ai]` section: the OpenRouter summarization job and where its results go.
///
/// Whether the job actually runs is decided at runtime by the `openrouter`
/// job config (see `/api/job-config`); this only wires the collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// "ENV" (or empty) means: read from OPENROUTER_API_KEY.
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Only process articles of this team's sources.
    pub team: Option<String>,
    /// Teams incoming-webhook URL per team code.
    pub team_webhooks: BTreeMap<String, String>,
    /// Used for articles whose source has no team, or a team without its own entry.
    pub default_webhook: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: "ENV".to_string(),
            base_url: default_base_url(),
            model: default_model(),
            interval_secs: default_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            team: None,
            team_webhooks: BTreeMap::new(),
            default_webhook: None,
        }
    }
}

impl AiConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The configured key, or `$OPENROUTER_API_KEY` when set to "ENV".
    pub fn resolved_api_key(&self) -> Option<String> {
        let key = self.api_key.trim();
        let key = if key.is_empty() || key.eq_ignore_ascii_case("env") {
            env::var(ENV_API_KEY).ok()?
        } else {
            key.to_string()
        };
        let key = key.trim().to_string();
        (!key.is_empty()).then_some(key)
    }

    pub(crate) fn sanitized(mut self) -> Self {
        if self.base_url.trim().is_empty() {
            self.base_url = default_base_url();
        }
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        if self.model.trim().is_empty() {
            self.model = default_model();
        }
        if self.interval_secs == 0 {
            self.interval_secs = default_interval_secs();
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        self.team = self
            .team
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }
}
