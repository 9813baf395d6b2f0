// src/notify/teams.rs
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{ArticleNotice, Delivery, Notifier};
use crate::config::AiConfig;

/// Posts notices as MessageCards to Microsoft Teams incoming webhooks,
/// picking the webhook by the notice's team.
#[derive(Clone)]
pub struct TeamsNotifier {
    team_webhooks: BTreeMap<String, String>,
    default_webhook: Option<String>,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl TeamsNotifier {
    pub fn new(team_webhooks: BTreeMap<String, String>, default_webhook: Option<String>) -> Self {
        Self {
            team_webhooks,
            default_webhook,
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn from_config(cfg: &AiConfig) -> Self {
        Self::new(cfg.team_webhooks.clone(), cfg.default_webhook.clone())
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn webhook_for(&self, team: Option<&str>) -> Option<&str> {
        team.and_then(|t| self.team_webhooks.get(t))
            .or(self.default_webhook.as_ref())
            .map(String::as_str)
            .filter(|u| !u.trim().is_empty())
    }
}

#[derive(Serialize)]
struct MessageCard<'a> {
    #[serde(rename = "@type")]
    kind: &'static str,
    #[serde(rename = "@context")]
    context: &'static str,
    summary: &'a str,
    title: &'a str,
    text: String,
}

impl<'a> MessageCard<'a> {
    fn from_notice(n: &'a ArticleNotice) -> Self {
        let text = match &n.url {
            Some(url) => format!("{}\n\n[{url}]({url})", n.text),
            None => n.text.clone(),
        };
        Self {
            kind: "MessageCard",
            context: "https://schema.org/extensions",
            summary: &n.title,
            title: &n.title,
            text,
        }
    }
}

#[async_trait::async_trait]
impl Notifier for TeamsNotifier {
    async fn send(&self, notice: &ArticleNotice) -> Result<Delivery> {
        let Some(url) = self.webhook_for(notice.team.as_deref()) else {
            tracing::warn!(team = ?notice.team, "no Teams webhook configured");
            return Ok(Delivery::NoWebhook);
        };
        let card = MessageCard::from_notice(notice);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(url)
                .timeout(self.timeout)
                .json(&card)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status() {
                    Ok(_) => return Ok(Delivery::Sent),
                    Err(e) => anyhow!("Teams webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Teams webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(attempt, error = %err, "retrying Teams webhook");
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}
