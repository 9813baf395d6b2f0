// src/analyze/openrouter.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Summarizer;
use crate::config::AiConfig;
use crate::error::AiError;
use crate::model::Article;

/// Prefix every OpenRouter key carries.
const KEY_PREFIX: &str = "sk-or-";
/// Characters of the article body sent to the model.
const MAX_INPUT_CHARS: usize = 6_000;

/// OpenRouter chat-completions client.
pub struct OpenRouterClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    /// Rejects keys that cannot be OpenRouter keys before any request is made.
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, AiError> {
        let api_key = api_key.into();
        if !api_key.starts_with(KEY_PREFIX) {
            return Err(AiError::InvalidApiKey);
        }
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    /// `None` when no key is configured.
    pub fn from_config(cfg: &AiConfig, user_agent: &str) -> Result<Option<Self>, AiError> {
        let Some(key) = cfg.resolved_api_key() else {
            return Ok(None);
        };
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(cfg.request_timeout())
            .build()
            .map_err(|e| AiError::Transport(e.to_string()))?;
        Self::new(http, cfg.base_url.as_str(), key, cfg.model.as_str()).map(Some)
    }
}

fn system_prompt(ai_type: Option<&str>) -> String {
    let audience = match ai_type {
        Some("dev") => "software developers",
        Some("ba") => "business analysts",
        Some("system") => "system administrators and infrastructure engineers",
        Some(other) => other,
        None => "a general technical audience",
    };
    format!(
        "You summarize news articles for {audience}. Write a short digest (at most five \
         sentences) covering what happened and why it matters to them. Plain text, no \
         greetings, no emojis."
    )
}

fn user_prompt(article: &Article) -> String {
    let body: String = article.summary.chars().take(MAX_INPUT_CHARS).collect();
    format!(
        "Title: {}\nURL: {}\n\n{}",
        article.title,
        article.url.as_deref().unwrap_or("-"),
        body
    )
}

#[async_trait]
impl Summarizer for OpenRouterClient {
    async fn summarize(&self, article: &Article, ai_type: Option<&str>) -> Result<String, AiError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: Option<String>,
        }

        let sys = system_prompt(ai_type);
        let input = user_prompt(article);
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &sys,
                },
                Msg {
                    role: "user",
                    content: &input,
                },
            ],
            temperature: 0.3,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| AiError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AiError::Status(status.as_u16()));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| AiError::Transport(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AiError::EmptyResponse)
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_without_prefix_are_rejected() {
        let err = OpenRouterClient::new(Client::new(), "https://x", "sk-abc", "m").err();
        assert_eq!(err, Some(AiError::InvalidApiKey));
        assert!(OpenRouterClient::new(Client::new(), "https://x/", "sk-or-v1-abc", "m").is_ok());
    }

    #[test]
    fn prompt_names_the_audience() {
        assert!(system_prompt(Some("ba")).contains("business analysts"));
        assert!(system_prompt(Some("marketing")).contains("marketing"));
        assert!(system_prompt(None).contains("general"));
    }
}
