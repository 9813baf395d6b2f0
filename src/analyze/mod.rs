// src/analyze/mod.rs
//! AI post-processing of collected articles: a [`Summarizer`] writes a digest
//! for the article's team and the [`job::AiJob`] hands it to a notifier.

pub mod job;
pub mod openrouter;

use async_trait::async_trait;

use crate::error::AiError;
use crate::model::Article;

pub use job::{AiJob, AiRunReport};
pub use openrouter::OpenRouterClient;

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Digest of `article` written for `ai_type` (a team code).
    async fn summarize(&self, article: &Article, ai_type: Option<&str>) -> Result<String, AiError>;

    fn name(&self) -> &'static str;
}
