// src/notify/mod.rs
pub mod teams;

pub use teams::TeamsNotifier;

/// One processed article, ready to be posted to a team channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleNotice {
    pub team: Option<String>,
    pub title: String,
    pub text: String,
    pub url: Option<String>,
}

/// What happened to a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No webhook is configured for the notice's team.
    NoWebhook,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notice: &ArticleNotice) -> anyhow::Result<Delivery>;
}
