// src/analyze/job.rs
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use super::Summarizer;
use crate::error::StoreError;
use crate::model::{Article, ArticleId, JobConfig, OPENROUTER_JOB};
use crate::notify::{ArticleNotice, Delivery, Notifier};
use crate::store::{JobStore, Store};

/// Outcome of one tick of the AI job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AiRunReport {
    /// False when the `openrouter` job config is missing or switched off.
    pub enabled: bool,
    pub processed: Vec<ArticleId>,
    pub notified: usize,
    pub without_webhook: usize,
    /// Summarizer or notifier failure; the article stays queued.
    pub error: Option<String>,
}

/// Summarizes the oldest unprocessed articles, posts each digest to its
/// team and marks the article processed. At most `limit` articles per tick.
pub struct AiJob {
    store: Arc<dyn Store>,
    jobs: Arc<dyn JobStore>,
    summarizer: Arc<dyn Summarizer>,
    notifier: Arc<dyn Notifier>,
    team: Option<String>,
}

impl AiJob {
    pub fn new(
        store: Arc<dyn Store>,
        jobs: Arc<dyn JobStore>,
        summarizer: Arc<dyn Summarizer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            jobs,
            summarizer,
            notifier,
            team: None,
        }
    }

    /// Only pick articles from this team's sources.
    pub fn with_team(mut self, team: Option<String>) -> Self {
        self.team = team;
        self
    }

    pub async fn run_once(&self) -> Result<AiRunReport, StoreError> {
        let Some(mut cfg) = self
            .jobs
            .job_config(OPENROUTER_JOB)
            .await?
            .filter(|c| c.enabled)
        else {
            tracing::debug!(target: "ai_job", "openrouter job is disabled");
            return Ok(AiRunReport::default());
        };

        let mut report = AiRunReport {
            enabled: true,
            ..AiRunReport::default()
        };
        for _ in 0..cfg.limit.max(1) {
            let Some(article) = self.jobs.next_unprocessed(self.team.as_deref()).await? else {
                tracing::debug!(target: "ai_job", team = ?self.team, "no article to process");
                break;
            };
            let t0 = Instant::now();
            let outcome = self.process(&article, &cfg).await;
            histogram!("collector_ai_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            match outcome? {
                Ok((ai_type, delivery)) => {
                    counter!("collector_ai_articles_total", "status" => "processed").increment(1);
                    match delivery {
                        Delivery::Sent => report.notified += 1,
                        Delivery::NoWebhook => report.without_webhook += 1,
                    }
                    tracing::info!(
                        target: "ai_job",
                        article_id = article.id,
                        ai_type = %ai_type,
                        summarizer = self.summarizer.name(),
                        "article processed"
                    );
                    report.processed.push(article.id);
                    cfg.last_type_sent = Some(ai_type);
                }
                Err(e) => {
                    counter!("collector_ai_articles_total", "status" => "failed").increment(1);
                    tracing::warn!(target: "ai_job", article_id = article.id, error = %e, "article left unprocessed");
                    report.error = Some(e);
                    break;
                }
            }
        }
        Ok(report)
    }

    /// Outer error: the store failed. Inner error: summarizer or notifier
    /// failed and nothing was written.
    async fn process(
        &self,
        article: &Article,
        cfg: &JobConfig,
    ) -> Result<Result<(String, Delivery), String>, StoreError> {
        let team = match self.store.get_source(article.source_id).await {
            Ok(source) => source.team,
            Err(StoreError::SourceNotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let ai_type = team.unwrap_or_else(|| cfg.next_round_robin_type());

        let digest = match self.summarizer.summarize(article, Some(&ai_type)).await {
            Ok(d) => d,
            Err(e) => return Ok(Err(e.to_string())),
        };

        let notice = ArticleNotice {
            team: Some(ai_type.clone()),
            title: format!("New article for team {ai_type}"),
            text: format!("**{}**\n\n{}", article.title, digest),
            url: article.url.clone(),
        };
        let delivery = match self.notifier.send(&notice).await {
            Ok(d) => d,
            Err(e) => return Ok(Err(format!("{e:#}"))),
        };

        self.jobs
            .mark_ai_processed(article.id, OPENROUTER_JOB, Some(ai_type.clone()), digest)
            .await?;
        Ok(Ok((ai_type, delivery)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AiError;
    use crate::model::{ContentType, NewArticle, Source};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::Mutex;

    struct Echo;

    #[async_trait]
    impl Summarizer for Echo {
        async fn summarize(&self, a: &Article, ai_type: Option<&str>) -> Result<String, AiError> {
            if a.title.contains("fail") {
                return Err(AiError::Status(502));
            }
            Ok(format!("{} for {}", a.title, ai_type.unwrap_or("-")))
        }
        fn name(&self) -> &'static str {
            "echo"
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<ArticleNotice>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn send(&self, notice: &ArticleNotice) -> anyhow::Result<Delivery> {
            self.sent.lock().unwrap().push(notice.clone());
            Ok(Delivery::Sent)
        }
    }

    fn article(source_id: i64, title: &str, hours_ago: i64) -> NewArticle {
        NewArticle {
            source_id,
            dedup_key: format!("https://news.example.com/{title}"),
            url: Some(format!("https://news.example.com/{title}")),
            title: title.to_string(),
            summary: String::new(),
            published_at: Utc::now() - Duration::hours(hours_ago),
            content_type: ContentType::Technology,
        }
    }

    async fn fixture(enabled: bool, limit: u32) -> (Arc<MemoryStore>, Arc<Recorder>, AiJob) {
        let store = Arc::new(MemoryStore::with_sources([
            Source::new(1, "Dev", "feed", "https://dev.example.com/rss", json!({}))
                .unwrap()
                .with_team("dev"),
            Source::new(2, "Wire", "feed", "https://wire.example.com/rss", json!({})).unwrap(),
        ]));
        store
            .insert_articles(vec![article(1, "kernel", 3), article(2, "markets", 2), article(2, "rates", 1)])
            .await
            .unwrap();
        store
            .upsert_job_config(JobConfig {
                enabled,
                limit,
                ..JobConfig::new(OPENROUTER_JOB)
            })
            .await
            .unwrap();
        let notifier = Arc::new(Recorder::default());
        let job = AiJob::new(store.clone(), store.clone(), Arc::new(Echo), notifier.clone());
        (store, notifier, job)
    }

    #[tokio::test]
    async fn disabled_job_touches_nothing() {
        let (store, notifier, job) = fixture(false, 5).await;
        let report = job.run_once().await.unwrap();
        assert!(!report.enabled);
        assert!(notifier.sent.lock().unwrap().is_empty());
        assert!(store.next_unprocessed(None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn team_comes_from_source_then_round_robin() {
        let (store, notifier, job) = fixture(true, 3).await;
        let report = job.run_once().await.unwrap();
        assert_eq!(report.processed.len(), 3);
        assert_eq!(report.notified, 3);

        let teams: Vec<String> = notifier
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.team.clone().unwrap())
            .collect();
        // oldest first; teamless sources rotate after the last type sent
        assert_eq!(teams, vec!["dev", "ba", "system"]);

        let cfg = store.job_config(OPENROUTER_JOB).await.unwrap().unwrap();
        assert_eq!(cfg.last_type_sent.as_deref(), Some("system"));
        assert!(store.next_unprocessed(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn summarizer_failure_keeps_article_queued() {
        let (store, notifier, job) = fixture(true, 5).await;
        store
            .insert_articles(vec![article(2, "fail-first", 10)])
            .await
            .unwrap();
        let report = job.run_once().await.unwrap();
        assert!(report.processed.is_empty());
        assert!(report.error.unwrap().contains("502"));
        assert!(notifier.sent.lock().unwrap().is_empty());
        let next = store.next_unprocessed(None).await.unwrap().unwrap();
        assert_eq!(next.title, "fail-first");
    }

    #[tokio::test]
    async fn team_filter_limits_the_queue() {
        let (_store, notifier, job) = fixture(true, 5).await;
        let job = job.with_team(Some("dev".into()));
        let report = job.run_once().await.unwrap();
        assert_eq!(report.processed.len(), 1);
        assert_eq!(notifier.sent.lock().unwrap()[0].title, "New article for team dev");
    }
}
