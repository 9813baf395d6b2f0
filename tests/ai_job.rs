// tests/ai_job.rs
use chrono::{Duration as ChronoDuration, Utc};
use news_collector::analyze::{AiJob, OpenRouterClient};
use news_collector::model::{ContentType, JobConfig, NewArticle, Source, OPENROUTER_JOB};
use news_collector::notify::TeamsNotifier;
use news_collector::store::{ArticleQuery, JobStore, MemoryStore, Store};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn article(source_id: i64, slug: &str, hours_ago: i64) -> NewArticle {
    NewArticle {
        source_id,
        dedup_key: format!("https://news.example.com/{slug}"),
        url: Some(format!("https://news.example.com/{slug}")),
        title: format!("Headline {slug}"),
        summary: "Body of the article.".into(),
        published_at: Utc::now() - ChronoDuration::hours(hours_ago),
        content_type: ContentType::Technology,
    }
}

async fn seeded_store(enabled: bool) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::with_sources([
        Source::new(1, "Dev wire", "feed", "https://dev.example.com/rss", json!({}))
            .unwrap()
            .with_team("dev"),
        Source::new(2, "BA wire", "feed", "https://ba.example.com/rss", json!({}))
            .unwrap()
            .with_team("ba"),
    ]));
    store
        .insert_articles(vec![article(1, "older", 5), article(1, "newer", 1)])
        .await
        .unwrap();
    store
        .upsert_job_config(JobConfig {
            enabled,
            ..JobConfig::new(OPENROUTER_JOB)
        })
        .await
        .unwrap();
    store
}

fn job_for(server: &MockServer, store: &Arc<MemoryStore>) -> AiJob {
    let client = OpenRouterClient::new(
        reqwest::Client::new(),
        format!("{}/api/v1", server.uri()),
        "sk-or-v1-test",
        "openai/gpt-4o-mini",
    )
    .unwrap();
    let webhooks = BTreeMap::from([("dev".to_string(), format!("{}/webhook/dev", server.uri()))]);
    let notifier = TeamsNotifier::new(webhooks, None).with_retries(1);
    AiJob::new(store.clone(), store.clone(), Arc::new(client), Arc::new(notifier))
}

fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "gen-1",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }]
    }))
}

#[tokio::test]
async fn oldest_article_is_summarized_posted_and_marked() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-or-v1-test"))
        .and(body_partial_json(json!({ "model": "openai/gpt-4o-mini" })))
        .respond_with(completion("  Kernel release brings faster IO.  "))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/webhook/dev"))
        .and(body_partial_json(json!({
            "@type": "MessageCard",
            "title": "New article for team dev"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("1"))
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store(true).await;
    let report = job_for(&server, &store).run_once().await.unwrap();
    assert!(report.enabled);
    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.notified, 1);
    assert!(report.error.is_none());

    let page = store.list_articles(&ArticleQuery::default()).await.unwrap();
    let older = page.items.iter().find(|a| a.title == "Headline older").unwrap();
    assert!(older.is_ai_processed);
    assert_eq!(older.ai_content.as_deref(), Some("Kernel release brings faster IO."));
    assert_eq!(older.ai_type.as_deref(), Some("dev"));
    let newer = page.items.iter().find(|a| a.title == "Headline newer").unwrap();
    assert!(!newer.is_ai_processed);

    let cfg = store.job_config(OPENROUTER_JOB).await.unwrap().unwrap();
    assert_eq!(cfg.last_type_sent.as_deref(), Some("dev"));
}

#[tokio::test]
async fn disabled_job_makes_no_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let store = seeded_store(false).await;
    let report = job_for(&server, &store).run_once().await.unwrap();
    assert!(!report.enabled);
    assert!(store.next_unprocessed(None).await.unwrap().is_some());
}

#[tokio::test]
async fn provider_error_leaves_article_queued() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"error": "rate limited"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/webhook/dev"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = seeded_store(true).await;
    let report = job_for(&server, &store).run_once().await.unwrap();
    assert!(report.processed.is_empty());
    assert!(report.error.as_deref().unwrap().contains("429"));

    let next = store.next_unprocessed(None).await.unwrap().unwrap();
    assert_eq!(next.title, "Headline older");
}

#[tokio::test]
async fn empty_completion_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let store = seeded_store(true).await;
    let report = job_for(&server, &store).run_once().await.unwrap();
    assert!(report.processed.is_empty());
    assert!(report.error.unwrap().contains("no content"));
}

#[tokio::test]
async fn webhook_failure_leaves_article_queued() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(completion("Digest."))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/webhook/dev"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store(true).await;
    let report = job_for(&server, &store).run_once().await.unwrap();
    assert!(report.processed.is_empty());
    assert!(report.error.unwrap().contains("Teams webhook"));
    assert!(!store
        .next_unprocessed(None)
        .await
        .unwrap()
        .unwrap()
        .is_ai_processed);
}

#[tokio::test]
async fn team_without_webhook_is_still_marked() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(completion("Requirements digest."))
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store(true).await;
    store
        .insert_articles(vec![article(2, "process", 10)])
        .await
        .unwrap();
    let job = job_for(&server, &store).with_team(Some("ba".into()));
    let report = job.run_once().await.unwrap();
    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.notified, 0);
    assert_eq!(report.without_webhook, 1);
    assert!(store.next_unprocessed(Some("ba")).await.unwrap().is_none());
    // dev articles were not touched
    assert!(store.next_unprocessed(Some("dev")).await.unwrap().is_some());
}
