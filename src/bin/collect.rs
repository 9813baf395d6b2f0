//! One-shot collection and source management from the command line.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use news_collector::cli::{Cli, Command};
use news_collector::error::RunError;
use news_collector::ingest::import::{import_sources, load_specs};
use news_collector::model::FetchStatus;
use news_collector::store::{JsonFileStore, Store};
use news_collector::{build_ai_job, telemetry, Collector, CollectorConfig, CollectorSettings, FetcherRegistry};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let args = Cli::parse();
    let mut cfg = match &args.config {
        Some(p) => CollectorConfig::load_from(p)?,
        None => CollectorConfig::load_default()?,
    };
    if let Some(store) = &args.store {
        cfg.store_path = store.clone();
    }

    let store = Arc::new(
        JsonFileStore::open(&cfg.store_path)
            .await
            .with_context(|| format!("opening store {}", cfg.store_path.display()))?,
    );

    match args.command {
        Command::Run {
            source_id,
            force,
            team,
        } => run(&cfg, store, source_id, force, team).await,
        Command::Import { file, update } => {
            let specs = load_specs(&file)?;
            let report = import_sources(store.as_ref(), specs, update).await?;
            for name in &report.skipped {
                println!("Source \"{name}\" already exists, skipping...");
            }
            for (name, reason) in &report.invalid {
                println!("Source \"{name}\" rejected: {reason}");
            }
            if update && report.updated > 0 {
                println!(
                    "Imported {} new sources and updated {} existing sources",
                    report.created, report.updated
                );
            } else {
                println!("Imported {} sources", report.created);
            }
            Ok(if report.invalid.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Sources => {
            let mut sources = store.list_sources().await?;
            sources.sort_by(|a, b| a.name.cmp(&b.name));
            for s in sources {
                println!(
                    "{:>4}  {:<12} {:<8} {:<30} {}",
                    s.id,
                    s.kind.as_str(),
                    if s.is_active { "active" } else { "inactive" },
                    s.name,
                    s.last_fetched_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".into())
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Ai { team } => ai(&cfg, store, team).await,
    }
}

async fn ai(cfg: &CollectorConfig, store: Arc<JsonFileStore>, team: Option<String>) -> Result<ExitCode> {
    let Some(job) = build_ai_job(cfg, store.clone(), store)? else {
        eprintln!("no OpenRouter API key (set OPENROUTER_API_KEY or [ai].api_key)");
        return Ok(ExitCode::FAILURE);
    };
    let job = match team {
        Some(t) => job.with_team(Some(t)),
        None => job,
    };

    let report = job.run_once().await?;
    if !report.enabled {
        println!("openrouter job is disabled; enable it via POST /api/job-config");
        return Ok(ExitCode::SUCCESS);
    }
    println!(
        "{} articles processed ({} notified, {} without webhook)",
        report.processed.len(),
        report.notified,
        report.without_webhook
    );
    Ok(match report.error {
        Some(e) => {
            eprintln!("stopped: {e}");
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    })
}

async fn run(
    cfg: &CollectorConfig,
    store: Arc<JsonFileStore>,
    source_id: Option<i64>,
    force: bool,
    team: Option<String>,
) -> Result<ExitCode> {
    let registry = FetcherRegistry::with_defaults(cfg).context("building HTTP client")?;
    let collector = Collector::new(
        Arc::new(registry),
        store.clone(),
        store,
        CollectorSettings::from(cfg),
    );

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, finishing sources in flight...");
            on_ctrl_c.cancel();
        }
    });

    let team = team.or_else(|| cfg.team.clone());
    let result = match source_id {
        Some(id) => collector.collect_one(id, &cancel).await,
        None => collector.collect_active(force, team.as_deref(), &cancel).await,
    };
    let report = match result {
        Ok(r) => r,
        Err(e @ (RunError::SourceNotFound(_) | RunError::SourceInactive(_))) => {
            eprintln!("{e}");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    for log in &report.logs {
        let secs = log.duration_ms as f64 / 1_000.0;
        match log.status {
            FetchStatus::Failure => println!(
                "✗ {}: {}",
                log.source_name,
                log.error.as_ref().map(|e| e.detail.as_str()).unwrap_or("failed")
            ),
            _ => println!("✓ {}: {} articles in {:.2}s", log.source_name, log.counts.new, secs),
        }
    }
    for w in &report.warnings {
        eprintln!("warning: {w}");
    }

    let s = report.summary();
    println!(
        "{} sources processed ({} ok, {} partial, {} failed), {} new articles, {} not due, {} not attempted",
        s.sources_processed,
        s.successful,
        s.partial,
        s.failed,
        s.total_new_articles,
        report.not_due.len(),
        report.not_attempted.len()
    );
    Ok(if s.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
