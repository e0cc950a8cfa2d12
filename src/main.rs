use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use article_forge::config;
use article_forge::db;
use article_forge::llm::{LlmClient, OpenAiClient};
use article_forge::queue::{run_worker_pool, SqliteQueue, WorkerSettings};
use article_forge::tasks::{build_registry, TaskContext};

#[derive(Debug, Parser)]
#[command(author, version, about = "Run the article generation job workers")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override `app.workers`
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let provider = OpenAiClient::from_config(&cfg.llm).context("failed to build LLM client")?;
    let llm = LlmClient::new(Arc::new(provider), cfg.llm.model.clone(), cfg.llm.retries_limit);
    let producer = Arc::new(SqliteQueue::new(pool.clone(), cfg.queue.name.clone()));

    let mut settings = WorkerSettings::from_config(&cfg);
    if let Some(n) = args.workers.filter(|n| *n > 0) {
        settings.workers = n;
    }

    let ctx = Arc::new(TaskContext::new(pool.clone(), llm, producer, cfg));
    let registry = Arc::new(build_registry());

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(?err, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested; waiting for running jobs");
        signal_token.cancel();
    });

    info!(workers = settings.workers, queue = %settings.queue, "starting workers");
    run_worker_pool(pool, registry, ctx, settings, shutdown).await;
    info!("bye");
    Ok(())
}
