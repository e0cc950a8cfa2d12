use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use article_forge::config;
use article_forge::db;
use article_forge::dedup::repair_article_headings;
use article_forge::model::{GenerateArticlesPayload, GenerateDescriptionPayload, RepairHeadingsPayload};
use article_forge::queue::{self, SqliteQueue};

#[derive(Debug, Parser)]
#[command(author, version, about = "Enqueue generation jobs and inspect their state")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create draft articles for a domain from unconsumed source questions
    GenerateArticles {
        #[arg(long)]
        domain_id: i64,
        /// Number of articles to create
        #[arg(long)]
        count: i64,
        /// Source question category to draw from
        #[arg(long)]
        source_category_id: i64,
        /// Image category for thumbnails; 0 disables thumbnails
        #[arg(long, default_value = "0")]
        image_category_id: i64,
    },
    /// (Re)generate the body of an existing article
    GenerateDescription {
        #[arg(long)]
        article_id: i64,
        #[arg(long)]
        question_id: i64,
    },
    /// Print queue, state and retry count of a job
    JobStatus {
        #[arg(long)]
        id: String,
    },
    /// Remove duplicate headings from a stored article
    RepairHeadings {
        #[arg(long)]
        article_id: i64,
        /// Run immediately instead of enqueueing a job
        #[arg(long)]
        now: bool,
    },
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
    let producer = SqliteQueue::new(pool.clone(), cfg.queue.name.clone());

    match args.command {
        Command::GenerateArticles {
            domain_id,
            count,
            source_category_id,
            image_category_id,
        } => {
            if count <= 0 {
                return Err(anyhow!("--count must be > 0"));
            }
            let payload = GenerateArticlesPayload {
                domain_id,
                count,
                source_category_id,
                image_category_id,
            };
            let id = queue::enqueue_generate_articles(&producer, &cfg.queue, &payload).await?;
            info!(id = %id, queue = producer.name(), "generate-articles job enqueued");
            println!("{}", id);
        }
        Command::GenerateDescription {
            article_id,
            question_id,
        } => {
            if db::get_article(&pool, article_id).await?.is_none() {
                return Err(anyhow!("article with id {} not found", article_id));
            }
            let payload = GenerateDescriptionPayload {
                article_id,
                source_question_id: question_id,
            };
            let id = queue::enqueue_generate_description(&producer, &cfg.queue, &payload).await?;
            info!(id = %id, queue = producer.name(), "generate-description job enqueued");
            println!("{}", id);
        }
        Command::JobStatus { id } => {
            let info = producer
                .job_info(&id)
                .await?
                .ok_or_else(|| anyhow!("job {} not found", id))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::RepairHeadings { article_id, now } => {
            if now {
                let changed = repair_article_headings(&pool, article_id).await?;
                println!("{}", if changed { "repaired" } else { "unchanged" });
            } else {
                let payload = RepairHeadingsPayload { article_id };
                let id = queue::enqueue_repair_headings(&producer, &cfg.queue, &payload).await?;
                println!("{}", id);
            }
        }
    }

    Ok(())
}
