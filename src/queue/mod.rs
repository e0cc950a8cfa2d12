//! Durable job queue on top of the `jobs` table.
//!
//! Producers enqueue `(kind, payload, max_retry, timeout)`; workers claim one
//! job at a time and dispatch it through a [`JobRegistry`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config;
use crate::db::{self, JobInfo, NewJob, Pool};
use crate::model::{
    GenerateArticlesPayload, GenerateDescriptionPayload, JobKind, MarkQuestionConsumedPayload,
    RepairHeadingsPayload,
};

pub mod registry;
pub mod worker;

pub use registry::{DispatchError, JobRegistry};
pub use worker::{backoff_secs, process_next_job, run_worker_pool, WorkerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    pub max_retry: i32,
    pub timeout: Duration,
}

impl JobOptions {
    pub fn generation(cfg: &config::Queue) -> Self {
        Self {
            max_retry: cfg.generation_max_retry,
            timeout: cfg.generation_timeout(),
        }
    }

    pub fn consume(cfg: &config::Queue) -> Self {
        Self {
            max_retry: cfg.consume_max_retry,
            timeout: cfg.consume_timeout(),
        }
    }
}

/// Anything that can accept a job for later execution. Returns the job id.
#[async_trait]
pub trait JobProducer: Send + Sync {
    async fn enqueue(&self, kind: JobKind, payload: String, opts: JobOptions) -> Result<String>;
}

/// Serialize `payload` and hand it to `producer`.
pub async fn enqueue_payload<P: Serialize + Sync>(
    producer: &dyn JobProducer,
    kind: JobKind,
    payload: &P,
    opts: JobOptions,
) -> Result<String> {
    let json = serde_json::to_string(payload)
        .with_context(|| format!("failed to serialize {} payload", kind.as_str()))?;
    producer.enqueue(kind, json, opts).await
}

pub async fn enqueue_generate_articles(
    producer: &dyn JobProducer,
    cfg: &config::Queue,
    payload: &GenerateArticlesPayload,
) -> Result<String> {
    enqueue_payload(producer, JobKind::GenerateArticles, payload, JobOptions::generation(cfg)).await
}

pub async fn enqueue_generate_description(
    producer: &dyn JobProducer,
    cfg: &config::Queue,
    payload: &GenerateDescriptionPayload,
) -> Result<String> {
    enqueue_payload(producer, JobKind::GenerateDescription, payload, JobOptions::generation(cfg))
        .await
}

pub async fn enqueue_mark_consumed(
    producer: &dyn JobProducer,
    cfg: &config::Queue,
    payload: &MarkQuestionConsumedPayload,
) -> Result<String> {
    enqueue_payload(producer, JobKind::MarkQuestionConsumed, payload, JobOptions::consume(cfg)).await
}

pub async fn enqueue_repair_headings(
    producer: &dyn JobProducer,
    cfg: &config::Queue,
    payload: &RepairHeadingsPayload,
) -> Result<String> {
    enqueue_payload(producer, JobKind::RepairHeadings, payload, JobOptions::consume(cfg)).await
}

/// Queue backed by the SQLite `jobs` table.
#[derive(Debug, Clone)]
pub struct SqliteQueue {
    pool: Pool,
    queue: String,
}

impl SqliteQueue {
    pub fn new(pool: Pool, queue: impl Into<String>) -> Self {
        Self {
            pool,
            queue: queue.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.queue
    }

    /// Queue/state/retry view of a job; never includes error text.
    pub async fn job_info(&self, id: &str) -> Result<Option<JobInfo>> {
        db::get_job_info(&self.pool, id).await
    }
}

#[async_trait]
impl JobProducer for SqliteQueue {
    #[instrument(skip_all, fields(kind = kind.as_str(), queue = %self.queue))]
    async fn enqueue(&self, kind: JobKind, payload: String, opts: JobOptions) -> Result<String> {
        let job = NewJob {
            id: Uuid::new_v4().to_string(),
            queue: self.queue.clone(),
            kind,
            payload,
            max_retry: opts.max_retry,
            timeout_secs: opts.timeout.as_secs() as i64,
        };
        db::insert_job(&self.pool, &job).await?;
        info!(id = %job.id, max_retry = job.max_retry, "job enqueued");
        Ok(job.id)
    }
}
