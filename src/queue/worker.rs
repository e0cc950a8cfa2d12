use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::registry::JobRegistry;
use crate::config::Config;
use crate::db::{self, Pool};
use crate::model::JobState;

const BASE_BACKOFF_SECS: i64 = 5;
const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub queue: String,
    pub workers: usize,
    pub poll_interval: Duration,
    pub max_backoff_secs: i64,
    pub recover_stale_jobs: bool,
}

impl WorkerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            queue: cfg.queue.name.clone(),
            workers: cfg.app.workers,
            poll_interval: cfg.poll_interval(),
            max_backoff_secs: cfg.app.max_backoff_seconds as i64,
            recover_stale_jobs: cfg.app.recover_stale_jobs,
        }
    }
}

/// `5s * 2^retried`, capped at `max_backoff_secs`.
pub fn backoff_secs(retried: i32, max_backoff_secs: i64) -> i64 {
    let factor = 1i64 << retried.clamp(0, 32);
    BASE_BACKOFF_SECS
        .saturating_mul(factor)
        .min(max_backoff_secs)
        .max(0)
}

/// Claim and run one due job. Returns `Ok(false)` when the queue is idle.
#[instrument(skip_all)]
pub async fn process_next_job<D: Send + Sync + 'static>(
    pool: &Pool,
    registry: &JobRegistry<D>,
    deps: Arc<D>,
    queue: &str,
    max_backoff_secs: i64,
) -> Result<bool> {
    let Some(job) = db::claim_next_job(pool, queue).await? else {
        return Ok(false);
    };

    let fut = match registry.prepare(&job.kind, &job.payload, deps) {
        Ok(fut) => fut,
        Err(err) => {
            warn!(%err, id = %job.id, kind = %job.kind, "job cannot be dispatched; archiving");
            if !db::archive_job(pool, &job, &err.to_string()).await? {
                warn!(id = %job.id, "job was reclaimed before it could be archived");
            }
            return Ok(true);
        }
    };

    let limit = Duration::from_secs(job.timeout_secs.max(1) as u64);
    let failure = match timeout(limit, fut).await {
        Ok(Ok(())) => {
            if db::complete_job(pool, &job).await? {
                info!(id = %job.id, kind = %job.kind, retried = job.retried, "job completed");
            } else {
                warn!(id = %job.id, kind = %job.kind, "job finished after being reclaimed; result dropped");
            }
            return Ok(true);
        }
        Ok(Err(err)) => format!("{:#}", err),
        Err(_) => format!("job timed out after {}s", limit.as_secs()),
    };

    let delay = backoff_secs(job.retried, max_backoff_secs);
    let state = db::retry_or_archive_job(pool, &job, &failure, delay).await?;
    match state {
        None => warn!(
            id = %job.id,
            kind = %job.kind,
            error = %failure,
            "job failed after being reclaimed; result dropped"
        ),
        Some(JobState::Archived) => warn!(
            id = %job.id,
            kind = %job.kind,
            retried = job.retried,
            error = %failure,
            "job failed; retry budget exhausted, archived"
        ),
        _ => warn!(
            id = %job.id,
            kind = %job.kind,
            retried = job.retried,
            delay,
            error = %failure,
            "job failed; backoff"
        ),
    }
    Ok(true)
}

async fn worker_loop<D: Send + Sync + 'static>(
    worker_id: usize,
    pool: Pool,
    registry: Arc<JobRegistry<D>>,
    deps: Arc<D>,
    settings: WorkerSettings,
    shutdown: CancellationToken,
) {
    info!(worker_id, queue = %settings.queue, "worker started");
    while !shutdown.is_cancelled() {
        match process_next_job(
            &pool,
            &registry,
            deps.clone(),
            &settings.queue,
            settings.max_backoff_secs,
        )
        .await
        {
            Ok(true) => continue,
            Ok(false) => {}
            Err(err) => error!(?err, worker_id, "worker iteration failed"),
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(settings.poll_interval) => {}
        }
    }
    info!(worker_id, "worker stopped");
}

async fn stale_job_sweeper(pool: Pool, shutdown: CancellationToken) {
    loop {
        match db::recover_stale_jobs(&pool).await {
            Ok(0) => {}
            Ok(n) => warn!(recovered = n, "requeued stale active jobs"),
            Err(err) => error!(?err, "stale job sweep failed"),
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(STALE_SWEEP_INTERVAL) => {}
        }
    }
}

/// Run `settings.workers` sequential consumers until `shutdown` fires.
/// A job already running when shutdown fires is allowed to finish.
pub async fn run_worker_pool<D: Send + Sync + 'static>(
    pool: Pool,
    registry: Arc<JobRegistry<D>>,
    deps: Arc<D>,
    settings: WorkerSettings,
    shutdown: CancellationToken,
) {
    let workers = (0..settings.workers).map(|worker_id| {
        worker_loop(
            worker_id,
            pool.clone(),
            registry.clone(),
            deps.clone(),
            settings.clone(),
            shutdown.clone(),
        )
    });

    if settings.recover_stale_jobs {
        tokio::join!(join_all(workers), stale_job_sweeper(pool.clone(), shutdown.clone()));
    } else {
        join_all(workers).await;
    }
    info!("worker pool stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_secs(0, 300), 5);
        assert_eq!(backoff_secs(1, 300), 10);
        assert_eq!(backoff_secs(3, 300), 40);
        assert_eq!(backoff_secs(10, 300), 300);
        assert_eq!(backoff_secs(200, 300), 300);
        assert_eq!(backoff_secs(-1, 300), 5);
    }
}
