use super::model::{ClaimedJob, JobInfo, NewJob};
use crate::model::{Article, Category, JobState, NewArticle, PageContent, SourceQuestion};
use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use sqlx::SqlitePool;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    // An in-memory database lives and dies with its connection.
    let max_connections = if normalized.starts_with("sqlite::memory") {
        1
    } else {
        8
    };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Articles
// ---------------------------------------------------------------------------

fn article_from_row(row: &SqliteRow) -> Result<Article> {
    Ok(Article {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        body: row.try_get("body")?,
        thumbnail_id: row.try_get("thumbnail_id")?,
        category_id: row.try_get("category_id")?,
        domain_id: row.try_get("domain_id")?,
        author_id: row.try_get("author_id")?,
        featured: row.try_get("featured")?,
        reading_time_minutes: row.try_get("reading_time_minutes")?,
        is_published: row.try_get("is_published")?,
        publication_date: row.try_get("publication_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[instrument(skip_all)]
pub async fn create_article(pool: &Pool, article: &NewArticle) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO articles (title, slug, body, thumbnail_id, category_id, domain_id, author_id, featured, is_published) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0) RETURNING id",
    )
    .bind(&article.title)
    .bind(&article.slug)
    .bind(&article.body)
    .bind(article.thumbnail_id)
    .bind(article.category_id)
    .bind(article.domain_id)
    .bind(article.author_id)
    .fetch_one(pool)
    .await
    .context("failed to insert article")?;
    Ok(rec.get("id"))
}

#[instrument(skip_all)]
pub async fn get_article(pool: &Pool, id: i64) -> Result<Option<Article>> {
    let row = sqlx::query(
        "SELECT id, title, slug, body, thumbnail_id, category_id, domain_id, author_id, featured, \
                reading_time_minutes, is_published, publication_date, created_at, updated_at \
         FROM articles WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(article_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn update_article(pool: &Pool, id: i64, article: &Article) -> Result<()> {
    let res = sqlx::query(
        "UPDATE articles SET title = ?, slug = ?, body = ?, thumbnail_id = ?, category_id = ?, domain_id = ?, \
                author_id = ?, featured = ?, reading_time_minutes = ?, is_published = ?, publication_date = ?, \
                updated_at = CURRENT_TIMESTAMP \
         WHERE id = ?",
    )
    .bind(&article.title)
    .bind(&article.slug)
    .bind(&article.body)
    .bind(article.thumbnail_id)
    .bind(article.category_id)
    .bind(article.domain_id)
    .bind(article.author_id)
    .bind(article.featured)
    .bind(article.reading_time_minutes)
    .bind(article.is_published)
    .bind(article.publication_date)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to update article")?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("article {} not found", id));
    }
    Ok(())
}

/// Returns the number of deleted rows (0 when the article was already gone).
#[instrument(skip_all)]
pub async fn delete_article(pool: &Pool, id: i64) -> Result<u64> {
    let res = sqlx::query("DELETE FROM articles WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete article")?;
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn get_article_count_for_category(
    pool: &Pool,
    category_id: i64,
    domain_id: i64,
) -> Result<i64> {
    let cnt: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE category_id = ? AND domain_id = ?")
            .bind(category_id)
            .bind(domain_id)
            .fetch_one(pool)
            .await?;
    Ok(cnt)
}

// ---------------------------------------------------------------------------
// Categories and images
// ---------------------------------------------------------------------------

#[instrument(skip_all)]
pub async fn get_categories_for_domain(pool: &Pool, domain_id: i64) -> Result<Vec<Category>> {
    let rows = sqlx::query(
        "SELECT c.id, c.name, c.slug, c.weight FROM categories c \
         JOIN categories_domains cd ON cd.category_id = c.id \
         WHERE cd.domain_id = ? ORDER BY c.id",
    )
    .bind(domain_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<Category> {
            Ok(Category {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                slug: row.try_get("slug")?,
                weight: row.try_get("weight")?,
            })
        })
        .collect()
}

#[instrument(skip_all)]
pub async fn random_image_for_category(pool: &Pool, image_category_id: i64) -> Result<Option<i64>> {
    let id = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM images WHERE category_id = ? ORDER BY RANDOM() LIMIT 1",
    )
    .bind(image_category_id)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

// ---------------------------------------------------------------------------
// Source questions
// ---------------------------------------------------------------------------

fn question_from_row(row: &SqliteRow) -> Result<SourceQuestion> {
    Ok(SourceQuestion {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        answer_summary: row.try_get("answer_summary")?,
        category_id: row.try_get("category_id")?,
        fetched: row.try_get("fetched")?,
        page_contents: Vec::new(),
    })
}

async fn page_contents_for(pool: &Pool, question_id: i64) -> Result<Vec<PageContent>> {
    let rows = sqlx::query(
        "SELECT source_id, href, raw_text, processed_text FROM page_contents \
         WHERE question_id = ? ORDER BY source_id",
    )
    .bind(question_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<PageContent> {
            Ok(PageContent {
                source_id: row.try_get("source_id")?,
                href: row.try_get("href")?,
                raw_text: row.try_get("raw_text")?,
                processed_text: row.try_get("processed_text")?,
            })
        })
        .collect()
}

#[instrument(skip_all)]
pub async fn get_question(pool: &Pool, id: i64) -> Result<Option<SourceQuestion>> {
    let row = sqlx::query(
        "SELECT id, text, answer_summary, category_id, fetched FROM source_questions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut question = question_from_row(&row)?;
    question.page_contents = page_contents_for(pool, id).await?;
    Ok(Some(question))
}

/// Unconsumed questions of a source category, in random order so repeated runs
/// do not keep retrying the same unassignable questions first.
#[instrument(skip_all)]
pub async fn get_unfetched_questions(
    pool: &Pool,
    category_id: i64,
    limit: i64,
) -> Result<Vec<SourceQuestion>> {
    let rows = sqlx::query(
        "SELECT id, text, answer_summary, category_id, fetched FROM source_questions \
         WHERE category_id = ? AND fetched = 0 ORDER BY RANDOM() LIMIT ?",
    )
    .bind(category_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut questions = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut question = question_from_row(row)?;
        question.page_contents = page_contents_for(pool, question.id).await?;
        questions.push(question);
    }
    Ok(questions)
}

#[instrument(skip_all)]
pub async fn update_question(pool: &Pool, id: i64, question: &SourceQuestion) -> Result<()> {
    let res = sqlx::query(
        "UPDATE source_questions SET text = ?, answer_summary = ?, category_id = ?, fetched = ? WHERE id = ?",
    )
    .bind(&question.text)
    .bind(&question.answer_summary)
    .bind(question.category_id)
    .bind(question.fetched)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to update question")?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("question {} not found", id));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[instrument(skip_all)]
pub async fn insert_job(pool: &Pool, job: &NewJob) -> Result<()> {
    sqlx::query(
        "INSERT INTO jobs (id, queue, kind, payload, state, max_retry, retried, timeout_secs, due_at) \
         VALUES (?, ?, ?, ?, 'pending', ?, 0, ?, CURRENT_TIMESTAMP)",
    )
    .bind(&job.id)
    .bind(&job.queue)
    .bind(job.kind.as_str())
    .bind(&job.payload)
    .bind(job.max_retry)
    .bind(job.timeout_secs)
    .execute(pool)
    .await
    .context("failed to enqueue job")?;
    Ok(())
}

/// Atomically pick the oldest due job of `queue` and flip it to `active`.
#[instrument(skip_all)]
pub async fn claim_next_job(pool: &Pool, queue: &str) -> Result<Option<ClaimedJob>> {
    let row = sqlx::query(
        "UPDATE jobs SET state = 'active', started_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ( \
             SELECT id FROM jobs \
             WHERE queue = ? AND state IN ('pending', 'retry') AND datetime(due_at) <= CURRENT_TIMESTAMP \
             ORDER BY datetime(due_at) ASC, rowid ASC LIMIT 1 \
         ) \
         RETURNING id, queue, kind, payload, max_retry, retried, timeout_secs",
    )
    .bind(queue)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(ClaimedJob {
        id: row.try_get("id")?,
        queue: row.try_get("queue")?,
        kind: row.try_get("kind")?,
        payload: row.try_get("payload")?,
        max_retry: row.try_get("max_retry")?,
        retried: row.try_get("retried")?,
        timeout_secs: row.try_get("timeout_secs")?,
    }))
}

/// Extra time a job may stay `active` past its timeout before the sweeper
/// takes it back. Covers the whole-second resolution of `started_at`.
const STALE_GRACE_SECS: i64 = 60;

// Terminal updates only apply while the row is still the run that `job` claimed:
// `active` with the same retry count. A sweep plus re-claim changes both.
const OWNED_BY_CLAIM: &str = "id = ? AND state = 'active' AND retried = ?";

/// Mark a claimed job completed. Returns `false` when the claim was lost.
#[instrument(skip_all)]
pub async fn complete_job(pool: &Pool, job: &ClaimedJob) -> Result<bool> {
    let res = sqlx::query(&format!(
        "UPDATE jobs SET state = 'completed', completed_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP \
         WHERE {OWNED_BY_CLAIM}"
    ))
    .bind(&job.id)
    .bind(job.retried)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Consume one retry and reschedule after `delay_secs`, or archive when the budget is spent.
/// Returns `None` when the claim was lost and nothing was written.
#[instrument(skip_all)]
pub async fn retry_or_archive_job(
    pool: &Pool,
    job: &ClaimedJob,
    error: &str,
    delay_secs: i64,
) -> Result<Option<JobState>> {
    if job.retried >= job.max_retry {
        let archived = archive_job(pool, job, error).await?;
        return Ok(archived.then_some(JobState::Archived));
    }
    let res = sqlx::query(&format!(
        "UPDATE jobs SET state = 'retry', retried = ?, last_error = ?, started_at = NULL, \
                due_at = datetime('now', ? || ' seconds'), updated_at = CURRENT_TIMESTAMP \
         WHERE {OWNED_BY_CLAIM}"
    ))
    .bind(job.retried + 1)
    .bind(error)
    .bind(delay_secs)
    .bind(&job.id)
    .bind(job.retried)
    .execute(pool)
    .await?;
    Ok((res.rows_affected() > 0).then_some(JobState::Retry))
}

/// Archive a claimed job without further retries. Returns `false` when the claim was lost.
#[instrument(skip_all)]
pub async fn archive_job(pool: &Pool, job: &ClaimedJob, error: &str) -> Result<bool> {
    let res = sqlx::query(&format!(
        "UPDATE jobs SET state = 'archived', last_error = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE {OWNED_BY_CLAIM}"
    ))
    .bind(error)
    .bind(&job.id)
    .bind(job.retried)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Requeue (or archive) jobs stuck in `active` well past their timeout, e.g. after a worker crash.
#[instrument(skip_all)]
pub async fn recover_stale_jobs(pool: &Pool) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE jobs SET \
             state = CASE WHEN retried < max_retry THEN 'retry' ELSE 'archived' END, \
             retried = CASE WHEN retried < max_retry THEN retried + 1 ELSE retried END, \
             last_error = 'job timed out while active', \
             started_at = NULL, due_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP \
         WHERE state = 'active' \
           AND datetime(started_at, '+' || (timeout_secs + ?) || ' seconds') <= CURRENT_TIMESTAMP",
    )
    .bind(STALE_GRACE_SECS)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn get_job_info(pool: &Pool, id: &str) -> Result<Option<JobInfo>> {
    let row = sqlx::query("SELECT id, queue, kind, state, max_retry, retried FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let state_str: String = row.try_get("state")?;
    let state = JobState::parse_state(&state_str)
        .ok_or_else(|| anyhow!("job {} has unknown state {}", id, state_str))?;
    Ok(Some(JobInfo {
        id: row.try_get("id")?,
        queue: row.try_get("queue")?,
        kind: row.try_get("kind")?,
        state,
        max_retry: row.try_get("max_retry")?,
        retried: row.try_get("retried")?,
    }))
}

#[instrument(skip_all)]
pub async fn count_jobs_in_state(pool: &Pool, state: JobState) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE state = ?")
        .bind(state.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}
