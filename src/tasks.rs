//! Job handlers and their wiring into a [`JobRegistry`].

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::balancer::select_eligible;
use crate::classify::assign_category;
use crate::config::Config;
use crate::content::html::{reading_time_minutes, slugify};
use crate::content::{AssemblySettings, ContentAssembler};
use crate::db::{self, Pool};
use crate::dedup::repair_article_headings;
use crate::llm::LlmClient;
use crate::model::{
    Category, GenerateArticlesPayload, GenerateDescriptionPayload, JobKind,
    MarkQuestionConsumedPayload, NewArticle, RepairHeadingsPayload, SourceQuestion,
};
use crate::queue::{self, JobProducer, JobRegistry};

/// Shared dependencies handed to every handler.
pub struct TaskContext {
    pub pool: Pool,
    pub llm: LlmClient,
    pub assembler: ContentAssembler,
    pub producer: Arc<dyn JobProducer>,
    pub cfg: Config,
}

impl TaskContext {
    pub fn new(pool: Pool, llm: LlmClient, producer: Arc<dyn JobProducer>, cfg: Config) -> Self {
        let assembler = ContentAssembler::new(llm.clone(), AssemblySettings::from_config(&cfg));
        Self {
            pool,
            llm,
            assembler,
            producer,
            cfg,
        }
    }
}

/// What one generate-articles run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GenerateArticlesReport {
    pub created: Vec<i64>,
    pub skipped: usize,
}

/// Outcome of a generate-description run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionOutcome {
    Published,
    /// Not enough source text; the article stays an unpublished draft.
    LeftAsDraft,
}

pub fn build_registry() -> JobRegistry<TaskContext> {
    let mut registry: JobRegistry<TaskContext> = JobRegistry::new();
    registry.register::<GenerateArticlesPayload, _, _>(
        JobKind::GenerateArticles,
        |payload, ctx| async move { handle_generate_articles(&ctx, payload).await.map(|_| ()) },
    );
    registry.register::<GenerateDescriptionPayload, _, _>(
        JobKind::GenerateDescription,
        |payload, ctx| async move { handle_generate_description(&ctx, payload).await.map(|_| ()) },
    );
    registry.register::<MarkQuestionConsumedPayload, _, _>(
        JobKind::MarkQuestionConsumed,
        |payload, ctx| async move { handle_mark_question_consumed(&ctx, payload).await },
    );
    registry.register::<RepairHeadingsPayload, _, _>(
        JobKind::RepairHeadings,
        |payload, ctx| async move { handle_repair_headings(&ctx, payload).await.map(|_| ()) },
    );
    registry
}

async fn category_counts(
    pool: &Pool,
    categories: &[Category],
    domain_id: i64,
) -> Result<HashMap<String, i64>> {
    let mut counts = HashMap::with_capacity(categories.len());
    for category in categories {
        let n = db::get_article_count_for_category(pool, category.id, domain_id).await?;
        counts.insert(category.slug.clone(), n);
    }
    Ok(counts)
}

async fn pick_thumbnail(pool: &Pool, image_category_id: i64) -> Option<i64> {
    if image_category_id == 0 {
        return None;
    }
    match db::random_image_for_category(pool, image_category_id).await {
        Ok(id) => id,
        Err(err) => {
            warn!(?err, image_category_id, "thumbnail lookup failed; continuing without one");
            None
        }
    }
}

/// Enqueue description generation, then mark the question consumed.
async fn schedule_follow_ups(
    ctx: &TaskContext,
    article_id: i64,
    question: &SourceQuestion,
) -> Result<()> {
    queue::enqueue_generate_description(
        ctx.producer.as_ref(),
        &ctx.cfg.queue,
        &GenerateDescriptionPayload {
            article_id,
            source_question_id: question.id,
        },
    )
    .await
    .context("failed to enqueue description job")?;
    queue::enqueue_mark_consumed(
        ctx.producer.as_ref(),
        &ctx.cfg.queue,
        &MarkQuestionConsumedPayload {
            question_id: question.id,
            question: question.clone(),
        },
    )
    .await
    .context("failed to enqueue mark-consumed job")?;
    Ok(())
}

/// Undo a draft article whose follow-up jobs could not be scheduled.
#[instrument(skip_all, fields(article_id = article_id))]
pub async fn compensate_draft(pool: &Pool, article_id: i64) -> Result<()> {
    let deleted = db::delete_article(pool, article_id)
        .await
        .context("failed to delete orphaned draft")?;
    warn!(deleted, "draft article removed after failed follow-up");
    Ok(())
}

/// Create up to `payload.count` draft articles from unconsumed source questions.
#[instrument(skip_all, fields(domain_id = payload.domain_id, count = payload.count))]
pub async fn handle_generate_articles(
    ctx: &TaskContext,
    payload: GenerateArticlesPayload,
) -> Result<GenerateArticlesReport> {
    let pool = &ctx.pool;
    let questions = db::get_unfetched_questions(
        pool,
        payload.source_category_id,
        ctx.cfg.generation.question_batch_limit,
    )
    .await?;
    let categories = db::get_categories_for_domain(pool, payload.domain_id).await?;
    info!(
        questions = questions.len(),
        categories = categories.len(),
        "generating articles"
    );

    let mut report = GenerateArticlesReport::default();
    for question in questions {
        if report.created.len() as i64 >= payload.count {
            break;
        }

        let counts = category_counts(pool, &categories, payload.domain_id).await?;
        let eligible = select_eligible(&categories, &counts);
        if eligible.is_empty() {
            info!(question_id = question.id, "no eligible category; skipping question");
            report.skipped += 1;
            continue;
        }

        let Some(category_id) = assign_category(&ctx.llm, &eligible, &question).await? else {
            info!(question_id = question.id, "no category fits; skipping question");
            report.skipped += 1;
            continue;
        };
        if !eligible.iter().any(|c| c.id == category_id) {
            warn!(
                question_id = question.id,
                category_id, "model picked a category outside the eligible set; skipping"
            );
            report.skipped += 1;
            continue;
        }

        let draft = NewArticle {
            title: question.text.clone(),
            slug: slugify(&question.text),
            body: ctx.cfg.generation.placeholder_body.clone(),
            thumbnail_id: pick_thumbnail(pool, payload.image_category_id).await,
            category_id,
            domain_id: payload.domain_id,
            author_id: ctx.cfg.generation.author_id,
        };
        let article_id = db::create_article(pool, &draft).await?;
        info!(article_id, question_id = question.id, category_id, "draft article created");

        if let Err(err) = schedule_follow_ups(ctx, article_id, &question).await {
            if let Err(undo) = compensate_draft(pool, article_id).await {
                error!(?undo, article_id, "could not remove draft article");
            }
            return Err(err.context(format!("follow-up scheduling failed for article {}", article_id)));
        }
        report.created.push(article_id);
    }

    info!(created = report.created.len(), skipped = report.skipped, "generate-articles finished");
    Ok(report)
}

/// Generate and publish the body of an existing draft article.
#[instrument(skip_all, fields(article_id = payload.article_id, question_id = payload.source_question_id))]
pub async fn handle_generate_description(
    ctx: &TaskContext,
    payload: GenerateDescriptionPayload,
) -> Result<DescriptionOutcome> {
    let pool = &ctx.pool;
    let mut article = db::get_article(pool, payload.article_id)
        .await?
        .ok_or_else(|| anyhow!("article with id {} not found", payload.article_id))?;
    let question = db::get_question(pool, payload.source_question_id)
        .await?
        .ok_or_else(|| anyhow!("question with id {} not found", payload.source_question_id))?;

    let assembled = ctx
        .assembler
        .assemble(&question.text, &question.answer_summary, &question.page_contents)
        .await?;
    if assembled.is_empty() {
        info!("no content generated; article stays a draft");
        return Ok(DescriptionOutcome::LeftAsDraft);
    }

    article.reading_time_minutes = Some(reading_time_minutes(&assembled.html));
    article.body = assembled.html;
    article.is_published = true;
    article.publication_date = Some(Utc::now());
    db::update_article(pool, payload.article_id, &article).await?;
    info!(
        total_tokens = assembled.usage.total_tokens,
        llm_calls = assembled.llm_calls,
        "article published"
    );

    if let Err(err) = repair_article_headings(pool, payload.article_id).await {
        error!(?err, "cannot remove duplicate headings");
    }
    Ok(DescriptionOutcome::Published)
}

#[instrument(skip_all, fields(question_id = payload.question_id))]
pub async fn handle_mark_question_consumed(
    ctx: &TaskContext,
    payload: MarkQuestionConsumedPayload,
) -> Result<()> {
    let mut question = payload.question;
    question.fetched = true;
    db::update_question(&ctx.pool, payload.question_id, &question).await?;
    info!("question marked consumed");
    Ok(())
}

#[instrument(skip_all, fields(article_id = payload.article_id))]
pub async fn handle_repair_headings(ctx: &TaskContext, payload: RepairHeadingsPayload) -> Result<bool> {
    repair_article_headings(&ctx.pool, payload.article_id).await
}
