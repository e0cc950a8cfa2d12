#![allow(dead_code)]

use anyhow::{anyhow, Result};
use article_forge::config::{self, Config};
use article_forge::db::{self, Pool};
use article_forge::llm::{ChatMessage, ChatProvider, Completion, LlmClient, LlmError, Role, TokenUsage};
use article_forge::model::JobKind;
use article_forge::queue::{JobOptions, JobProducer};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const GRAMMAR_MODEL: &str = "gpt-3.5-turbo-16k";

pub async fn setup_pool() -> Pool {
    let pool = db::init_pool("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

pub fn test_config() -> Config {
    let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.llm.api_key = "test-key".into();
    cfg.app.max_backoff_seconds = 0;
    cfg
}

#[derive(Debug, Clone)]
pub struct LlmCall {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl LlmCall {
    pub fn last_content(&self) -> &str {
        self.messages.last().map(|m| m.content.as_str()).unwrap_or("")
    }

    pub fn is_grammar(&self) -> bool {
        self.model == GRAMMAR_MODEL
    }
}

type Responder = Box<dyn Fn(&LlmCall) -> Result<String, LlmError> + Send + Sync>;

/// Scripted chat provider. Queued responses are used first, then the responder.
pub struct RecordingLlm {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Responder,
    calls: Mutex<Vec<LlmCall>>,
}

impl RecordingLlm {
    pub fn with_responder(
        responder: impl Fn(&LlmCall) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue `responses` ahead of the responder.
    pub fn with_script(mut self, responses: Vec<Result<String, LlmError>>) -> Self {
        self.responses = Mutex::new(VecDeque::from(responses));
        self
    }

    pub async fn calls(&self) -> Vec<LlmCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ChatProvider for RecordingLlm {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<Completion, LlmError> {
        let call = LlmCall {
            model: model.to_string(),
            messages: messages.to_vec(),
        };
        self.calls.lock().await.push(call.clone());
        let scripted = self.responses.lock().await.pop_front();
        let text = match scripted {
            Some(res) => res?,
            None => (self.responder)(&call)?,
        };
        Ok(Completion {
            text,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
        })
    }
}

pub fn llm_client(provider: Arc<RecordingLlm>, retries_limit: u32) -> LlmClient {
    LlmClient::new(provider, "gpt-4-turbo-preview", retries_limit)
}

fn heading_after<'a>(prompt: &'a str, marker: &str) -> Option<&'a str> {
    let start = prompt.find(marker)? + marker.len();
    let rest = &prompt[start..];
    Some(rest.split('\n').next().unwrap_or(rest).trim())
}

/// Answers every stage of article assembly. Section or sub-section titles in
/// `reject` get the rejection marker; grammar calls echo their input.
pub fn article_responder(
    outline_json: &'static str,
    reject: &'static [&'static str],
) -> impl Fn(&LlmCall) -> Result<String, LlmError> + Send + Sync + 'static {
    move |call: &LlmCall| {
        let prompt = call.last_content();
        if call.is_grammar() {
            let text = prompt
                .split_once("Text to correct:\n\n")
                .map(|(_, t)| t)
                .unwrap_or(prompt);
            return Ok(text.to_string());
        }
        if prompt.starts_with("The main heading will be") {
            return Ok(outline_json.to_string());
        }
        if prompt.contains("write a summary") {
            return Ok("page summary".to_string());
        }
        if prompt.contains("Write a short introduction") {
            return Ok("<h1>Title</h1><p>Intro text.</p>".to_string());
        }
        if let Some(title) = heading_after(prompt, "Expand the given heading: ") {
            if reject.contains(&title) {
                return Ok("---reject---".to_string());
            }
            let tag = if prompt.contains("in an <h2> tag") { "h2" } else { "h3" };
            return Ok(format!("<{tag}>{title}</{tag}><p>About {title}.</p>"));
        }
        Err(LlmError::InvalidResponse(format!("unexpected prompt: {prompt}")))
    }
}

pub fn count_role(call: &LlmCall, role: Role) -> usize {
    call.messages.iter().filter(|m| m.role == role).count()
}

/// Producer that records enqueues and fails the n-th one (1-based).
pub struct FailingProducer {
    fail_on: usize,
    pub enqueued: Mutex<Vec<(JobKind, String)>>,
}

impl FailingProducer {
    pub fn failing_on(fail_on: usize) -> Self {
        Self {
            fail_on,
            enqueued: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl JobProducer for FailingProducer {
    async fn enqueue(&self, kind: JobKind, payload: String, _opts: JobOptions) -> Result<String> {
        let mut guard = self.enqueued.lock().await;
        if guard.len() + 1 == self.fail_on {
            return Err(anyhow!("queue unavailable"));
        }
        guard.push((kind, payload));
        Ok(format!("job-{}", guard.len()))
    }
}

pub fn long_text(words: usize, seed: &str) -> String {
    (0..words)
        .map(|i| format!("{seed}{i}"))
        .collect::<Vec<_>>()
        .join("  \n ")
}

pub struct Seeded {
    pub domain_id: i64,
    pub category_ids: Vec<i64>,
    pub image_category_id: i64,
    pub image_id: i64,
}

/// One domain with the given categories, plus an image category holding one image.
pub async fn seed_domain(pool: &Pool, categories: &[(&str, &str)]) -> Seeded {
    let domain_id: i64 = sqlx::query_scalar("INSERT INTO domains (name) VALUES ('example.com') RETURNING id")
        .fetch_one(pool)
        .await
        .unwrap();
    let mut category_ids = Vec::new();
    for &(name, slug) in categories {
        let id: i64 = sqlx::query_scalar("INSERT INTO categories (name, slug) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(slug)
            .fetch_one(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO categories_domains (category_id, domain_id) VALUES (?, ?)")
            .bind(id)
            .bind(domain_id)
            .execute(pool)
            .await
            .unwrap();
        category_ids.push(id);
    }
    let image_category_id: i64 =
        sqlx::query_scalar("INSERT INTO image_categories (name) VALUES ('stock') RETURNING id")
            .fetch_one(pool)
            .await
            .unwrap();
    let image_id: i64 =
        sqlx::query_scalar("INSERT INTO images (category_id, path) VALUES (?, 'a.jpg') RETURNING id")
            .bind(image_category_id)
            .fetch_one(pool)
            .await
            .unwrap();
    Seeded {
        domain_id,
        category_ids,
        image_category_id,
        image_id,
    }
}

pub async fn seed_articles(pool: &Pool, domain_id: i64, category_id: i64, n: usize) {
    for i in 0..n {
        sqlx::query(
            "INSERT INTO articles (title, slug, body, category_id, domain_id, author_id) VALUES (?, ?, 'x', ?, ?, 1)",
        )
        .bind(format!("existing {i}"))
        .bind(format!("existing-{category_id}-{i}"))
        .bind(category_id)
        .bind(domain_id)
        .execute(pool)
        .await
        .unwrap();
    }
}

pub async fn seed_question(pool: &Pool, source_category_id: i64, text: &str, pages: &[String]) -> i64 {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO source_questions (text, answer_summary, category_id) VALUES (?, 'short answer', ?) RETURNING id",
    )
    .bind(text)
    .bind(source_category_id)
    .fetch_one(pool)
    .await
    .unwrap();
    for (i, page) in pages.iter().enumerate() {
        sqlx::query("INSERT INTO page_contents (question_id, href, raw_text, processed_text) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(format!("https://source/{i}"))
            .bind(page)
            .bind(page)
            .execute(pool)
            .await
            .unwrap();
    }
    id
}

pub async fn question_fetched(pool: &Pool, id: i64) -> bool {
    sqlx::query_scalar("SELECT fetched FROM source_questions WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn job_kinds(pool: &Pool) -> Vec<String> {
    sqlx::query_scalar("SELECT kind FROM jobs ORDER BY rowid")
        .fetch_all(pool)
        .await
        .unwrap()
}
