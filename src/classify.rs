//! LLM-backed category assignment for a source question.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::llm::{ChatMessage, LlmClient, LlmError};
use crate::model::{Category, SourceQuestion};

static CATEGORY_SENTINEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"---(\d+)---").expect("valid category sentinel regex"));

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("category response has no ---<id>--- marker: {0:?}")]
    MissingSentinel(String),
    #[error("category id out of range: {0}")]
    InvalidId(String),
    #[error("failed to serialize categories: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct CategoryRecord<'a> {
    id: i64,
    name: &'a str,
}

pub fn build_prompt(categories: &[Category], question: &SourceQuestion) -> Result<String, ClassifyError> {
    let records: Vec<CategoryRecord<'_>> = categories
        .iter()
        .map(|c| CategoryRecord {
            id: c.id,
            name: &c.name,
        })
        .collect();
    let listing = serde_json::to_string(&records)?;
    Ok(format!(
        "Categories (JSON): {listing}\n\
         Question: {question}\n\
         Answer summary: {summary}\n\
         Pick the single category this question belongs to. \
         Reply with its id wrapped as ---<id>--- (for example ---12---). \
         If no category fits, reply with ---0---.",
        question = question.text,
        summary = question.answer_summary,
    ))
}

/// Extract the category id from a model reply. `Ok(None)` means "no fit".
pub fn parse_category_id(reply: &str) -> Result<Option<i64>, ClassifyError> {
    let caps = CATEGORY_SENTINEL
        .captures(reply)
        .ok_or_else(|| ClassifyError::MissingSentinel(reply.to_string()))?;
    let digits = &caps[1];
    let id: i64 = digits
        .parse()
        .map_err(|_| ClassifyError::InvalidId(digits.to_string()))?;
    Ok((id != 0).then_some(id))
}

/// Ask the model which eligible category fits `question`.
#[instrument(skip_all, fields(question_id = question.id, eligible = categories.len()))]
pub async fn assign_category(
    llm: &LlmClient,
    categories: &[Category],
    question: &SourceQuestion,
) -> Result<Option<i64>, ClassifyError> {
    let prompt = build_prompt(categories, question)?;
    let reply = llm.ask(&[ChatMessage::user(prompt)], None).await?;
    let id = parse_category_id(&reply.text)?;
    debug!(?id, "category assigned");
    Ok(id)
}
