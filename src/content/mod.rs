//! Multi-stage article body generation.
//!
//! Stages run strictly in order, one LLM call at a time:
//! insufficiency check, outline, per-page summaries, introduction,
//! `<h2>` sections and their `<h3>` sub-sections, then `<h1>` stripping.
//! Every rendered fragment goes through a grammar pass before it is kept.

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::llm::{ChatMessage, LlmClient, LlmError, TokenUsage};
use crate::model::PageContent;

pub mod html;
pub mod outline;
pub mod prompts;

pub use outline::{Outline, OutlineError, Section};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Outline(#[from] OutlineError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblySettings {
    pub grammar_model: String,
    pub min_source_chars: usize,
    pub min_page_chars: usize,
    pub min_intro_chars: usize,
    pub language: String,
}

impl AssemblySettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            grammar_model: cfg.llm.grammar_model.clone(),
            min_source_chars: cfg.generation.min_source_chars,
            min_page_chars: cfg.generation.min_page_chars,
            min_intro_chars: cfg.generation.min_intro_chars,
            language: cfg.generation.language.clone(),
        }
    }
}

/// Result of one assembly run. `html` is empty when the source text was too short.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembled {
    pub html: String,
    pub usage: TokenUsage,
    pub llm_calls: usize,
}

impl Assembled {
    pub fn is_empty(&self) -> bool {
        self.html.trim().is_empty()
    }
}

#[derive(Default)]
struct RunStats {
    usage: TokenUsage,
    calls: usize,
}

/// Body text plus the prompt that produced it; the context for the next `<h3>`.
struct Anchor {
    prompt: String,
    output: String,
}

pub fn contains_rejection(reply: &str) -> bool {
    reply.contains(prompts::REJECT_SENTINEL)
}

#[derive(Clone)]
pub struct ContentAssembler {
    llm: LlmClient,
    settings: AssemblySettings,
}

impl ContentAssembler {
    pub fn new(llm: LlmClient, settings: AssemblySettings) -> Self {
        Self { llm, settings }
    }

    async fn call(
        &self,
        stats: &mut RunStats,
        messages: &[ChatMessage],
        model: Option<&str>,
    ) -> Result<String, GenerationError> {
        let completion = self.llm.ask(messages, model).await?;
        stats.usage += completion.usage;
        stats.calls += 1;
        Ok(completion.text)
    }

    async fn correct(&self, stats: &mut RunStats, text: &str) -> Result<String, GenerationError> {
        let prompt = prompts::grammar(text, &self.settings.language);
        self.call(
            stats,
            &[ChatMessage::user(prompt)],
            Some(&self.settings.grammar_model),
        )
        .await
    }

    /// Generate the HTML body for `title` from the scraped `pages`.
    #[instrument(skip_all, fields(title = %title, pages = pages.len()))]
    pub async fn assemble(
        &self,
        title: &str,
        answer_summary: &str,
        pages: &[PageContent],
    ) -> Result<Assembled, GenerationError> {
        let normalized: Vec<String> = pages
            .iter()
            .map(|p| html::normalize_whitespace(&p.processed_text))
            .collect();
        let source_text = normalized.join("\n\n");
        let source_len = source_text.chars().count();
        if source_len < self.settings.min_source_chars {
            info!(
                source_len,
                min = self.settings.min_source_chars,
                "not enough page content to generate"
            );
            return Ok(Assembled::default());
        }

        let language = self.settings.language.as_str();
        let mut stats = RunStats::default();
        let mut body = String::new();

        // Outline, seeded with the whole source text.
        let mut messages = vec![
            ChatMessage::system(source_text),
            ChatMessage::user(prompts::outline(title, answer_summary)),
        ];
        let outline_raw = self.call(&mut stats, &messages, None).await?;
        let outline = Outline::parse(&outline_raw)?;
        debug!(sections = outline.sections.len(), "outline parsed");
        messages.push(ChatMessage::system(outline_raw.clone()));

        // Summaries replace the raw source as shared context.
        let mut summaries = Vec::new();
        for page in normalized
            .iter()
            .filter(|p| p.chars().count() >= self.settings.min_page_chars)
        {
            let prompt = [
                ChatMessage::system(page.clone()),
                ChatMessage::user(prompts::summary(&outline_raw, language)),
            ];
            summaries.push(self.call(&mut stats, &prompt, None).await?);
        }
        let summary_msg = ChatMessage::system(format!("Summary: {}", summaries.join("\n\n")));
        messages[0] = summary_msg.clone();

        // Introduction.
        messages.push(ChatMessage::user(prompts::introduction(
            title,
            &outline.sections,
            language,
            self.settings.min_intro_chars,
        )));
        let intro = self.call(&mut stats, &messages, None).await?;
        let intro = self.correct(&mut stats, &intro).await?;
        body.push_str(&intro);

        for section in &outline.sections {
            let section_prompt = prompts::section(section, language);
            let lvl2 = [
                summary_msg.clone(),
                ChatMessage::system(intro.clone()),
                ChatMessage::user(section_prompt.clone()),
            ];
            let reply = self.call(&mut stats, &lvl2, None).await?;
            if contains_rejection(&reply) {
                info!(section = %section.title, "section rejected by model; skipping");
                continue;
            }
            let corrected = self.correct(&mut stats, &reply).await?;
            body.push_str(&corrected);

            let mut anchor = Anchor {
                prompt: section_prompt,
                output: corrected,
            };
            for subtitle in &section.subtitles {
                let sub_prompt = prompts::subsection(&section.title, subtitle, language);
                let lvl3 = [
                    summary_msg.clone(),
                    ChatMessage::user(anchor.prompt.clone()),
                    ChatMessage::assistant(anchor.output.clone()),
                    ChatMessage::user(sub_prompt.clone()),
                ];
                let reply = self.call(&mut stats, &lvl3, None).await?;
                if contains_rejection(&reply) {
                    info!(subsection = %subtitle, "sub-section rejected by model; skipping");
                    continue;
                }
                let corrected = self.correct(&mut stats, &reply).await?;
                body.push_str(&corrected);
                anchor = Anchor {
                    prompt: sub_prompt,
                    output: corrected,
                };
            }
        }

        info!(
            llm_calls = stats.calls,
            prompt_tokens = stats.usage.prompt_tokens,
            completion_tokens = stats.usage.completion_tokens,
            total_tokens = stats.usage.total_tokens,
            "content assembled"
        );

        Ok(Assembled {
            html: html::strip_h1(&body),
            usage: stats.usage,
            llm_calls: stats.calls,
        })
    }
}
