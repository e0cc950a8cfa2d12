use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scraped text from one source URL of a [`SourceQuestion`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    pub source_id: i64,
    pub href: String,
    pub raw_text: String,
    pub processed_text: String,
}

/// Externally harvested topic unit consumed to produce one article.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceQuestion {
    pub id: i64,
    pub text: String,
    pub answer_summary: String,
    pub category_id: i64,
    pub fetched: bool,
    #[serde(default)]
    pub page_contents: Vec<PageContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub weight: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub thumbnail_id: Option<i64>,
    pub category_id: i64,
    pub domain_id: i64,
    pub author_id: i64,
    pub featured: bool,
    pub reading_time_minutes: Option<i64>,
    pub is_published: bool,
    pub publication_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a draft article; ids and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArticle {
    pub title: String,
    pub slug: String,
    pub body: String,
    pub thumbnail_id: Option<i64>,
    pub category_id: i64,
    pub domain_id: i64,
    pub author_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateArticlesPayload {
    pub domain_id: i64,
    pub count: i64,
    pub source_category_id: i64,
    pub image_category_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateDescriptionPayload {
    pub article_id: i64,
    pub source_question_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarkQuestionConsumedPayload {
    pub question_id: i64,
    pub question: SourceQuestion,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepairHeadingsPayload {
    pub article_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobKind {
    GenerateArticles,
    GenerateDescription,
    MarkQuestionConsumed,
    RepairHeadings,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::GenerateArticles => "article:generate-articles",
            JobKind::GenerateDescription => "article:generate-description",
            JobKind::MarkQuestionConsumed => "question:mark-consumed",
            JobKind::RepairHeadings => "article:repair-headings",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "article:generate-articles" => Some(JobKind::GenerateArticles),
            "article:generate-description" => Some(JobKind::GenerateDescription),
            "question:mark-consumed" => Some(JobKind::MarkQuestionConsumed),
            "article:repair-headings" => Some(JobKind::RepairHeadings),
            _ => None,
        }
    }
}

/// Lifecycle of a queued job: `Pending -> Active -> {Completed | Retry -> Active | Archived}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Active,
    Retry,
    Completed,
    Archived,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Active => "active",
            JobState::Retry => "retry",
            JobState::Completed => "completed",
            JobState::Archived => "archived",
        }
    }

    pub fn parse_state(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "active" => Some(JobState::Active),
            "retry" => Some(JobState::Retry),
            "completed" => Some(JobState::Completed),
            "archived" => Some(JobState::Archived),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_kind_round_trips_through_str() {
        for kind in [
            JobKind::GenerateArticles,
            JobKind::GenerateDescription,
            JobKind::MarkQuestionConsumed,
            JobKind::RepairHeadings,
        ] {
            assert_eq!(JobKind::parse_kind(kind.as_str()), Some(kind));
        }
        assert_eq!(JobKind::parse_kind("push_batch"), None);
    }

    #[test]
    fn payloads_use_camel_case_wire_names() {
        let payload = GenerateArticlesPayload {
            domain_id: 1,
            count: 5,
            source_category_id: 7,
            image_category_id: 0,
        };
        let value = serde_json::to_value(payload).unwrap();
        assert_eq!(value["domainId"], 1);
        assert_eq!(value["sourceCategoryId"], 7);
        assert_eq!(value["imageCategoryId"], 0);
    }
}
