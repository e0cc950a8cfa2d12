use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutlineError {
    #[error("outline reply contains no JSON object: {0:?}")]
    NoObject(String),
    #[error("invalid outline JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One `<h2>` section and the `<h3>` titles it must cover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    #[serde(default)]
    pub subtitles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Outline {
    #[serde(default)]
    pub main_title: String,
    #[serde(rename = "subtitles", default)]
    pub sections: Vec<Section>,
}

impl Outline {
    /// Parse a model reply. Markdown code fences or chatter around the JSON
    /// object are tolerated; anything else is an error.
    pub fn parse(reply: &str) -> Result<Self, OutlineError> {
        let start = reply.find('{');
        let end = reply.rfind('}');
        let json = match (start, end) {
            (Some(s), Some(e)) if s < e => &reply[s..=e],
            _ => return Err(OutlineError::NoObject(reply.to_string())),
        };
        Ok(serde_json::from_str(json)?)
    }

}
