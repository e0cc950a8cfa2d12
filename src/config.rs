//! Configuration loader and validator for the article generation workers.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub llm: Llm,
    pub generation: Generation,
    pub queue: Queue,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_ms: u64,
    pub max_backoff_seconds: u64,
    pub workers: usize,
    #[serde(default = "default_true")]
    pub recover_stale_jobs: bool,
}

/// LLM provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Llm {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub grammar_model: String,
    pub retries_limit: u32,
    #[serde(default)]
    pub temperature: f32,
}

/// Content assembly and orchestration knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Generation {
    pub min_source_chars: usize,
    pub min_page_chars: usize,
    #[serde(default = "default_min_intro_chars")]
    pub min_intro_chars: usize,
    pub language: String,
    pub placeholder_body: String,
    pub author_id: i64,
    pub question_batch_limit: i64,
}

/// Retry and timeout policy per job family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Queue {
    pub name: String,
    pub generation_max_retry: i32,
    pub consume_max_retry: i32,
    pub generation_timeout_secs: u64,
    pub consume_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_min_intro_chars() -> usize {
    1000
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins; otherwise a SQLite file under `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/forge.db", self.app.data_dir))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.app.poll_interval_ms)
    }
}

impl Queue {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn consume_timeout(&self) -> Duration {
        Duration::from_secs(self.consume_timeout_secs)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - `LLM_API_KEY` overrides `llm.api_key` when set.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    if let Ok(key) = std::env::var("LLM_API_KEY") {
        if !key.trim().is_empty() {
            cfg.llm.api_key = key;
        }
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }
    if cfg.app.workers == 0 {
        return Err(ConfigError::Invalid("app.workers must be > 0"));
    }

    if cfg.llm.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("llm.api_key must be non-empty"));
    }
    if cfg.llm.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("llm.base_url must be non-empty"));
    }
    if cfg.llm.model.trim().is_empty() {
        return Err(ConfigError::Invalid("llm.model must be non-empty"));
    }
    if cfg.llm.grammar_model.trim().is_empty() {
        return Err(ConfigError::Invalid("llm.grammar_model must be non-empty"));
    }

    let g = &cfg.generation;
    if g.min_source_chars == 0 {
        return Err(ConfigError::Invalid("generation.min_source_chars must be > 0"));
    }
    if g.min_intro_chars == 0 {
        return Err(ConfigError::Invalid("generation.min_intro_chars must be > 0"));
    }
    if g.language.trim().is_empty() {
        return Err(ConfigError::Invalid("generation.language must be non-empty"));
    }
    if g.placeholder_body.trim().is_empty() {
        return Err(ConfigError::Invalid("generation.placeholder_body must be non-empty"));
    }
    if g.question_batch_limit <= 0 {
        return Err(ConfigError::Invalid("generation.question_batch_limit must be > 0"));
    }

    let q = &cfg.queue;
    if q.name.trim().is_empty() {
        return Err(ConfigError::Invalid("queue.name must be non-empty"));
    }
    if q.generation_max_retry < 0 || q.consume_max_retry < 0 {
        return Err(ConfigError::Invalid("queue.*_max_retry must be >= 0"));
    }
    if q.generation_timeout_secs == 0 || q.consume_timeout_secs == 0 {
        return Err(ConfigError::Invalid("queue.*_timeout_secs must be > 0"));
    }

    Ok(())
}

/// Returns a complete example YAML document.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_ms: 500
  max_backoff_seconds: 300
  workers: 2
  recover_stale_jobs: true

llm:
  api_key: "YOUR_LLM_API_KEY"
  base_url: "https://api.openai.com/"
  model: "gpt-4-turbo-preview"
  grammar_model: "gpt-3.5-turbo-16k"
  retries_limit: 1
  temperature: 0.0

generation:
  min_source_chars: 2000
  min_page_chars: 1000
  min_intro_chars: 1000
  language: "Polish"
  placeholder_body: "Content in preparation"
  author_id: 1
  question_batch_limit: 100

queue:
  name: "default"
  generation_max_retry: 2
  consume_max_retry: 20
  generation_timeout_secs: 7200
  consume_timeout_secs: 1800
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.queue.generation_max_retry, 2);
        assert_eq!(cfg.queue.consume_max_retry, 20);
        assert_eq!(cfg.queue.generation_timeout(), Duration::from_secs(2 * 60 * 60));
    }

    #[test]
    fn invalid_api_key() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.llm.api_key = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("llm.api_key")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_workers_and_models() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.workers = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("app.workers")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.llm.grammar_model = " ".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.queue.consume_timeout_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.generation.question_batch_limit = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn recover_stale_jobs_defaults_on() {
        let yaml = example().replace("  recover_stale_jobs: true\n", "");
        let cfg: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(cfg.app.recover_stale_jobs);
    }

    #[test]
    fn min_intro_chars_defaults_and_validates() {
        let yaml = example().replace("  min_intro_chars: 1000\n", "");
        let mut cfg: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(cfg.generation.min_intro_chars, 1000);
        cfg.generation.min_intro_chars = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.workers, 2);
        assert_eq!(cfg.generation.min_source_chars, 2000);
    }
}
