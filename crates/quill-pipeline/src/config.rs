//! Content configuration bundle and pipeline settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use quill_types::{QuillError, Result};
use serde_json::{Map, Value};

use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// SessionBackend
// ---------------------------------------------------------------------------

/// The conversational service behind the session stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionBackend {
    /// OpenAI Assistants threads and runs.
    #[default]
    Assistants,
    /// Anthropic Messages with locally kept history.
    Anthropic,
}

// ---------------------------------------------------------------------------
// ContentConfig
// ---------------------------------------------------------------------------

/// The JSON key/value bundle describing the business, the API keys, and the
/// reference files. Unknown keys are kept and ignored.
#[derive(Debug, Clone, Default)]
pub struct ContentConfig {
    values: Map<String, Value>,
}

impl ContentConfig {
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(QuillError::Config(
                "configuration must be a JSON object".into(),
            )),
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            QuillError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// A string value. Numbers and booleans are rendered as text.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| QuillError::Config(format!("missing required key '{key}'")))
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.values.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// An API key from the bundle, falling back to the environment variable
    /// of the same name.
    pub fn api_key(&self, key: &str) -> Result<String> {
        self.get(key)
            .or_else(|| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                QuillError::Config(format!(
                    "API key '{key}' is neither in the configuration nor the environment"
                ))
            })
    }

    pub fn path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    /// Certificate verification, on unless the bundle says otherwise.
    pub fn verify_tls(&self) -> bool {
        self.get_bool("verify_tls").unwrap_or(true)
    }

    pub fn perplexity_model(&self) -> String {
        self.get_or("perplexity_model", "sonar")
    }

    pub fn assistant_model(&self) -> String {
        self.get_or("assistant_model", "gpt-4o")
    }

    /// The `backend` key: `assistants` (default, alias `openai`) or
    /// `anthropic` (alias `claude`).
    pub fn session_backend(&self) -> Result<SessionBackend> {
        match self.get("backend").map(|b| b.trim().to_ascii_lowercase()).as_deref() {
            None | Some("assistants") | Some("openai") => Ok(SessionBackend::Assistants),
            Some("anthropic") | Some("claude") => Ok(SessionBackend::Anthropic),
            Some(other) => Err(QuillError::Config(format!(
                "unknown backend '{other}', expected 'assistants' or 'anthropic'"
            ))),
        }
    }

    pub fn claude_model(&self) -> String {
        self.get_or("claude_model", "claude-sonnet-4-5-20250929")
    }

    pub fn claude_max_tokens(&self) -> u32 {
        self.get_u64("claude_max_tokens")
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(2000)
    }

    /// Reference files attached to a newly created assistant, in a fixed order.
    pub fn reference_files(&self) -> Vec<PathBuf> {
        [
            "path_to_links_file",
            "path_to_plan_csv",
            "path_to_example_file_1",
            "path_to_example_file_2",
            "path_to_website_images",
        ]
        .iter()
        .filter_map(|key| self.path(key))
        .collect()
    }
}

// ---------------------------------------------------------------------------
// PipelineSettings
// ---------------------------------------------------------------------------

/// Runtime knobs for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Maximum number of items processed at once.
    pub concurrency: usize,
    /// Budget for one run of the session service to reach a terminal state.
    pub run_budget: Duration,
    pub poll_interval: Duration,
    pub research_policy: RetryPolicy,
    pub session_policy: RetryPolicy,
    pub media_policy: RetryPolicy,
    /// Number of visualization attempts per item.
    pub visualization_attempts: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            run_budget: Duration::from_secs(1000),
            poll_interval: Duration::from_secs(10),
            research_policy: RetryPolicy::research_default(),
            session_policy: RetryPolicy::session_default(),
            media_policy: RetryPolicy::media_default(),
            visualization_attempts: 3,
        }
    }
}

impl PipelineSettings {
    /// Defaults overridden by the optional numeric keys of the bundle.
    pub fn from_config(config: &ContentConfig) -> Self {
        let default = Self::default();
        Self {
            concurrency: config
                .get_u64("concurrency")
                .map(|n| n.max(1) as usize)
                .unwrap_or(default.concurrency),
            run_budget: config
                .get_u64("run_timeout_secs")
                .map(Duration::from_secs)
                .unwrap_or(default.run_budget),
            poll_interval: config
                .get_u64("poll_interval_secs")
                .map(Duration::from_secs)
                .unwrap_or(default.poll_interval),
            ..default
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}
