use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::http::{read_json, transport_error, HttpSettings};
use crate::SessionService;
use quill_types::{FileId, QuillError, Reply, Result, RunId, RunStatus, SessionId};

const SERVICE: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Local session state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    User,
    Assistant,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Turn {
    role: Role,
    text: String,
}

/// Conversation history per session and the outcome of every run.
#[derive(Debug, Default)]
struct Ledger {
    histories: HashMap<SessionId, Vec<Turn>>,
    runs: HashMap<RunId, RunStatus>,
}

// ---------------------------------------------------------------------------
// AnthropicClient
// ---------------------------------------------------------------------------

/// Session service backed by the Anthropic Messages API.
///
/// The API is stateless, so sessions live here: each session is a local
/// message history, and a run is one completion over that history. A run
/// is terminal as soon as `start_run` returns.
#[derive(Debug)]
pub struct AnthropicClient {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    system: Option<String>,
    ledger: Mutex<Ledger>,
    next_id: AtomicUsize,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: impl Into<String>, http: &HttpSettings) -> Result<Self> {
        Ok(Self {
            api_key,
            client: http.build_client()?,
            base_url: "https://api.anthropic.com".to_string(),
            model: model.into(),
            max_tokens: 2000,
            temperature: 0.7,
            system: None,
            ledger: Mutex::new(Ledger::default()),
            next_id: AtomicUsize::new(0),
        })
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// System prompt sent with every completion.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn ledger(&self) -> Result<std::sync::MutexGuard<'_, Ledger>> {
        self.ledger
            .lock()
            .map_err(|_| QuillError::Other("anthropic session state poisoned".into()))
    }

    fn history(&self, session: &SessionId) -> Result<Vec<Turn>> {
        self.ledger()?
            .histories
            .get(session)
            .cloned()
            .ok_or_else(|| unknown("session", session.as_str()))
    }

    fn build_request_body(&self, turns: &[Turn]) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": convert_turns(turns),
        });
        if let Some(system) = &self.system {
            body["system"] = json!([{
                "type": "text",
                "text": system,
                "cache_control": { "type": "ephemeral" }
            }]);
        }
        body
    }

    async fn complete(&self, turns: &[Turn]) -> Result<Option<String>> {
        let body = self.build_request_body(turns);
        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let json = read_json(SERVICE, resp).await?;
        Ok(parse_response_text(&json))
    }
}

fn unknown(kind: &str, id: &str) -> QuillError {
    QuillError::InvalidInput(format!("unknown {SERVICE} {kind} '{id}'"))
}

// ---------------------------------------------------------------------------
// Request translation and response parsing
// ---------------------------------------------------------------------------

/// History → Messages API turns. Consecutive turns of one role are merged;
/// a run that produced no reply leaves two user turns in a row.
fn convert_turns(turns: &[Turn]) -> Vec<serde_json::Value> {
    let mut merged: Vec<(Role, String)> = Vec::new();
    for turn in turns {
        match merged.last_mut() {
            Some((role, text)) if *role == turn.role => {
                text.push_str("\n\n");
                text.push_str(&turn.text);
            }
            _ => merged.push((turn.role, turn.text.clone())),
        }
    }
    merged
        .into_iter()
        .map(|(role, text)| json!({ "role": role.as_str(), "content": text }))
        .collect()
}

/// Concatenated text blocks of a Messages API response, if any.
fn parse_response_text(body: &serde_json::Value) -> Option<String> {
    if body["stop_reason"] == "max_tokens" {
        tracing::warn!(model = ?body["model"].as_str(), "Completion stopped at max_tokens");
    }
    let text: String = body["content"]
        .as_array()?
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

// ---------------------------------------------------------------------------
// SessionService implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl SessionService for AnthropicClient {
    fn name(&self) -> &str {
        SERVICE
    }

    /// Runs finish inside `start_run`; there is nothing to wait for.
    fn poll_interval(&self) -> Duration {
        Duration::ZERO
    }

    async fn create_session(&self) -> Result<SessionId> {
        let session = SessionId::new(self.next_id("session"));
        self.ledger()?.histories.insert(session.clone(), Vec::new());
        Ok(session)
    }

    async fn post_message(&self, session: &SessionId, text: &str) -> Result<()> {
        self.ledger()?
            .histories
            .get_mut(session)
            .ok_or_else(|| unknown("session", session.as_str()))?
            .push(Turn {
                role: Role::User,
                text: text.to_string(),
            });
        Ok(())
    }

    async fn start_run(&self, session: &SessionId) -> Result<RunId> {
        let history = self.history(session)?;
        let run = RunId::new(self.next_id("run"));
        let reply = self.complete(&history).await?;

        let mut ledger = self.ledger()?;
        let status = match reply {
            Some(text) => {
                if let Some(turns) = ledger.histories.get_mut(session) {
                    turns.push(Turn {
                        role: Role::Assistant,
                        text,
                    });
                }
                RunStatus::Completed
            }
            None => RunStatus::Failed,
        };
        tracing::debug!(session = %session, run = %run, status = status.as_str(), "Completion finished");
        ledger.runs.insert(run.clone(), status);
        Ok(run)
    }

    async fn run_status(&self, _session: &SessionId, run: &RunId) -> Result<RunStatus> {
        self.ledger()?
            .runs
            .get(run)
            .copied()
            .ok_or_else(|| unknown("run", run.as_str()))
    }

    async fn latest_reply(&self, session: &SessionId) -> Result<Option<Reply>> {
        let ledger = self.ledger()?;
        let turns = ledger
            .histories
            .get(session)
            .ok_or_else(|| unknown("session", session.as_str()))?;
        Ok(turns
            .last()
            .filter(|turn| turn.role == Role::Assistant)
            .map(|turn| Reply::text(turn.text.clone())))
    }

    async fn fetch_file(&self, file: &FileId) -> Result<Vec<u8>> {
        Err(QuillError::ServiceError {
            service: SERVICE.into(),
            status: 404,
            message: format!("completions produce no files (requested '{file}')"),
            retryable: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
