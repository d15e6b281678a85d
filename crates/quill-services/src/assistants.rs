use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::http::{read_bytes, read_json, transport_error, HttpSettings};
use crate::SessionService;
use quill_types::{FileId, QuillError, Reply, Result, RunId, RunStatus, SessionId};

const SERVICE: &str = "openai";

// ---------------------------------------------------------------------------
// AssistantSpec
// ---------------------------------------------------------------------------

/// Parameters for creating an assistant when none is configured.
#[derive(Debug, Clone)]
pub struct AssistantSpec {
    pub name: String,
    pub model: String,
    pub instructions: String,
    /// Files made available to the code interpreter tool.
    pub file_ids: Vec<FileId>,
}

// ---------------------------------------------------------------------------
// AssistantsClient
// ---------------------------------------------------------------------------

/// Session service backed by the OpenAI Assistants v2 API
/// (threads, messages, runs, files).
#[derive(Debug, Clone)]
pub struct AssistantsClient {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    assistant_id: Option<String>,
    poll_interval: Duration,
}

impl AssistantsClient {
    pub fn new(api_key: String, http: &HttpSettings) -> Result<Self> {
        Ok(Self {
            api_key,
            client: http.build_client()?,
            base_url: "https://api.openai.com".to_string(),
            assistant_id: None,
            poll_interval: Duration::from_secs(10),
        })
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_assistant(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = Some(assistant_id.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn assistant_id(&self) -> Option<&str> {
        self.assistant_id.as_deref()
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/v1/{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send_json(&self, builder: reqwest::RequestBuilder) -> Result<serde_json::Value> {
        let resp = builder
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        read_json(SERVICE, resp).await
    }

    /// Upload a local file for use by assistants and return its id.
    pub async fn upload_file(&self, path: &Path, purpose: &str) -> Result<FileId> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        tracing::info!(file = %path.display(), purpose, "Uploading file");

        let form = reqwest::multipart::Form::new()
            .text("purpose", purpose.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        let body = self
            .send_json(self.request(reqwest::Method::POST, "files").multipart(form))
            .await?;
        Ok(FileId::new(required_str(&body, "id")?))
    }

    /// Create an assistant and bind this client to it.
    pub async fn create_assistant(&mut self, spec: &AssistantSpec) -> Result<String> {
        let body = build_assistant_body(spec);
        let resp = self
            .send_json(self.request(reqwest::Method::POST, "assistants").json(&body))
            .await?;
        let id = required_str(&resp, "id")?.to_string();
        tracing::info!(assistant = %id, model = %spec.model, "Assistant created");
        self.assistant_id = Some(id.clone());
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Body builders and parsers
// ---------------------------------------------------------------------------

fn build_assistant_body(spec: &AssistantSpec) -> serde_json::Value {
    let file_ids: Vec<&str> = spec.file_ids.iter().map(|f| f.as_str()).collect();
    json!({
        "name": spec.name,
        "model": spec.model,
        "instructions": spec.instructions,
        "tools": [{ "type": "file_search" }, { "type": "code_interpreter" }],
        "tool_resources": {
            "code_interpreter": { "file_ids": file_ids }
        }
    })
}

fn required_str<'a>(body: &'a serde_json::Value, field: &str) -> Result<&'a str> {
    body[field]
        .as_str()
        .ok_or_else(|| QuillError::MalformedResponse {
            service: SERVICE.into(),
            message: format!("response has no '{field}'"),
        })
}

/// Pick the newest assistant message from a message list and read its
/// first content block.
fn parse_latest_reply(body: &serde_json::Value) -> Option<Reply> {
    let message = body["data"]
        .as_array()?
        .iter()
        .find(|m| m["role"] == "assistant")?;
    let block = message["content"].as_array()?.first()?;
    match block["type"].as_str() {
        Some("image_file") => block["image_file"]["file_id"].as_str().map(Reply::media),
        Some("text") => block["text"]["value"].as_str().map(Reply::text),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// SessionService implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl SessionService for AssistantsClient {
    fn name(&self) -> &str {
        SERVICE
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    async fn create_session(&self) -> Result<SessionId> {
        let body = self
            .send_json(self.request(reqwest::Method::POST, "threads").json(&json!({})))
            .await?;
        Ok(SessionId::new(required_str(&body, "id")?))
    }

    async fn post_message(&self, session: &SessionId, text: &str) -> Result<()> {
        let path = format!("threads/{session}/messages");
        self.send_json(
            self.request(reqwest::Method::POST, &path)
                .json(&json!({ "role": "user", "content": text })),
        )
        .await?;
        Ok(())
    }

    async fn start_run(&self, session: &SessionId) -> Result<RunId> {
        let assistant_id = self
            .assistant_id
            .as_deref()
            .ok_or_else(|| QuillError::Config("no assistant configured".into()))?;
        let path = format!("threads/{session}/runs");
        let body = self
            .send_json(
                self.request(reqwest::Method::POST, &path)
                    .json(&json!({ "assistant_id": assistant_id })),
            )
            .await?;
        Ok(RunId::new(required_str(&body, "id")?))
    }

    async fn run_status(&self, session: &SessionId, run: &RunId) -> Result<RunStatus> {
        let path = format!("threads/{session}/runs/{run}");
        let body = self
            .send_json(self.request(reqwest::Method::GET, &path))
            .await?;
        Ok(RunStatus::from_api(required_str(&body, "status")?))
    }

    async fn latest_reply(&self, session: &SessionId) -> Result<Option<Reply>> {
        let path = format!("threads/{session}/messages?order=desc&limit=10");
        let body = self
            .send_json(self.request(reqwest::Method::GET, &path))
            .await?;
        Ok(parse_latest_reply(&body))
    }

    async fn fetch_file(&self, file: &FileId) -> Result<Vec<u8>> {
        let path = format!("files/{file}/content");
        let resp = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        read_bytes(SERVICE, resp).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
