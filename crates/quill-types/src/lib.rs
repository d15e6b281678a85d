//! Shared types, errors, and per-item data model for the Quill batch pipeline.
//!
//! This crate provides the foundational types used across all other Quill crates:
//! - `QuillError`: unified error taxonomy
//! - `WorkItem`: one keyword to turn into one article
//! - `Artifacts`: the per-item state threaded through the stage chain
//! - `BatchResult`: immutable terminal outcome of one item
//! - session handles (`SessionId`, `RunId`, `FileId`) and run/reply shapes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unified error type for all Quill subsystems.
#[derive(Debug, thiserror::Error)]
pub enum QuillError {
    // === Remote Service Errors ===
    #[error("Service {service} returned HTTP {status}: {message}")]
    ServiceError {
        service: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {service}{}", retry_hint(.retry_after_ms))]
    RateLimited {
        service: String,
        /// Wait requested by the server, when it sent one.
        retry_after_ms: Option<u64>,
    },

    #[error("Authentication failed for service {service}")]
    AuthError { service: String },

    #[error("Malformed response from {service}: {message}")]
    MalformedResponse { service: String, message: String },

    // === Session Run Errors ===
    #[error("Run ended with status '{status}'")]
    RunFailed { status: String },

    #[error("Run did not reach a terminal state within {budget_ms}ms")]
    TimeoutExceeded { budget_ms: u64 },

    // === Pipeline Errors ===
    #[error("Retries exhausted for '{call}' after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        call: String,
        attempts: usize,
        last_error: String,
    },

    #[error("Required artifact '{artifact}' is missing")]
    MissingArtifact { artifact: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Other(String),
}

impl QuillError {
    /// Returns `true` if the error is transient and the call may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QuillError::RateLimited { .. }
                | QuillError::RunFailed { .. }
                | QuillError::ServiceError { retryable: true, .. }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QuillError::AuthError { .. }
                | QuillError::ExhaustedRetries { .. }
                | QuillError::TimeoutExceeded { .. }
                | QuillError::MissingArtifact { .. }
                | QuillError::Config(_)
        )
    }

    /// The wait the server asked for, if any. Overrides computed backoff.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            QuillError::RateLimited {
                retry_after_ms: Some(ms),
                ..
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    /// Undecodable replies are treated as a missing artifact, never retried.
    pub fn is_malformed(&self) -> bool {
        matches!(self, QuillError::MalformedResponse { .. })
    }
}

fn retry_hint(retry_after_ms: &Option<u64>) -> String {
    match retry_after_ms {
        Some(ms) => format!(", retry after {ms}ms"),
        None => String::new(),
    }
}

/// A convenience alias for `Result<T, QuillError>`.
pub type Result<T> = std::result::Result<T, QuillError>;

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// One keyword to be converted into one article. Identity is the input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: usize,
    pub keyword: String,
}

impl WorkItem {
    pub fn new(id: usize, keyword: impl Into<String>) -> Self {
        Self {
            id,
            keyword: keyword.into(),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} '{}'", self.id, self.keyword)
    }
}

// ---------------------------------------------------------------------------
// Session handles
// ---------------------------------------------------------------------------

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

handle!(
    /// Handle to a remote conversational session (one per work item).
    SessionId
);
handle!(
    /// Handle to one run of the assistant over a session.
    RunId
);
handle!(
    /// Handle to a file stored by the session service.
    FileId
);

// ---------------------------------------------------------------------------
// RunStatus / RunOutcome / Reply
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
}

impl RunStatus {
    /// Parse the wire status string. Unknown values are treated as still running.
    pub fn from_api(status: &str) -> Self {
        match status {
            "queued" => RunStatus::Queued,
            "requires_action" => RunStatus::RequiresAction,
            "cancelling" => RunStatus::Cancelling,
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            "cancelled" => RunStatus::Cancelled,
            "expired" => RunStatus::Expired,
            "incomplete" => RunStatus::Incomplete,
            _ => RunStatus::InProgress,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Expired
                | RunStatus::Incomplete
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
        }
    }
}

/// Terminal state of one awaited run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
}

/// The most recent assistant reply on a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Text { text: String },
    Media { file_id: FileId },
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text { text: text.into() }
    }

    pub fn media(file_id: impl Into<String>) -> Self {
        Reply::Media {
            file_id: FileId::new(file_id),
        }
    }

    /// The reply text, if this is a non-blank text reply.
    pub fn into_text(self) -> Option<String> {
        match self {
            Reply::Text { text } if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Artifacts: per-item scoped state
// ---------------------------------------------------------------------------

/// Output of the research service for one keyword.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResearchDocument {
    pub content: String,
    pub citations: Vec<String>,
}

impl ResearchDocument {
    /// Flatten the document into prompt text with numbered sources.
    pub fn to_prompt_text(&self) -> String {
        if self.citations.is_empty() {
            return self.content.clone();
        }
        let sources: Vec<String> = self
            .citations
            .iter()
            .enumerate()
            .map(|(i, url)| format!("[{}] {}", i + 1, url))
            .collect();
        format!("{}\n\nSources:\n{}", self.content, sources.join("\n"))
    }
}

/// A hosted image URL produced by the media host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(pub String);

impl MediaRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn url(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Curated links and brand images for one keyword.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkSet {
    /// The reply as returned by the session service.
    pub text: String,
    /// URLs found in `text`, in order of appearance, without duplicates.
    pub urls: Vec<String>,
}

/// Per-item artifacts. Owned by exactly one runner and lent to each stage in turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artifacts {
    pub research: Option<ResearchDocument>,
    pub visualizations: Vec<MediaRef>,
    pub links: Option<LinkSet>,
    pub outline: Option<String>,
    pub article: Option<String>,
}

impl Artifacts {
    /// Maximum number of visualizations kept per item.
    pub const MAX_VISUALIZATIONS: usize = 3;

    pub fn outline_text(&self) -> Option<&str> {
        self.outline
            .as_deref()
            .filter(|outline| !outline.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// BatchResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded,
    Failed,
}

impl ItemStatus {
    /// Value written to the `Processed` column.
    pub fn processed_label(self) -> &'static str {
        match self {
            ItemStatus::Succeeded => "Yes",
            ItemStatus::Failed => "Failed",
        }
    }
}

/// Terminal outcome of one work item. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub id: usize,
    pub keyword: String,
    pub outline: String,
    pub article: String,
    pub status: ItemStatus,
    pub failure_reason: Option<String>,
}

impl BatchResult {
    pub fn succeeded(item: &WorkItem, outline: String, article: String) -> Self {
        Self {
            id: item.id,
            keyword: item.keyword.clone(),
            outline,
            article,
            status: ItemStatus::Succeeded,
            failure_reason: None,
        }
    }

    /// A failed result. Outline and article are always empty.
    pub fn failed(item: &WorkItem, reason: impl Into<String>) -> Self {
        Self {
            id: item.id,
            keyword: item.keyword.clone(),
            outline: String::new(),
            article: String::new(),
            status: ItemStatus::Failed,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_service_error() {
        let err = QuillError::ServiceError {
            service: "perplexity".into(),
            status: 500,
            message: "internal server error".into(),
            retryable: true,
        };
        assert_eq!(
            err.to_string(),
            "Service perplexity returned HTTP 500: internal server error"
        );
    }

    #[test]
    fn error_display_rate_limited() {
        let err = QuillError::RateLimited {
            service: "openai".into(),
            retry_after_ms: Some(3000),
        };
        assert_eq!(err.to_string(), "Rate limited by openai, retry after 3000ms");

        let err = QuillError::RateLimited {
            service: "openai".into(),
            retry_after_ms: None,
        };
        assert_eq!(err.to_string(), "Rate limited by openai");
    }

    #[test]
    fn error_display_exhausted_retries() {
        let err = QuillError::ExhaustedRetries {
            call: "outline".into(),
            attempts: 5,
            last_error: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "Retries exhausted for 'outline' after 5 attempts: boom"
        );
    }

    #[test]
    fn error_display_missing_artifact() {
        let err = QuillError::MissingArtifact {
            artifact: "outline".into(),
        };
        assert_eq!(err.to_string(), "Required artifact 'outline' is missing");
    }

    #[test]
    fn error_display_timeout() {
        let err = QuillError::TimeoutExceeded { budget_ms: 1500 };
        assert_eq!(
            err.to_string(),
            "Run did not reach a terminal state within 1500ms"
        );
    }

    // --- is_retryable ---

    #[test]
    fn retryable_rate_limited_and_flagged_service_errors() {
        assert!(QuillError::RateLimited {
            service: "x".into(),
            retry_after_ms: Some(10),
        }
        .is_retryable());
        assert!(QuillError::ServiceError {
            service: "x".into(),
            status: 503,
            message: "unavailable".into(),
            retryable: true,
        }
        .is_retryable());
        assert!(QuillError::RunFailed {
            status: "failed".into()
        }
        .is_retryable());
    }

    #[test]
    fn not_retryable_terminal_kinds() {
        for err in [
            QuillError::AuthError {
                service: "x".into(),
            },
            QuillError::TimeoutExceeded { budget_ms: 1 },
            QuillError::MissingArtifact {
                artifact: "outline".into(),
            },
            QuillError::ServiceError {
                service: "x".into(),
                status: 400,
                message: "bad request".into(),
                retryable: false,
            },
        ] {
            assert!(!err.is_retryable(), "{err} should not be retryable");
        }
    }

    #[test]
    fn terminal_kinds() {
        assert!(QuillError::TimeoutExceeded { budget_ms: 1 }.is_terminal());
        assert!(QuillError::MissingArtifact {
            artifact: "outline".into()
        }
        .is_terminal());
        assert!(!QuillError::RateLimited {
            service: "x".into(),
            retry_after_ms: None,
        }
        .is_terminal());
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        let err = QuillError::RateLimited {
            service: "x".into(),
            retry_after_ms: Some(2500),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_millis(2500)));
        let hintless = QuillError::RateLimited {
            service: "x".into(),
            retry_after_ms: None,
        };
        assert_eq!(hintless.retry_after(), None);
        assert_eq!(QuillError::Other("x".into()).retry_after(), None);
    }

    // --- data model ---

    #[test]
    fn run_status_parsing_and_terminality() {
        assert_eq!(RunStatus::from_api("completed"), RunStatus::Completed);
        assert_eq!(RunStatus::from_api("in_progress"), RunStatus::InProgress);
        assert_eq!(RunStatus::from_api("something_new"), RunStatus::InProgress);
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Expired.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::RequiresAction.is_terminal());
    }

    #[test]
    fn blank_text_reply_is_not_text() {
        assert_eq!(Reply::text("  \n").into_text(), None);
        assert_eq!(Reply::media("file-1").into_text(), None);
        assert_eq!(Reply::text("outline").into_text(), Some("outline".into()));
    }

    #[test]
    fn failed_result_has_empty_outline_and_article() {
        let item = WorkItem::new(4, "solar panels");
        let result = BatchResult::failed(&item, "boom");
        assert_eq!(result.id, 4);
        assert_eq!(result.keyword, "solar panels");
        assert!(result.outline.is_empty());
        assert!(result.article.is_empty());
        assert_eq!(result.status.processed_label(), "Failed");
        assert_eq!(result.failure_reason.as_deref(), Some("boom"));
    }

    #[test]
    fn blank_outline_counts_as_missing() {
        let artifacts = Artifacts {
            outline: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(artifacts.outline_text(), None);
    }

    #[test]
    fn research_prompt_text_numbers_sources() {
        let doc = ResearchDocument {
            content: "Facts.".into(),
            citations: vec!["https://a.example".into(), "https://b.example".into()],
        };
        assert_eq!(
            doc.to_prompt_text(),
            "Facts.\n\nSources:\n[1] https://a.example\n[2] https://b.example"
        );
    }
}
