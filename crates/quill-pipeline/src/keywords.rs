//! Keyword generation through the session service.

use std::sync::LazyLock;

use regex::Regex;

use quill_services::SessionService;
use quill_types::{QuillError, Result};

use crate::config::PipelineSettings;
use crate::prompts::PromptBook;
use crate::retry::Sleeper;
use crate::session::SessionCall;

static LIST_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[(.*?)\]").expect("valid list pattern"));

/// Parse the first bracketed list in `text`: `[a, b, c]` → `["a", "b", "c"]`.
/// Surrounding quotes are stripped and blank entries dropped.
pub fn parse_keyword_list(text: &str) -> Vec<String> {
    let Some(inner) = LIST_PATTERN.captures(text).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    inner
        .as_str()
        .split(',')
        .map(|k| k.trim().trim_matches(|c: char| c == '"' || c == '\'').trim())
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

/// Ask the session service for `count` keywords.
pub async fn generate_keywords(
    session_service: &dyn SessionService,
    settings: &PipelineSettings,
    prompts: &PromptBook,
    sleeper: &dyn Sleeper,
    count: usize,
) -> Result<Vec<String>> {
    let policy = &settings.session_policy;
    let prompt = prompts.keywords(count);
    let missing = || QuillError::MissingArtifact {
        artifact: "keyword list".into(),
    };

    let session = policy
        .execute("create_session", sleeper, move || session_service.create_session())
        .await?
        .ok_or_else(missing)?;
    let text = SessionCall::new(session_service, &session, policy, sleeper, settings.run_budget)
        .ask("keywords", &prompt)
        .await?
        .and_then(|reply| reply.into_text())
        .ok_or_else(missing)?;

    let keywords = parse_keyword_list(&text);
    if keywords.is_empty() {
        return Err(QuillError::MalformedResponse {
            service: session_service.name().to_string(),
            message: "reply contains no bracketed keyword list".into(),
        });
    }
    if keywords.len() != count {
        tracing::warn!(requested = count, received = keywords.len(), "Keyword count differs");
    }
    Ok(keywords)
}
