//! Hand-written collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use quill_pipeline::{
    EventEmitter, PipelineRunner, PipelineSettings, PromptBook, RetryPolicy, Services, Sleeper,
};
use quill_services::{MediaHost, ResearchService, SessionService};
use quill_types::{
    FileId, MediaRef, QuillError, Reply, ResearchDocument, Result, RunId, RunStatus, SessionId,
};

/// The first double-quoted string in a prompt: the item keyword.
fn quoted_keyword(prompt: &str) -> String {
    prompt
        .split('"')
        .nth(1)
        .unwrap_or_default()
        .to_string()
}

pub fn slug(keyword: &str) -> String {
    keyword.replace(' ', "-")
}

// ---------------------------------------------------------------------------
// MockSession
// ---------------------------------------------------------------------------

/// Answers each prompt by its opening words and remembers the keyword of
/// every session.
#[derive(Default)]
pub struct MockSession {
    pub sessions_created: AtomicUsize,
    pub runs_started: AtomicUsize,
    pub compose_calls: AtomicUsize,
    pub outline_calls: AtomicUsize,
    /// Every posted prompt with the session it went to.
    pub posts: Mutex<Vec<(SessionId, String)>>,
    last_prompt: Mutex<HashMap<SessionId, String>>,
    /// Runs for these keywords never reach a terminal status.
    pub stuck: HashSet<String>,
    /// Runs for these keywords end with status `failed`.
    pub failing_runs: HashSet<String>,
    /// Outline replies for these keywords are blank.
    pub empty_outline: HashSet<String>,
    /// Visualization replies carry an image file when set.
    pub images: bool,
    /// Simulated latency of each run.
    pub run_latency: Duration,
    /// Remaining status checks that fail with a transient 503.
    pub status_errors: AtomicUsize,
}

impl MockSession {
    pub fn with_images() -> Self {
        Self {
            images: true,
            ..Self::default()
        }
    }

    pub fn stuck_on(mut self, keyword: &str) -> Self {
        self.stuck.insert(keyword.to_string());
        self
    }

    pub fn failing_runs_on(mut self, keyword: &str) -> Self {
        self.failing_runs.insert(keyword.to_string());
        self
    }

    pub fn empty_outline_on(mut self, keyword: &str) -> Self {
        self.empty_outline.insert(keyword.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.run_latency = latency;
        self
    }

    pub fn flaky_status(mut self, failures: usize) -> Self {
        self.status_errors = AtomicUsize::new(failures);
        self
    }

    fn prompt_for(&self, session: &SessionId) -> String {
        self.last_prompt
            .lock()
            .unwrap()
            .get(session)
            .cloned()
            .unwrap_or_default()
    }

    pub fn prompts_starting_with(&self, prefix: &str) -> Vec<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.starts_with(prefix))
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl SessionService for MockSession {
    fn name(&self) -> &str {
        "mock-session"
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(2)
    }

    async fn create_session(&self) -> Result<SessionId> {
        let n = self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(SessionId::new(format!("thread_{n}")))
    }

    async fn post_message(&self, session: &SessionId, text: &str) -> Result<()> {
        self.posts
            .lock()
            .unwrap()
            .push((session.clone(), text.to_string()));
        self.last_prompt
            .lock()
            .unwrap()
            .insert(session.clone(), text.to_string());
        if text.starts_with("Write a detailed") {
            self.compose_calls.fetch_add(1, Ordering::SeqCst);
        }
        if text.starts_with("Create a concise outline") {
            self.outline_calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn start_run(&self, _session: &SessionId) -> Result<RunId> {
        let n = self.runs_started.fetch_add(1, Ordering::SeqCst);
        if !self.run_latency.is_zero() {
            tokio::time::sleep(self.run_latency).await;
        }
        Ok(RunId::new(format!("run_{n}")))
    }

    async fn run_status(&self, session: &SessionId, _run: &RunId) -> Result<RunStatus> {
        let failing = self
            .status_errors
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QuillError::ServiceError {
                service: "mock-session".into(),
                status: 503,
                message: "unavailable".into(),
                retryable: true,
            });
        }
        let keyword = quoted_keyword(&self.prompt_for(session));
        if self.stuck.contains(&keyword) {
            return Ok(RunStatus::InProgress);
        }
        if self.failing_runs.contains(&keyword) {
            return Ok(RunStatus::Failed);
        }
        Ok(RunStatus::Completed)
    }

    async fn latest_reply(&self, session: &SessionId) -> Result<Option<Reply>> {
        let prompt = self.prompt_for(session);
        let keyword = quoted_keyword(&prompt);
        let slug = slug(&keyword);

        let reply = if prompt.starts_with("Use Code Interpreter") {
            if self.images {
                Reply::media(format!("file-{slug}"))
            } else {
                Reply::text("I could not draw a chart.")
            }
        } else if prompt.starts_with("Use file_search") {
            Reply::text(format!(
                "1. https://shop.example/{slug}/guide\n2. https://shop.example/{slug}/buy\n\
                 Images: https://cdn.shop.example/{slug}.png"
            ))
        } else if prompt.starts_with("Create a concise outline") {
            if self.empty_outline.contains(&keyword) {
                Reply::text("   ")
            } else {
                Reply::text(format!("# {keyword}\n1. Intro\n2. Data"))
            }
        } else if prompt.starts_with("Write a detailed") {
            Reply::text(format!("Article about {keyword}."))
        } else if prompt.starts_with("Suggest") {
            Reply::text("Here: [solar panels, heat pumps, roof tiles]")
        } else {
            return Ok(None);
        };
        Ok(Some(reply))
    }

    async fn fetch_file(&self, file: &FileId) -> Result<Vec<u8>> {
        Ok(file.as_str().as_bytes().to_vec())
    }
}

// ---------------------------------------------------------------------------
// MockResearch
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockResearch {
    pub calls: AtomicUsize,
    /// Lookups for these keywords always fail with a transient error.
    pub failing: HashSet<String>,
    /// Lookups for these keywords panic.
    pub panicking: HashSet<String>,
}

impl MockResearch {
    pub fn failing_on(mut self, keyword: &str) -> Self {
        self.failing.insert(keyword.to_string());
        self
    }

    pub fn panicking_on(mut self, keyword: &str) -> Self {
        self.panicking.insert(keyword.to_string());
        self
    }
}

#[async_trait]
impl ResearchService for MockResearch {
    fn name(&self) -> &str {
        "mock-research"
    }

    async fn query(&self, keyword: &str) -> Result<ResearchDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking.contains(keyword) {
            panic!("research backend crashed for {keyword}");
        }
        if self.failing.contains(keyword) {
            return Err(QuillError::ServiceError {
                service: "mock-research".into(),
                status: 503,
                message: "unavailable".into(),
                retryable: true,
            });
        }
        Ok(ResearchDocument {
            content: format!("Data on {keyword}: up 12% this year."),
            citations: vec![format!("https://stats.example/{}", slug(keyword))],
        })
    }
}

// ---------------------------------------------------------------------------
// MockMedia
// ---------------------------------------------------------------------------

/// Returns a URL derived from the uploaded bytes and the name hint.
#[derive(Default)]
pub struct MockMedia {
    pub uploads: AtomicUsize,
    pub reject_all: bool,
}

impl MockMedia {
    pub fn rejecting() -> Self {
        Self {
            reject_all: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MediaHost for MockMedia {
    fn name(&self) -> &str {
        "mock-media"
    }

    async fn upload(&self, bytes: Vec<u8>, name_hint: &str) -> Result<Option<MediaRef>> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.reject_all {
            return Err(QuillError::ServiceError {
                service: "mock-media".into(),
                status: 500,
                message: "disk full".into(),
                retryable: true,
            });
        }
        tokio::task::yield_now().await;
        let file = String::from_utf8_lossy(&bytes).to_string();
        Ok(Some(MediaRef::new(format!(
            "https://media.example/{}/{file}/{n}.png",
            slug(name_hint)
        ))))
    }
}

// ---------------------------------------------------------------------------
// Sleeper and runner helpers
// ---------------------------------------------------------------------------

/// Records requested delays without waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
    }
}

/// Fast settings: short run budget, default attempt counts.
pub fn test_settings() -> PipelineSettings {
    PipelineSettings {
        concurrency: 3,
        run_budget: Duration::from_millis(60),
        poll_interval: Duration::from_millis(2),
        research_policy: RetryPolicy::fixed(3, Duration::from_secs(5)),
        session_policy: RetryPolicy::exponential(
            5,
            Duration::from_millis(10),
            Duration::from_millis(10),
        ),
        media_policy: RetryPolicy::fixed(2, Duration::from_secs(2)),
        visualization_attempts: 3,
    }
}

pub struct Harness {
    pub session: Arc<MockSession>,
    pub research: Arc<MockResearch>,
    pub media: Arc<MockMedia>,
    pub sleeper: Arc<RecordingSleeper>,
    pub events: EventEmitter,
    pub runner: PipelineRunner,
}

impl Harness {
    pub fn new(session: MockSession, research: MockResearch, media: MockMedia) -> Self {
        Self::with_media(session, research, Arc::new(media))
    }

    /// Build a harness around an existing media host, so several harnesses
    /// can share it.
    pub fn with_media(session: MockSession, research: MockResearch, media: Arc<MockMedia>) -> Self {
        let session = Arc::new(session);
        let research = Arc::new(research);
        let sleeper = Arc::new(RecordingSleeper::default());
        let events = EventEmitter::new(1024);
        let services = Services {
            session: session.clone(),
            research: research.clone(),
            media: media.clone(),
        };
        let runner = PipelineRunner::new(services, test_settings(), PromptBook::default())
            .with_sleeper(sleeper.clone())
            .with_events(events.clone());
        Self {
            session,
            research,
            media,
            sleeper,
            events,
            runner,
        }
    }

    pub fn standard() -> Self {
        Self::new(MockSession::with_images(), MockResearch::default(), MockMedia::default())
    }
}
