use std::time::Duration;

use async_trait::async_trait;
use quill_types::{
    FileId, MediaRef, Reply, ResearchDocument, Result, RunId, RunStatus, SessionId,
};

// ---------------------------------------------------------------------------
// SessionService
// ---------------------------------------------------------------------------

/// A stateful conversational service: one session per work item, ordered
/// post/run/read operations against it.
#[async_trait]
pub trait SessionService: Send + Sync {
    fn name(&self) -> &str;

    /// How often a pending run's status is checked.
    fn poll_interval(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn create_session(&self) -> Result<SessionId>;
    async fn post_message(&self, session: &SessionId, text: &str) -> Result<()>;
    async fn start_run(&self, session: &SessionId) -> Result<RunId>;
    async fn run_status(&self, session: &SessionId, run: &RunId) -> Result<RunStatus>;

    /// The most recent assistant reply on the session, if any.
    async fn latest_reply(&self, session: &SessionId) -> Result<Option<Reply>>;

    async fn fetch_file(&self, file: &FileId) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// ResearchService
// ---------------------------------------------------------------------------

/// Stateless lookup: one call per keyword.
#[async_trait]
pub trait ResearchService: Send + Sync {
    fn name(&self) -> &str;
    async fn query(&self, keyword: &str) -> Result<ResearchDocument>;
}

// ---------------------------------------------------------------------------
// MediaHost
// ---------------------------------------------------------------------------

/// Stores image bytes and hands back a public URL.
#[async_trait]
pub trait MediaHost: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when the host accepted the request but returned no URL.
    async fn upload(&self, bytes: Vec<u8>, name_hint: &str) -> Result<Option<MediaRef>>;
}

// ---------------------------------------------------------------------------
// PhotoSearch
// ---------------------------------------------------------------------------

/// Stock photo search used to collect brand image candidates.
#[async_trait]
pub trait PhotoSearch: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str) -> Result<Vec<String>>;
}
