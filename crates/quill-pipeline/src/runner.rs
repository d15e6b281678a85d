//! Per-item runner: one session, the full stage chain, one result.

use std::sync::Arc;
use std::time::Instant;

use quill_services::{MediaHost, ResearchService, SessionService};
use quill_types::{Artifacts, BatchResult, QuillError, Result, SessionId, WorkItem};

use crate::config::PipelineSettings;
use crate::events::{EventEmitter, PipelineEvent};
use crate::prompts::PromptBook;
use crate::retry::{Sleeper, TokioSleeper};
use crate::stages::{StageChain, StageContext};

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// The external collaborators shared by all runners.
#[derive(Clone)]
pub struct Services {
    pub session: Arc<dyn SessionService>,
    pub research: Arc<dyn ResearchService>,
    pub media: Arc<dyn MediaHost>,
}

impl Services {
    pub fn new(
        session: impl SessionService + 'static,
        research: impl ResearchService + 'static,
        media: impl MediaHost + 'static,
    ) -> Self {
        Self {
            session: Arc::new(session),
            research: Arc::new(research),
            media: Arc::new(media),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineRunner
// ---------------------------------------------------------------------------

/// Runs the stage chain for one work item at a time. Cheap to clone; each
/// call to [`PipelineRunner::run`] owns its own artifacts.
#[derive(Clone)]
pub struct PipelineRunner {
    services: Services,
    settings: Arc<PipelineSettings>,
    prompts: Arc<PromptBook>,
    chain: Arc<StageChain>,
    sleeper: Arc<dyn Sleeper>,
    events: EventEmitter,
}

impl PipelineRunner {
    pub fn new(services: Services, settings: PipelineSettings, prompts: PromptBook) -> Self {
        Self {
            services,
            settings: Arc::new(settings),
            prompts: Arc::new(prompts),
            chain: Arc::new(StageChain::standard()),
            sleeper: Arc::new(TokioSleeper),
            events: EventEmitter::default(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Run every stage for `item`. Never fails: any error becomes a
    /// `Failed` result. The artifacts gathered so far are returned too.
    pub async fn run(&self, item: &WorkItem) -> (BatchResult, Artifacts) {
        let mut artifacts = Artifacts::default();
        let result = match self.run_stages(item, &mut artifacts).await {
            Ok(()) => BatchResult::succeeded(
                item,
                artifacts.outline.clone().unwrap_or_default(),
                artifacts.article.clone().unwrap_or_default(),
            ),
            Err(e) => {
                tracing::warn!(item = item.id, keyword = %item.keyword, error = %e, "Item failed");
                BatchResult::failed(item, e.to_string())
            }
        };
        (result, artifacts)
    }

    async fn run_stages(&self, item: &WorkItem, artifacts: &mut Artifacts) -> Result<()> {
        if item.keyword.trim().is_empty() {
            return Err(QuillError::InvalidInput(format!("row {} has an empty keyword", item.id)));
        }

        let session = self.create_session().await?;
        tracing::debug!(item = item.id, session = %session, "Session created");

        let ctx = StageContext {
            item,
            session: &session,
            services: &self.services,
            settings: &self.settings,
            prompts: &self.prompts,
            sleeper: &*self.sleeper,
            events: &self.events,
        };

        for stage in self.chain.stages() {
            let started = Instant::now();
            tracing::debug!(item = item.id, stage = stage.name(), "Stage started");
            stage.run(&ctx, artifacts).await?;
            let duration_ms = started.elapsed().as_millis() as u64;
            tracing::info!(item = item.id, stage = stage.name(), duration_ms, "Stage completed");
            self.events.emit(PipelineEvent::StageCompleted {
                item: item.id,
                stage: stage.name().to_string(),
                duration_ms,
            });
        }
        Ok(())
    }

    async fn create_session(&self) -> Result<SessionId> {
        let service = &*self.services.session;
        self.settings
            .session_policy
            .execute("create_session", &*self.sleeper, move || {
                service.create_session()
            })
            .await?
            .ok_or_else(|| QuillError::MissingArtifact {
                artifact: "session".into(),
            })
    }
}
