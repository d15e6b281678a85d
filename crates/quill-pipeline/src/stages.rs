//! The fixed per-item stage chain: Research → Visualize → CurateLinks →
//! Outline → Compose.

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use quill_types::{Artifacts, LinkSet, QuillError, Reply, Result, SessionId, WorkItem};

use crate::config::PipelineSettings;
use crate::events::{EventEmitter, PipelineEvent};
use crate::prompts::PromptBook;
use crate::retry::{RetryPolicy, Sleeper};
use crate::runner::Services;
use crate::session::SessionCall;

// ---------------------------------------------------------------------------
// StageContext
// ---------------------------------------------------------------------------

/// Everything a stage may touch while running for one item. Borrowed from
/// the runner of that item only.
pub struct StageContext<'a> {
    pub item: &'a WorkItem,
    pub session: &'a SessionId,
    pub services: &'a Services,
    pub settings: &'a PipelineSettings,
    pub prompts: &'a PromptBook,
    pub sleeper: &'a dyn Sleeper,
    pub events: &'a EventEmitter,
}

impl StageContext<'_> {
    /// Run one remote call under `policy`, reporting each retry as an event.
    pub async fn guarded<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        label: &str,
        call: F,
    ) -> Result<Option<T>>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        policy.execute(label, &self.reporting(label), call).await
    }

    /// Post `prompt` to the item's session, wait for a completed run, and
    /// read the latest reply. Every call uses the session policy.
    pub async fn ask(&self, label: &str, prompt: &str) -> Result<Option<Reply>> {
        let sleeper = self.reporting(label);
        SessionCall::new(
            &*self.services.session,
            self.session,
            &self.settings.session_policy,
            &sleeper,
            self.settings.run_budget,
        )
        .ask(label, prompt)
        .await
    }

    fn reporting<'s>(&'s self, label: &'s str) -> ReportingSleeper<'s> {
        ReportingSleeper {
            inner: self.sleeper,
            events: self.events,
            item: self.item.id,
            call: label,
        }
    }
}

struct ReportingSleeper<'a> {
    inner: &'a dyn Sleeper,
    events: &'a EventEmitter,
    item: usize,
    call: &'a str,
}

#[async_trait]
impl<'a> Sleeper for ReportingSleeper<'a> {
    async fn sleep(&self, delay: Duration) {
        self.events.emit(PipelineEvent::Retrying {
            item: self.item,
            call: self.call.to_string(),
            delay_ms: delay.as_millis() as u64,
        });
        self.inner.sleep(delay).await;
    }
}

// ---------------------------------------------------------------------------
// Stage trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Read predecessors from `artifacts` and record this stage's output.
    /// An error aborts the remaining stages of the item.
    async fn run(&self, ctx: &StageContext<'_>, artifacts: &mut Artifacts) -> Result<()>;
}

/// The ordered stages applied to every item.
pub struct StageChain {
    stages: Vec<Box<dyn Stage>>,
}

impl StageChain {
    pub fn standard() -> Self {
        Self {
            stages: vec![
                Box::new(ResearchStage),
                Box::new(VisualizeStage),
                Box::new(CurateLinksStage),
                Box::new(OutlineStage),
                Box::new(ComposeStage),
            ],
        }
    }

    pub fn stages(&self) -> impl Iterator<Item = &dyn Stage> {
        self.stages.iter().map(|s| s.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Default for StageChain {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

pub struct ResearchStage;

#[async_trait]
impl Stage for ResearchStage {
    fn name(&self) -> &str {
        "research"
    }

    async fn run(&self, ctx: &StageContext<'_>, artifacts: &mut Artifacts) -> Result<()> {
        let service = &*ctx.services.research;
        let keyword = ctx.item.keyword.as_str();
        artifacts.research = ctx
            .guarded(&ctx.settings.research_policy, "research", move || {
                service.query(keyword)
            })
            .await?;

        if artifacts.research.is_none() {
            tracing::warn!(item = ctx.item.id, keyword, "No research available, continuing");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Visualize
// ---------------------------------------------------------------------------

/// Independent attempts at a generated chart; attempts without an image are
/// skipped.
pub struct VisualizeStage;

#[async_trait]
impl Stage for VisualizeStage {
    fn name(&self) -> &str {
        "visualize"
    }

    async fn run(&self, ctx: &StageContext<'_>, artifacts: &mut Artifacts) -> Result<()> {
        let session_service = &*ctx.services.session;
        let media = &*ctx.services.media;
        let keyword = ctx.item.keyword.as_str();
        let prompt = ctx.prompts.visualization(keyword, artifacts.research.as_ref());

        for attempt in 0..ctx.settings.visualization_attempts {
            if artifacts.visualizations.len() >= Artifacts::MAX_VISUALIZATIONS {
                break;
            }

            let file_id = match ctx.ask("visualize", &prompt).await? {
                Some(Reply::Media { file_id }) => file_id,
                _ => {
                    tracing::info!(item = ctx.item.id, attempt, "No image in reply, skipping");
                    continue;
                }
            };

            let file_id = &file_id;
            let Some(bytes) = ctx
                .guarded(&ctx.settings.session_policy, "fetch_file", move || {
                    session_service.fetch_file(file_id)
                })
                .await?
            else {
                continue;
            };

            let uploaded = ctx
                .guarded(&ctx.settings.media_policy, "upload", move || {
                    media.upload(bytes.clone(), keyword)
                })
                .await?
                .flatten();
            match uploaded {
                Some(media_ref) => {
                    tracing::info!(item = ctx.item.id, attempt, url = %media_ref, "Visualization uploaded");
                    artifacts.visualizations.push(media_ref);
                }
                None => {
                    tracing::warn!(item = ctx.item.id, attempt, "Visualization upload failed, skipping");
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CurateLinks
// ---------------------------------------------------------------------------

pub struct CurateLinksStage;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>()\[\]"'`]+"#).expect("valid URL pattern"));

/// URLs in `text`, in order of first appearance, with trailing punctuation
/// stripped.
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in URL_PATTERN.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', '*']);
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

#[async_trait]
impl Stage for CurateLinksStage {
    fn name(&self) -> &str {
        "curate_links"
    }

    async fn run(&self, ctx: &StageContext<'_>, artifacts: &mut Artifacts) -> Result<()> {
        let prompt = ctx.prompts.links(&ctx.item.keyword);
        let text = ctx
            .ask("curate_links", &prompt)
            .await?
            .and_then(Reply::into_text);

        match text {
            Some(text) => {
                let urls = extract_urls(&text);
                tracing::debug!(item = ctx.item.id, links = urls.len(), "Links curated");
                artifacts.links = Some(LinkSet { text, urls });
            }
            None => {
                tracing::warn!(item = ctx.item.id, "No links returned, continuing");
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outline
// ---------------------------------------------------------------------------

pub struct OutlineStage;

#[async_trait]
impl Stage for OutlineStage {
    fn name(&self) -> &str {
        "outline"
    }

    async fn run(&self, ctx: &StageContext<'_>, artifacts: &mut Artifacts) -> Result<()> {
        let prompt = ctx.prompts.outline(
            &ctx.item.keyword,
            artifacts.research.as_ref(),
            artifacts.links.as_ref(),
            &artifacts.visualizations,
        );
        artifacts.outline = ctx.ask("outline", &prompt).await?.and_then(Reply::into_text);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Compose
// ---------------------------------------------------------------------------

/// Runs only when an outline exists.
pub struct ComposeStage;

#[async_trait]
impl Stage for ComposeStage {
    fn name(&self) -> &str {
        "compose"
    }

    async fn run(&self, ctx: &StageContext<'_>, artifacts: &mut Artifacts) -> Result<()> {
        let Some(outline) = artifacts.outline_text() else {
            return Err(QuillError::MissingArtifact {
                artifact: "outline".into(),
            });
        };

        let prompt = ctx.prompts.compose(
            &ctx.item.keyword,
            outline,
            artifacts.research.as_ref(),
            artifacts.links.as_ref(),
            &artifacts.visualizations,
        );
        let article = ctx.ask("compose", &prompt).await?.and_then(Reply::into_text);
        match article {
            Some(article) => {
                artifacts.article = Some(article);
                Ok(())
            }
            None => Err(QuillError::MissingArtifact {
                artifact: "article".into(),
            }),
        }
    }
}
