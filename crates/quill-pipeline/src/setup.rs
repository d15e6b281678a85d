//! Building the real HTTP collaborators from the content configuration.

use std::path::Path;
use std::sync::Arc;

use quill_services::{
    AnthropicClient, AssistantSpec, AssistantsClient, FreeImageHost, HttpSettings,
    PerplexityClient, PexelsClient, SessionService,
};
use quill_types::Result;

use crate::config::{ContentConfig, PipelineSettings, SessionBackend};
use crate::prompts::PromptBook;
use crate::runner::Services;

// ---------------------------------------------------------------------------
// AssistantProfile
// ---------------------------------------------------------------------------

/// Which assistant a command talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantProfile {
    pub name: String,
    pub instructions: String,
    /// Config key naming an existing assistant to reuse.
    pub id_key: &'static str,
    /// Attach the reference files (uploaded, or inlined for Anthropic).
    pub reference_files: bool,
}

impl AssistantProfile {
    /// The article-writing assistant used by `quill run`.
    pub fn content(prompts: &PromptBook) -> Self {
        Self {
            name: "Content Creation Assistant".into(),
            instructions: prompts.assistant_instructions(),
            id_key: "assistant_id",
            reference_files: true,
        }
    }

    /// The keyword research assistant used by `quill keywords`.
    pub fn keywords(prompts: &PromptBook) -> Self {
        Self {
            name: "Keyword Research Assistant".into(),
            instructions: prompts.keyword_instructions(),
            id_key: "keyword_assistant_id",
            reference_files: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Session backends
// ---------------------------------------------------------------------------

/// An assistants client bound to the profile's assistant: the one named by
/// `profile.id_key`, or a new one built from the profile.
pub async fn assistants_client(
    config: &ContentConfig,
    settings: &PipelineSettings,
    profile: &AssistantProfile,
    http: &HttpSettings,
) -> Result<AssistantsClient> {
    let mut client = AssistantsClient::new(config.api_key("OPENAI_API_TOKEN")?, http)?
        .with_poll_interval(settings.poll_interval);

    if let Some(assistant_id) = config.get(profile.id_key) {
        tracing::info!(assistant = %assistant_id, profile = %profile.name, "Using configured assistant");
        return Ok(client.with_assistant(assistant_id));
    }

    let mut file_ids = Vec::new();
    if profile.reference_files {
        for path in config.reference_files() {
            file_ids.push(client.upload_file(&path, "assistants").await?);
        }
    }
    let spec = AssistantSpec {
        name: profile.name.clone(),
        model: config.assistant_model(),
        instructions: profile.instructions.clone(),
        file_ids,
    };
    client.create_assistant(&spec).await?;
    Ok(client)
}

/// A Messages API client whose system prompt is the profile's instructions,
/// followed by the reference files when the profile wants them.
pub async fn anthropic_client(
    config: &ContentConfig,
    profile: &AssistantProfile,
    http: &HttpSettings,
) -> Result<AnthropicClient> {
    let system = if profile.reference_files {
        with_reference_files(&profile.instructions, &config.reference_files()).await?
    } else {
        profile.instructions.clone()
    };
    let client = AnthropicClient::new(
        config.api_key("ANTHROPIC_API_KEY")?,
        config.claude_model(),
        http,
    )?
    .with_max_tokens(config.claude_max_tokens())
    .with_system(system);
    tracing::info!(model = %client.model(), profile = %profile.name, "Using Anthropic messages");
    Ok(client)
}

async fn with_reference_files(instructions: &str, paths: &[impl AsRef<Path>]) -> Result<String> {
    let mut system = instructions.to_string();
    for path in paths {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("reference");
        system.push_str(&format!("\n\nReference file {name}:\n{content}"));
    }
    Ok(system)
}

/// The session service selected by the config's `backend` key.
pub async fn session_service(
    config: &ContentConfig,
    settings: &PipelineSettings,
    profile: &AssistantProfile,
    http: &HttpSettings,
) -> Result<Arc<dyn SessionService>> {
    let service: Arc<dyn SessionService> = match config.session_backend()? {
        SessionBackend::Assistants => {
            Arc::new(assistants_client(config, settings, profile, http).await?)
        }
        SessionBackend::Anthropic => Arc::new(anthropic_client(config, profile, http).await?),
    };
    Ok(service)
}

// ---------------------------------------------------------------------------
// Batch services
// ---------------------------------------------------------------------------

/// The session, research, and media services for a batch run.
pub async fn build_services(
    config: &ContentConfig,
    settings: &PipelineSettings,
    prompts: &PromptBook,
    http: &HttpSettings,
) -> Result<Services> {
    let research = PerplexityClient::new(
        config.api_key("PERPLEXITY_API_KEY")?,
        config.perplexity_model(),
        http,
    )?;
    let media = FreeImageHost::new(config.api_key("FREEIMAGE_HOST_API_KEY")?, http)?;
    let session =
        session_service(config, settings, &AssistantProfile::content(prompts), http).await?;
    Ok(Services {
        session,
        research: Arc::new(research),
        media: Arc::new(media),
    })
}

pub fn photo_search(config: &ContentConfig, http: &HttpSettings) -> Result<PexelsClient> {
    PexelsClient::new(config.api_key("PEXELS_API_KEY")?, http)
}

/// Transport settings: the bundle's `verify_tls`, forced off by `insecure`.
pub fn http_settings(config: &ContentConfig, insecure: bool) -> HttpSettings {
    HttpSettings {
        verify_tls: config.verify_tls() && !insecure,
        ..HttpSettings::default()
    }
}
