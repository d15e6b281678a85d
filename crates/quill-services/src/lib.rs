//! External collaborators of the Quill pipeline.
//!
//! Provides the `SessionService`, `ResearchService`, `MediaHost` and
//! `PhotoSearch` traits plus their HTTP implementations (OpenAI Assistants,
//! Anthropic Messages, Perplexity, freeimage.host, Pexels) sharing one
//! `HttpSettings`.

mod anthropic;
mod assistants;
mod freeimage;
mod http;
mod perplexity;
mod pexels;
mod service;

pub use anthropic::AnthropicClient;
pub use assistants::{AssistantSpec, AssistantsClient};
pub use freeimage::FreeImageHost;
pub use http::HttpSettings;
pub use perplexity::PerplexityClient;
pub use pexels::PexelsClient;
pub use service::*;
