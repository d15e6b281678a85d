//! Batch pipeline turning keywords into articles.
//!
//! This crate implements the core Quill runner: per-item stage chain,
//! retry policies, bounded scheduling, ordered result aggregation, plus the
//! keyword and stock image helpers used by the CLI.

pub mod aggregator;
pub mod config;
pub mod events;
pub mod images;
pub mod keywords;
pub mod loader;
pub mod prompts;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod setup;
pub mod stages;

pub use aggregator::{write_results, ResultAggregator, OUTPUT_HEADER};
pub use config::{ContentConfig, PipelineSettings, SessionBackend};
pub use events::{EventEmitter, PipelineEvent};
pub use images::collect_stock_images;
pub use keywords::{generate_keywords, parse_keyword_list};
pub use loader::{load_work_items, read_work_items, write_keywords, KEYWORD_COLUMN};
pub use prompts::PromptBook;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use runner::{PipelineRunner, Services};
pub use scheduler::Scheduler;
pub use session::SessionCall;
pub use stages::{extract_urls, Stage, StageChain, StageContext};
