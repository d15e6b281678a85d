//! CLI binary for generating articles from a keyword list.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

use quill_pipeline::{
    collect_stock_images, generate_keywords, load_work_items, setup, write_keywords,
    write_results, ContentConfig, EventEmitter, PipelineEvent, PipelineRunner, PipelineSettings,
    PromptBook, Scheduler, TokioSleeper,
};
use quill_types::ItemStatus;

#[derive(Parser)]
#[command(name = "quill", version, about = "Keyword-to-article batch pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the JSON configuration bundle
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Disable TLS certificate verification for every HTTP client
    #[arg(long, global = true)]
    insecure: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research, outline, and write an article for every keyword
    Run {
        /// Keyword file with a `Keyword` column
        #[arg(short, long, default_value = "keywords.csv")]
        input: PathBuf,

        /// Result file (Keyword, Outline, Article, Processed)
        #[arg(short, long, default_value = "articles.csv")]
        output: PathBuf,

        /// Items processed at once (default: config `concurrency`, else 5)
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,
    },

    /// Ask the keyword research assistant for a list of keywords
    Keywords {
        /// Number of keywords to request
        #[arg(long, default_value = "10")]
        count: usize,

        /// Keyword file to write
        #[arg(short, long, default_value = "keywords.csv")]
        output: PathBuf,
    },

    /// Collect stock photo links for every keyword
    Images {
        /// Keyword file with a `Keyword` column
        #[arg(short, long, default_value = "keywords.csv")]
        input: PathBuf,

        /// File the photo URLs are appended to
        #[arg(short, long, default_value = "brandimagesandlinks.txt")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            input,
            output,
            concurrency,
        } => {
            cmd_run(&cli.config, &input, &output, concurrency, cli.insecure).await?;
        }
        Commands::Keywords { count, output } => {
            cmd_keywords(&cli.config, count, &output, cli.insecure).await?;
        }
        Commands::Images { input, output } => {
            cmd_images(&cli.config, &input, &output, cli.insecure).await?;
        }
    }

    Ok(())
}

async fn cmd_run(
    config_path: &Path,
    input: &Path,
    output: &Path,
    concurrency: Option<usize>,
    insecure: bool,
) -> anyhow::Result<()> {
    let config = ContentConfig::load(config_path).await?;
    let mut settings = PipelineSettings::from_config(&config);
    if let Some(n) = concurrency {
        settings = settings.with_concurrency(n);
    }
    let prompts = PromptBook::from_config(&config);
    let http = setup::http_settings(&config, insecure);

    let items = load_work_items(input)?;
    if items.is_empty() {
        println!("No keywords in {}", input.display());
        return Ok(());
    }
    println!("Processing {} keywords from {}", items.len(), input.display());

    let services = setup::build_services(&config, &settings, &prompts, &http).await?;
    let scheduler = Scheduler::new(settings.concurrency);
    let events = EventEmitter::default();
    let progress = tokio::spawn(log_progress(events.subscribe(), items.len()));
    let runner = PipelineRunner::new(services, settings, prompts).with_events(events);

    let results = scheduler.run(&runner, items).await?;
    write_results(output, &results)?;
    // closes the channel for the progress task
    drop(runner);
    let _ = progress.await;

    let failed: Vec<_> = results
        .iter()
        .filter(|r| r.status == ItemStatus::Failed)
        .collect();
    println!(
        "\nWrote {} rows to {} ({} failed)",
        results.len(),
        output.display(),
        failed.len()
    );
    for result in failed {
        println!(
            "  [{}] {}: {}",
            result.id,
            result.keyword,
            result.failure_reason.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}

/// Log one line per finished item until the batch completes.
async fn log_progress(mut rx: Receiver<PipelineEvent>, total: usize) {
    let mut done = 0usize;

    loop {
        match rx.recv().await {
            Ok(PipelineEvent::ItemCompleted {
                keyword,
                duration_ms,
                ..
            }) => {
                done += 1;
                tracing::info!(duration_ms, "[{done}/{total}] {keyword}");
            }
            Ok(PipelineEvent::ItemFailed { keyword, error, .. }) => {
                done += 1;
                tracing::warn!(error = %error, "[{done}/{total}] {keyword} failed");
            }
            Ok(PipelineEvent::Retrying {
                item,
                call,
                delay_ms,
            }) => {
                tracing::debug!(item, call = %call, delay_ms, "Retrying");
            }
            Ok(PipelineEvent::BatchCompleted { .. }) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Progress listener lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn cmd_keywords(
    config_path: &Path,
    count: usize,
    output: &Path,
    insecure: bool,
) -> anyhow::Result<()> {
    if count == 0 {
        anyhow::bail!("--count must be at least 1");
    }
    let config = ContentConfig::load(config_path).await?;
    let settings = PipelineSettings::from_config(&config);
    let prompts = PromptBook::from_config(&config);
    let http = setup::http_settings(&config, insecure);

    let profile = setup::AssistantProfile::keywords(&prompts);
    let session = setup::session_service(&config, &settings, &profile, &http).await?;
    let keywords = generate_keywords(&*session, &settings, &prompts, &TokioSleeper, count).await?;
    write_keywords(output, &keywords)?;

    println!("Wrote {} keywords to {}", keywords.len(), output.display());
    for keyword in &keywords {
        println!("  {keyword}");
    }
    Ok(())
}

async fn cmd_images(
    config_path: &Path,
    input: &Path,
    output: &Path,
    insecure: bool,
) -> anyhow::Result<()> {
    let config = ContentConfig::load(config_path).await?;
    let settings = PipelineSettings::from_config(&config);
    let http = setup::http_settings(&config, insecure);

    let search = setup::photo_search(&config, &http)?;
    let items = load_work_items(input)?;
    let written = collect_stock_images(
        &search,
        &items,
        &settings.media_policy,
        &TokioSleeper,
        output,
    )
    .await?;

    println!(
        "Appended {written} photo links for {} keywords to {}",
        items.len(),
        output.display()
    );
    Ok(())
}
