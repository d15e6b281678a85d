//! Bounded fan-out of work items over a pool of runners.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use quill_types::{BatchResult, QuillError, Result, WorkItem};

use crate::aggregator::ResultAggregator;
use crate::events::PipelineEvent;
use crate::runner::PipelineRunner;

/// Runs one [`PipelineRunner`] per item with at most `concurrency` in flight.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    concurrency: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Scheduler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process every item and return exactly one result per item, in input
    /// order. Items whose task panicked are reported as failed.
    pub async fn run(&self, runner: &PipelineRunner, items: Vec<WorkItem>) -> Result<Vec<BatchResult>> {
        let started = Instant::now();
        let events = runner.events().clone();
        let total = items.len();
        let mut aggregator = ResultAggregator::new(&items);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set: JoinSet<BatchResult> = JoinSet::new();

        tracing::info!(total, concurrency = self.concurrency, "Batch started");
        events.emit(PipelineEvent::BatchStarted {
            total,
            concurrency: self.concurrency,
        });

        for item in items {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| QuillError::Other(format!("scheduler closed: {e}")))?;
            let runner = runner.clone();
            let events = events.clone();

            join_set.spawn(async move {
                let item_started = Instant::now();
                events.emit(PipelineEvent::ItemStarted {
                    item: item.id,
                    keyword: item.keyword.clone(),
                });

                let (result, _artifacts) = runner.run(&item).await;

                match &result.failure_reason {
                    None => events.emit(PipelineEvent::ItemCompleted {
                        item: item.id,
                        keyword: item.keyword.clone(),
                        duration_ms: item_started.elapsed().as_millis() as u64,
                    }),
                    Some(reason) => events.emit(PipelineEvent::ItemFailed {
                        item: item.id,
                        keyword: item.keyword.clone(),
                        error: reason.clone(),
                    }),
                }
                drop(permit);
                result
            });
        }

        while let Some(joined) = join_set.join_next().await {
            collect(&mut aggregator, joined);
        }

        let results = aggregator.finish();
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - succeeded;
        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(succeeded, failed, duration_ms, "Batch completed");
        events.emit(PipelineEvent::BatchCompleted {
            succeeded,
            failed,
            duration_ms,
        });
        Ok(results)
    }
}

fn collect(
    aggregator: &mut ResultAggregator,
    joined: std::result::Result<BatchResult, tokio::task::JoinError>,
) {
    match joined {
        Ok(result) => aggregator.record(result),
        // The slot stays empty and is reported as failed by the aggregator.
        Err(e) => tracing::error!(error = %e, "Runner task did not complete"),
    }
}
