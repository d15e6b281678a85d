//! Batch event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers (the CLI progress log, tests) can follow a batch without
//! coupling to the scheduler or runner internals.

use serde::{Deserialize, Serialize};

/// Events emitted while a batch is processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    BatchStarted {
        total: usize,
        concurrency: usize,
    },
    BatchCompleted {
        succeeded: usize,
        failed: usize,
        duration_ms: u64,
    },
    /// Sent once a runner holds its admission permit.
    ItemStarted {
        item: usize,
        keyword: String,
    },
    /// Sent before the runner releases its admission permit.
    ItemCompleted {
        item: usize,
        keyword: String,
        duration_ms: u64,
    },
    ItemFailed {
        item: usize,
        keyword: String,
        error: String,
    },
    StageCompleted {
        item: usize,
        stage: String,
        duration_ms: u64,
    },
    Retrying {
        item: usize,
        call: String,
        delay_ms: u64,
    },
}

impl PipelineEvent {
    /// The work item this event belongs to, if any.
    pub fn item(&self) -> Option<usize> {
        match self {
            PipelineEvent::ItemStarted { item, .. }
            | PipelineEvent::ItemCompleted { item, .. }
            | PipelineEvent::ItemFailed { item, .. }
            | PipelineEvent::StageCompleted { item, .. }
            | PipelineEvent::Retrying { item, .. } => Some(*item),
            PipelineEvent::BatchStarted { .. } | PipelineEvent::BatchCompleted { .. } => None,
        }
    }
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
