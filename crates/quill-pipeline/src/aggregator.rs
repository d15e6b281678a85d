//! Ordered result collection and tabular output.

use std::path::Path;

use quill_types::{BatchResult, QuillError, Result, WorkItem};

pub const OUTPUT_HEADER: [&str; 4] = ["Keyword", "Outline", "Article", "Processed"];

/// One slot per work item, indexed by ordinal, filled in completion order.
#[derive(Debug)]
pub struct ResultAggregator {
    items: Vec<WorkItem>,
    slots: Vec<Option<BatchResult>>,
}

impl ResultAggregator {
    /// `items` must carry ordinals `0..items.len()`.
    pub fn new(items: &[WorkItem]) -> Self {
        Self {
            items: items.to_vec(),
            slots: vec![None; items.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Store a result in its slot. The first result for an ordinal wins.
    pub fn record(&mut self, result: BatchResult) {
        match self.slots.get_mut(result.id) {
            Some(slot @ None) => *slot = Some(result),
            Some(Some(_)) => {
                tracing::warn!(item = result.id, "Duplicate result ignored");
            }
            None => {
                tracing::warn!(item = result.id, "Result for unknown item ignored");
            }
        }
    }

    /// All results in input order; empty slots become failures.
    pub fn finish(self) -> Vec<BatchResult> {
        self.slots
            .into_iter()
            .zip(self.items.iter())
            .map(|(slot, item)| {
                slot.unwrap_or_else(|| {
                    tracing::warn!(item = item.id, "No result reported, marking failed");
                    BatchResult::failed(item, "runner did not report a result")
                })
            })
            .collect()
    }
}

/// Write `results` as CSV to `path`, replacing it atomically.
pub fn write_results(path: &Path, results: &[BatchResult]) -> Result<()> {
    let tmp = temp_path(path)?;
    let written = write_csv(&tmp, results);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)?;
    tracing::info!(path = %path.display(), rows = results.len(), "Results written");
    Ok(())
}

fn write_csv(path: &Path, results: &[BatchResult]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(OUTPUT_HEADER)?;
    for result in results {
        writer.write_record([
            result.keyword.as_str(),
            result.outline.as_str(),
            result.article.as_str(),
            result.status.processed_label(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn temp_path(path: &Path) -> Result<std::path::PathBuf> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| QuillError::InvalidInput(format!("bad output path {}", path.display())))?;
    Ok(path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4())))
}
