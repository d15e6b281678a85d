//! Batch input: a CSV file with a `Keyword` column.

use std::path::Path;

use quill_types::{QuillError, Result, WorkItem};

pub const KEYWORD_COLUMN: &str = "Keyword";

/// Load one [`WorkItem`] per data row, numbered from zero in file order.
pub fn load_work_items(path: &Path) -> Result<Vec<WorkItem>> {
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;
    let items = read_work_items(reader)?;
    tracing::info!(path = %path.display(), items = items.len(), "Batch loaded");
    Ok(items)
}

pub fn read_work_items<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<WorkItem>> {
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim() == KEYWORD_COLUMN)
        .ok_or_else(|| {
            QuillError::InvalidInput(format!("input has no '{KEYWORD_COLUMN}' column"))
        })?;

    reader
        .records()
        .enumerate()
        .map(|(id, record)| {
            let record = record?;
            let keyword = record.get(column).unwrap_or_default().trim();
            Ok(WorkItem::new(id, keyword))
        })
        .collect()
}

/// Write keywords as a single-column CSV with the `Keyword` header.
pub fn write_keywords(path: &Path, keywords: &[String]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([KEYWORD_COLUMN])?;
    for keyword in keywords {
        writer.write_record([keyword.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}
