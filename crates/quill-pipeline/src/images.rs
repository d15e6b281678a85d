//! Stock photo collection for the brand image list.

use std::path::Path;

use tokio::io::AsyncWriteExt;

use quill_services::PhotoSearch;
use quill_types::{Result, WorkItem};

use crate::retry::{RetryPolicy, Sleeper};

/// Search photos for every keyword and append their page URLs to `output`,
/// one per line. Returns the number of URLs written.
pub async fn collect_stock_images(
    search: &dyn PhotoSearch,
    items: &[WorkItem],
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    output: &Path,
) -> Result<usize> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(output)
        .await?;

    let mut written = 0;
    for item in items {
        let keyword = item.keyword.as_str();
        if keyword.is_empty() {
            continue;
        }
        let urls = policy
            .execute("photo_search", sleeper, move || search.search(keyword))
            .await?
            .unwrap_or_default();
        tracing::info!(item = item.id, keyword, photos = urls.len(), "Photos found");

        for url in &urls {
            file.write_all(url.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        written += urls.len();
    }
    file.flush().await?;
    Ok(written)
}
