//! Batched playlist removals.

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::contract::{ApiError, CatalogApi};
use crate::pacing::RateLimiter;

/// Most items the remove endpoint accepts in one call.
pub const REMOVAL_BATCH_LIMIT: usize = 100;

/// Up to [`REMOVAL_BATCH_LIMIT`] playlist item uris removed with one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalBatch {
    pub uris: Vec<String>,
}

impl RemovalBatch {
    pub(crate) fn len(&self) -> usize {
        self.uris.len()
    }
}

/// Split `uris` into consecutive batches of at most `size`, preserving order.
pub fn partition(uris: Vec<String>, size: usize) -> Vec<RemovalBatch> {
    let size = size.clamp(1, REMOVAL_BATCH_LIMIT);
    uris.chunks(size)
        .map(|chunk| RemovalBatch {
            uris: chunk.to_vec(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedBatch {
    /// Position of the batch in submission order.
    pub index: usize,
    pub size: usize,
    #[serde(skip)]
    pub error: ApiError,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemovalReport {
    /// Uris selected for removal.
    pub requested: usize,
    pub removed: usize,
    pub batches: usize,
    pub failed: Vec<FailedBatch>,
}

/// Submit one removal request per batch, pausing `delay` between batches.
///
/// A failed batch is logged and recorded; the following batches are still submitted.
pub async fn remove_all<A>(
    api: &A,
    limiter: &RateLimiter<'_>,
    playlist_id: &str,
    batches: &[RemovalBatch],
    delay: Duration,
) -> RemovalReport
where
    A: CatalogApi + ?Sized,
{
    let mut report = RemovalReport {
        requested: batches.iter().map(RemovalBatch::len).sum(),
        batches: batches.len(),
        ..RemovalReport::default()
    };

    for (index, batch) in batches.iter().enumerate() {
        if index > 0 {
            limiter.pause(delay).await;
        }
        match api.remove_items(playlist_id, &batch.uris).await {
            Ok(()) => {
                report.removed += batch.len();
                info!(batch = index + 1, "[EVICT] Removed {} tracks from the playlist.", batch.len());
            }
            Err(e) => {
                error!(batch = index + 1, size = batch.len(), error = %e, "[EVICT][ERROR] Removal batch failed");
                report.failed.push(FailedBatch {
                    index,
                    size: batch.len(),
                    error: e,
                });
            }
        }
    }

    report
}
