// Similarity writer: upsert edge batches with retry on write contention.
//
// SQLite under concurrent batch workers occasionally fails with
// "database is locked" / "database table is locked" style errors even with
// a busy_timeout set. Those conflicts are transient, so the writer retries
// them with exponential backoff and jitter; any other error is returned
// immediately and becomes a batch failure.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::db::models::{EntityKind, SimilarityEdge};
use crate::db::Store;

/// Maximum number of retry attempts on transient write conflicts.
const MAX_WRITE_RETRIES: u32 = 5;

/// Base delay for exponential backoff (doubles each retry).
const BASE_BACKOFF: Duration = Duration::from_millis(100);

/// Maximum backoff delay to cap exponential growth.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Check whether an error looks like a transient write conflict.
///
/// The storage layer wraps rusqlite errors in anyhow, so we check the
/// error chain's Debug representation for lock and deadlock wording.
fn is_transient_conflict(err: &anyhow::Error) -> bool {
    let debug_str = format!("{:?}", err).to_lowercase();
    debug_str.contains("locked")
        || debug_str.contains("busy")
        || debug_str.contains("deadlock")
}

/// Retry an async write with exponential backoff on transient conflicts.
///
/// Non-transient errors are returned immediately. After `MAX_WRITE_RETRIES`
/// failed retries the last error is returned with context naming `label`.
pub async fn with_write_retry<F, Fut, T>(label: &str, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_transient_conflict(&err) {
                    return Err(err);
                }
                if attempt >= MAX_WRITE_RETRIES {
                    return Err(err)
                        .with_context(|| format!("{label}: write conflict persisted after {MAX_WRITE_RETRIES} retries"));
                }

                attempt += 1;

                let backoff = BASE_BACKOFF
                    .saturating_mul(1u32 << attempt)
                    .min(MAX_BACKOFF);

                // Jitter without pulling in `rand`: the subsecond nanos of
                // the wall clock vary enough across concurrent workers.
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos();
                let jitter_factor = 0.75 + (nanos % 500) as f64 / 1000.0; // 0.75 to 1.25
                let jittered = Duration::from_secs_f64(backoff.as_secs_f64() * jitter_factor);

                warn!(
                    label,
                    attempt,
                    max_retries = MAX_WRITE_RETRIES,
                    backoff_ms = jittered.as_millis() as u64,
                    "Write conflict, retrying in {}ms (attempt {}/{})",
                    jittered.as_millis(),
                    attempt,
                    MAX_WRITE_RETRIES,
                );

                tokio::time::sleep(jittered).await;
            }
        }
    }
}

/// Write a batch of edges for `kind`, retrying transient conflicts.
///
/// Returns the number of edges written. An empty batch is a no-op.
pub async fn write_edges(
    store: &Arc<dyn Store>,
    kind: EntityKind,
    edges: &[SimilarityEdge],
) -> Result<u64> {
    if edges.is_empty() {
        return Ok(0);
    }

    with_write_retry("upsert edges", || store.upsert_edges(kind, edges)).await?;

    debug!(kind = %kind, count = edges.len(), "Edge batch written");
    Ok(edges.len() as u64)
}
