// Batch scheduler: run a worklist through a bounded worker pool.
//
// The worklist is split into fixed-size batches and processed with
// `buffer_unordered`, so at most `workers` batches are in flight at once.
// Every batch future is awaited and its result collected before the run
// returns; a failed batch is recorded, not fatal. Cancellation is checked
// before each batch starts, so an in-flight batch always finishes cleanly.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::warn;

/// Per-batch counters, summed into the run report.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchStats {
    /// Candidate pairs scored.
    pub pairs: u64,
    /// Edges that met the threshold and were written.
    pub edges: u64,
}

impl BatchStats {
    pub fn add(&mut self, other: BatchStats) {
        self.pairs += other.pairs;
        self.edges += other.edges;
    }
}

/// One batch that failed after the writer exhausted its retries.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub entities: usize,
    pub error: String,
}

/// Outcome of a scheduled run over one worklist.
#[derive(Debug, Default)]
pub struct BatchRun {
    pub batches: usize,
    pub skipped: usize,
    pub totals: BatchStats,
    pub failures: Vec<BatchFailure>,
}

/// Split `worklist` into batches of `batch_size` and process them with at
/// most `workers` concurrent tasks.
///
/// `process` receives the batch index and the batch's items. Batches whose
/// cancellation check fires before they start are counted as skipped;
/// batches that return an error are recorded in `failures` and the run
/// continues.
pub async fn run_batches<T, F, Fut>(
    worklist: Vec<T>,
    batch_size: usize,
    workers: usize,
    cancel: &AtomicBool,
    process: F,
) -> BatchRun
where
    F: Fn(usize, Vec<T>) -> Fut,
    Fut: Future<Output = Result<BatchStats>>,
{
    let batch_size = batch_size.max(1);
    let workers = workers.max(1);

    let mut batches: Vec<Vec<T>> = Vec::new();
    let mut worklist = worklist.into_iter();
    loop {
        let batch: Vec<T> = worklist.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        batches.push(batch);
    }

    let pb = ProgressBar::new(batches.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("  Batches [{bar:30}] {pos}/{len} ({eta})")
    {
        pb.set_style(style);
    }

    let process = &process;
    let results: Vec<(usize, usize, Option<Result<BatchStats>>)> =
        stream::iter(batches.into_iter().enumerate().map(|(index, batch)| {
            let entities = batch.len();
            let pb = &pb;
            async move {
                // Checked per batch, not per pair: an in-flight batch runs
                // to completion so partial writes stay consistent.
                let outcome = if cancel.load(Ordering::SeqCst) {
                    None
                } else {
                    Some(process(index, batch).await)
                };
                pb.inc(1);
                (index, entities, outcome)
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await;
    pb.finish_and_clear();

    let mut run = BatchRun {
        batches: results.len(),
        ..Default::default()
    };
    for (index, entities, outcome) in results {
        match outcome {
            Some(Ok(stats)) => run.totals.add(stats),
            Some(Err(e)) => {
                warn!(batch = index, entities, error = %e, "Batch failed, continuing");
                run.failures.push(BatchFailure {
                    batch_index: index,
                    entities,
                    error: format!("{e:#}"),
                });
            }
            None => run.skipped += 1,
        }
    }
    run.failures.sort_by_key(|f| f.batch_index);
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_run_batches_processes_every_item() {
        let cancel = AtomicBool::new(false);
        let seen = Arc::new(AtomicU64::new(0));

        let seen_ref = Arc::clone(&seen);
        let run = run_batches((0..10u64).collect(), 3, 2, &cancel, |_index, batch| {
            let seen = Arc::clone(&seen_ref);
            async move {
                for item in &batch {
                    seen.fetch_add(*item, Ordering::SeqCst);
                }
                Ok(BatchStats {
                    pairs: batch.len() as u64,
                    edges: 0,
                })
            }
        })
        .await;

        assert_eq!(run.batches, 4); // 3+3+3+1
        assert_eq!(run.totals.pairs, 10);
        assert_eq!(run.skipped, 0);
        assert!(run.failures.is_empty());
        assert_eq!(seen.load(Ordering::SeqCst), (0..10).sum::<u64>());
    }

    #[tokio::test]
    async fn test_run_batches_empty_worklist() {
        let cancel = AtomicBool::new(false);
        let run = run_batches(Vec::<u32>::new(), 5, 2, &cancel, |_, _| async {
            Ok(BatchStats::default())
        })
        .await;

        assert_eq!(run.batches, 0);
        assert_eq!(run.totals.pairs, 0);
    }

    #[tokio::test]
    async fn test_run_batches_failure_does_not_abort_run() {
        let cancel = AtomicBool::new(false);

        let run = run_batches((0..9u32).collect(), 3, 1, &cancel, |index, batch| async move {
            if index == 1 {
                anyhow::bail!("write failed after retries");
            }
            Ok(BatchStats {
                pairs: batch.len() as u64,
                edges: batch.len() as u64,
            })
        })
        .await;

        assert_eq!(run.batches, 3);
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].batch_index, 1);
        assert_eq!(run.failures[0].entities, 3);
        assert!(run.failures[0].error.contains("write failed"));
        // The other two batches still counted
        assert_eq!(run.totals.pairs, 6);
        assert_eq!(run.totals.edges, 6);
    }

    #[tokio::test]
    async fn test_run_batches_cancel_skips_remaining() {
        let cancel = AtomicBool::new(true);

        // The process closure fails loudly; with cancel already set it must
        // never run, so the run reports skips and no failures.
        let run = run_batches((0..10u32).collect(), 2, 2, &cancel, |_, _: Vec<u32>| async {
            anyhow::bail!("cancelled batches must not run")
        })
        .await;

        assert_eq!(run.batches, 5);
        assert_eq!(run.skipped, 5);
        assert!(run.failures.is_empty());
        assert_eq!(run.totals.pairs, 0);
    }

    #[tokio::test]
    async fn test_run_batches_cancel_mid_run() {
        let cancel = Arc::new(AtomicBool::new(false));

        // Workers = 1 so batches run in order; cancel after the second batch.
        let cancel_ref = Arc::clone(&cancel);
        let run = run_batches((0..8u32).collect(), 2, 1, &cancel, |index, batch| {
            let cancel = Arc::clone(&cancel_ref);
            async move {
                if index == 1 {
                    cancel.store(true, Ordering::SeqCst);
                }
                Ok(BatchStats {
                    pairs: batch.len() as u64,
                    edges: 0,
                })
            }
        })
        .await;

        assert_eq!(run.batches, 4);
        assert_eq!(run.skipped, 2);
        assert_eq!(run.totals.pairs, 4);
    }

    #[tokio::test]
    async fn test_run_batches_zero_batch_size_is_clamped() {
        let cancel = AtomicBool::new(false);
        let run = run_batches(vec![1u32, 2, 3], 0, 0, &cancel, |_, batch| async move {
            Ok(BatchStats {
                pairs: batch.len() as u64,
                edges: 0,
            })
        })
        .await;

        assert_eq!(run.batches, 3);
        assert_eq!(run.totals.pairs, 3);
    }

    #[tokio::test]
    async fn test_run_batches_failures_sorted_by_index() {
        let cancel = AtomicBool::new(false);

        let run = run_batches((0..12u32).collect(), 2, 4, &cancel, |index, _| async move {
            if index % 2 == 0 {
                anyhow::bail!("batch {index} failed");
            }
            Ok(BatchStats::default())
        })
        .await;

        let indexes: Vec<usize> = run.failures.iter().map(|f| f.batch_index).collect();
        assert_eq!(indexes, vec![0, 2, 4]);
    }
}
