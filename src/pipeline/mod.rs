// Similarity pipeline — batch scheduling, edge writing, and the two
// orchestrators (full recompute and incremental update).
//
// Both orchestrators bottom out in the same Generate -> Score -> Write
// pipeline; the batch scheduler runs it over a worklist with a bounded
// worker pool and isolates per-batch failures.

pub mod batch;
pub mod full;
pub mod incremental;
pub mod lock;
pub mod writer;

use serde::Serialize;

use crate::db::models::EntityKind;
use batch::{BatchFailure, BatchRun};

/// Engine tunables, supplied by the caller (CLI flags over env config).
#[derive(Debug, Clone, Copy)]
pub struct SimilarityParams {
    /// Minimum co-rated businesses for a user pair to be considered.
    pub min_common_items: u32,
    /// Inclusive minimum similarity score for an edge to be written.
    pub min_similarity: f64,
    /// Entities per batch.
    pub batch_size: usize,
    /// Concurrent batch workers.
    pub workers: usize,
}

impl Default for SimilarityParams {
    fn default() -> Self {
        Self {
            min_common_items: 3,
            min_similarity: 0.3,
            batch_size: 500,
            workers: 4,
        }
    }
}

/// What a completed run did: candidate pairs processed, edges written, and
/// which batches failed (with enough information to investigate).
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub kind: EntityKind,
    pub entities: usize,
    pub batches: usize,
    pub skipped_batches: usize,
    pub pairs_processed: u64,
    pub edges_written: u64,
    pub failed_batches: Vec<BatchFailure>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub(crate) fn from_batches(
        kind: EntityKind,
        entities: usize,
        run: BatchRun,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            kind,
            entities,
            batches: run.batches,
            skipped_batches: run.skipped,
            pairs_processed: run.totals.pairs,
            edges_written: run.totals.edges,
            failed_batches: run.failures,
            elapsed_ms,
        }
    }

    /// An empty-worklist run (nothing to do).
    pub(crate) fn empty(kind: EntityKind) -> Self {
        Self {
            kind,
            entities: 0,
            batches: 0,
            skipped_batches: 0,
            pairs_processed: 0,
            edges_written: 0,
            failed_batches: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failed_batches.is_empty()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} similarity run: {} entities in {} batches ({:.2}s)",
            self.kind,
            self.entities,
            self.batches,
            self.elapsed_ms as f64 / 1000.0,
        )?;
        writeln!(f, "  pairs processed: {}", self.pairs_processed)?;
        writeln!(f, "  edges written:   {}", self.edges_written)?;
        if self.skipped_batches > 0 {
            writeln!(f, "  batches skipped (cancelled): {}", self.skipped_batches)?;
        }
        if self.failed_batches.is_empty() {
            write!(f, "  batches failed:  0")?;
        } else {
            write!(f, "  batches failed:  {}", self.failed_batches.len())?;
            for failure in &self.failed_batches {
                write!(
                    f,
                    "\n    batch {} ({} entities): {}",
                    failure.batch_index, failure.entities, failure.error
                )?;
            }
        }
        Ok(())
    }
}
