// Incremental update: rescore only the pairs touching affected entities.
//
// No table clear and no full scan; existing edges for untouched pairs stay
// as they are. When two affected entities are each other's partners the
// pair would be scored twice, so the lower-id side owns it and the higher
// side skips it.

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::db::models::{EntityKind, PairScope};
use crate::db::Store;
use crate::pipeline::batch::{self, BatchStats};
use crate::pipeline::lock::RunLock;
use crate::pipeline::writer;
use crate::pipeline::{RunReport, SimilarityParams};
use crate::similarity::candidates;

/// Rescore every user pair that includes at least one affected user.
pub async fn update_users(
    store: &Arc<dyn Store>,
    lock: &RunLock,
    params: SimilarityParams,
    cancel: &AtomicBool,
    affected: &[String],
) -> Result<RunReport> {
    let _guard = lock.try_acquire(EntityKind::User)?;
    let start = Instant::now();
    let now_ms = Utc::now().timestamp_millis();

    let affected: Arc<BTreeSet<String>> = Arc::new(affected.iter().cloned().collect());
    if affected.is_empty() {
        return Ok(RunReport::empty(EntityKind::User));
    }
    info!(users = affected.len(), "Starting incremental user similarity update");

    let worklist: Vec<String> = affected.iter().cloned().collect();
    let entities = worklist.len();

    let run = batch::run_batches(worklist, params.batch_size, params.workers, cancel, {
        let store = Arc::clone(store);
        let affected = Arc::clone(&affected);
        move |_index, batch: Vec<String>| {
            let store = Arc::clone(&store);
            let affected = Arc::clone(&affected);
            async move {
                let mut stats = BatchStats::default();
                let mut edges = Vec::new();
                for user_id in &batch {
                    // Partners on both sides, since the affected set is
                    // sparse; when the partner is affected too, only the
                    // side with the lesser id scores the pair.
                    let pairs = store
                        .fetch_user_pairs(user_id, params.min_common_items, PairScope::All)
                        .await?;
                    let pairs: Vec<_> = pairs
                        .into_iter()
                        .filter(|p| {
                            !(affected.contains(&p.partner_id) && p.partner_id < *user_id)
                        })
                        .collect();
                    stats.pairs += pairs.len() as u64;
                    edges.extend(candidates::score_user_pairs(
                        user_id,
                        &pairs,
                        params.min_similarity,
                        now_ms,
                    ));
                }
                stats.edges = writer::write_edges(&store, EntityKind::User, &edges).await?;
                Ok(stats)
            }
        }
    })
    .await;

    let report = RunReport::from_batches(
        EntityKind::User,
        entities,
        run,
        start.elapsed().as_millis() as u64,
    );
    info!(
        entities = report.entities,
        pairs = report.pairs_processed,
        edges = report.edges_written,
        failed_batches = report.failed_batches.len(),
        elapsed_ms = report.elapsed_ms,
        "Incremental user similarity update finished"
    );
    Ok(report)
}

/// Rescore every business pair that includes at least one affected business.
pub async fn update_businesses(
    store: &Arc<dyn Store>,
    lock: &RunLock,
    params: SimilarityParams,
    cancel: &AtomicBool,
    affected: &[String],
) -> Result<RunReport> {
    let _guard = lock.try_acquire(EntityKind::Business)?;
    let start = Instant::now();
    let now_ms = Utc::now().timestamp_millis();

    let affected: Arc<BTreeSet<String>> = Arc::new(affected.iter().cloned().collect());
    if affected.is_empty() {
        return Ok(RunReport::empty(EntityKind::Business));
    }
    info!(
        businesses = affected.len(),
        "Starting incremental business similarity update"
    );

    let worklist: Vec<String> = affected.iter().cloned().collect();
    let entities = worklist.len();

    let run = batch::run_batches(worklist, params.batch_size, params.workers, cancel, {
        let store = Arc::clone(store);
        let affected = Arc::clone(&affected);
        move |_index, batch: Vec<String>| {
            let store = Arc::clone(&store);
            let affected = Arc::clone(&affected);
            async move {
                let mut stats = BatchStats::default();
                let mut edges = Vec::new();
                for business_id in &batch {
                    let Some(row) = store.fetch_business_row(business_id).await? else {
                        warn!(business_id, "Affected business has no categories, skipping");
                        continue;
                    };
                    // Candidate partners share at least one category; a
                    // disjoint pair scores 0.0 and could never clear a
                    // positive threshold.
                    let partners = store.fetch_business_partners(business_id).await?;
                    for partner in partners {
                        if affected.contains(&partner.business_id)
                            && partner.business_id < *business_id
                        {
                            continue;
                        }
                        stats.pairs += 1;
                        if let Some(edge) = candidates::score_business_pair(
                            &row,
                            &partner,
                            params.min_similarity,
                            now_ms,
                        ) {
                            edges.push(edge);
                        }
                    }
                }
                stats.edges = writer::write_edges(&store, EntityKind::Business, &edges).await?;
                Ok(stats)
            }
        }
    })
    .await;

    let report = RunReport::from_batches(
        EntityKind::Business,
        entities,
        run,
        start.elapsed().as_millis() as u64,
    );
    info!(
        entities = report.entities,
        pairs = report.pairs_processed,
        edges = report.edges_written,
        failed_batches = report.failed_batches.len(),
        elapsed_ms = report.elapsed_ms,
        "Incremental business similarity update finished"
    );
    Ok(report)
}
