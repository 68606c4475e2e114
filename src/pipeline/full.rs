// Full recompute: rebuild an entire edge table from current facts.
//
// Delete-then-rebuild, under the per-kind run lock. Deleting first means a
// pair that no longer clears the thresholds does not survive as a stale
// edge; a run that fails partway leaves a partial table, and the fix is to
// run again.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::db::models::{EntityKind, PairScope};
use crate::db::Store;
use crate::pipeline::batch::{self, BatchStats};
use crate::pipeline::lock::RunLock;
use crate::pipeline::writer;
use crate::pipeline::{RunReport, SimilarityParams};
use crate::similarity::candidates;

/// Recompute all user-user similarity edges from the current ratings.
pub async fn recompute_users(
    store: &Arc<dyn Store>,
    lock: &RunLock,
    params: SimilarityParams,
    cancel: &AtomicBool,
) -> Result<RunReport> {
    let _guard = lock.try_acquire(EntityKind::User)?;
    let start = Instant::now();
    let now_ms = Utc::now().timestamp_millis();

    let deleted = store.delete_edges(EntityKind::User).await?;
    info!(deleted, "Cleared user similarity edges for rebuild");

    // A user needs at least min_common_items ratings to co-rate that many
    // businesses with anyone.
    let actives = store.fetch_active_users(params.min_common_items).await?;
    if actives.is_empty() {
        info!("No users meet the activity floor, nothing to recompute");
        return Ok(RunReport::empty(EntityKind::User));
    }
    info!(users = actives.len(), "Starting full user similarity recompute");

    let worklist: Vec<String> = actives.into_iter().map(|u| u.user_id).collect();
    let entities = worklist.len();

    let run = batch::run_batches(worklist, params.batch_size, params.workers, cancel, {
        let store = Arc::clone(store);
        move |_index, batch: Vec<String>| {
            let store = Arc::clone(&store);
            async move {
                let mut stats = BatchStats::default();
                let mut edges = Vec::new();
                for user_id in &batch {
                    // Each pair exactly once: only partners later in the
                    // user-id order, since every user gets a turn.
                    let pairs = store
                        .fetch_user_pairs(user_id, params.min_common_items, PairScope::LaterOnly)
                        .await?;
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
        "Full user similarity recompute finished"
    );
    Ok(report)
}

/// Recompute all business-business similarity edges from current categories.
pub async fn recompute_businesses(
    store: &Arc<dyn Store>,
    lock: &RunLock,
    params: SimilarityParams,
    cancel: &AtomicBool,
) -> Result<RunReport> {
    let _guard = lock.try_acquire(EntityKind::Business)?;
    let start = Instant::now();
    let now_ms = Utc::now().timestamp_millis();

    let deleted = store.delete_edges(EntityKind::Business).await?;
    info!(deleted, "Cleared business similarity edges for rebuild");

    let rows = Arc::new(store.fetch_businesses_with_categories().await?);
    if rows.len() < 2 {
        info!("Fewer than two categorized businesses, nothing to recompute");
        return Ok(RunReport::empty(EntityKind::Business));
    }
    info!(
        businesses = rows.len(),
        "Starting full business similarity recompute"
    );

    // All-pairs over an index worklist: rows are in business-id order, so
    // pairing index i against every j > i covers each pair once, already
    // in canonical order.
    let worklist: Vec<usize> = (0..rows.len()).collect();
    let entities = worklist.len();

    let run = batch::run_batches(worklist, params.batch_size, params.workers, cancel, {
        let store = Arc::clone(store);
        let rows = Arc::clone(&rows);
        move |_index, batch: Vec<usize>| {
            let store = Arc::clone(&store);
            let rows = Arc::clone(&rows);
            async move {
                let mut stats = BatchStats::default();
                let mut edges = Vec::new();
                for &i in &batch {
                    for j in (i + 1)..rows.len() {
                        stats.pairs += 1;
                        if let Some(edge) = candidates::score_business_pair(
                            &rows[i],
                            &rows[j],
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
        "Full business similarity recompute finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::RatingFact;
    use crate::db::open_in_memory;

    async fn seed_rating(store: &Arc<dyn Store>, user: &str, business: &str, rating: f64) {
        store
            .upsert_rating(&RatingFact {
                user_id: user.to_string(),
                business_id: business.to_string(),
                rating,
                rated_at: 1_700_000_000_000,
            })
            .await
            .unwrap();
    }

    async fn seed_businesses(store: &Arc<dyn Store>, ids: &[&str]) {
        for id in ids {
            store.add_business(id, id, &[]).await.unwrap();
        }
    }

    fn params() -> SimilarityParams {
        SimilarityParams::default()
    }

    #[tokio::test]
    async fn test_recompute_users_finds_similar_pair() {
        let store = open_in_memory().unwrap();
        let lock = RunLock::new();
        let cancel = AtomicBool::new(false);

        seed_businesses(&store, &["b1", "b2", "b3"]).await;
        for (b, r1, r2) in [("b1", 5.0, 4.0), ("b2", 3.0, 3.0), ("b3", 4.0, 5.0)] {
            seed_rating(&store, "u1", b, r1).await;
            seed_rating(&store, "u2", b, r2).await;
        }
        // u3 has only two ratings, below the activity floor
        seed_rating(&store, "u3", "b1", 5.0).await;
        seed_rating(&store, "u3", "b2", 5.0).await;

        let report = recompute_users(&store, &lock, params(), &cancel)
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.entities, 2);
        assert_eq!(report.edges_written, 1);

        let edges = store.fetch_edges(EntityKind::User).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].entity_a, "u1");
        assert_eq!(edges[0].entity_b, "u2");
        assert!((edges[0].score - 0.981).abs() < 0.001);
        assert_eq!(edges[0].support, 3);
    }

    #[tokio::test]
    async fn test_recompute_users_is_idempotent() {
        let store = open_in_memory().unwrap();
        let lock = RunLock::new();
        let cancel = AtomicBool::new(false);

        seed_businesses(&store, &["b1", "b2", "b3"]).await;
        for b in ["b1", "b2", "b3"] {
            seed_rating(&store, "u1", b, 4.0).await;
            seed_rating(&store, "u2", b, 4.0).await;
        }

        recompute_users(&store, &lock, params(), &cancel)
            .await
            .unwrap();
        recompute_users(&store, &lock, params(), &cancel)
            .await
            .unwrap();

        assert_eq!(store.edge_count(EntityKind::User).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recompute_users_drops_stale_edges() {
        let store = open_in_memory().unwrap();
        let lock = RunLock::new();
        let cancel = AtomicBool::new(false);

        // A leftover edge for a pair that no longer qualifies
        store
            .upsert_edges(
                EntityKind::User,
                &[crate::db::models::SimilarityEdge::new("ghost1", "ghost2", 0.9, 3, 1)],
            )
            .await
            .unwrap();

        seed_businesses(&store, &["b1", "b2", "b3"]).await;
        for b in ["b1", "b2", "b3"] {
            seed_rating(&store, "u1", b, 4.0).await;
            seed_rating(&store, "u2", b, 4.0).await;
        }

        recompute_users(&store, &lock, params(), &cancel)
            .await
            .unwrap();

        let edges = store.fetch_edges(EntityKind::User).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].entity_a, "u1");
    }

    #[tokio::test]
    async fn test_recompute_users_empty_store() {
        let store = open_in_memory().unwrap();
        let lock = RunLock::new();
        let cancel = AtomicBool::new(false);

        let report = recompute_users(&store, &lock, params(), &cancel)
            .await
            .unwrap();

        assert_eq!(report.entities, 0);
        assert_eq!(report.batches, 0);
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn test_recompute_rejects_concurrent_run_of_same_kind() {
        let store = open_in_memory().unwrap();
        let lock = RunLock::new();
        let cancel = AtomicBool::new(false);

        let _held = lock.try_acquire(EntityKind::User).unwrap();
        let err = recompute_users(&store, &lock, params(), &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already active"));
    }

    #[tokio::test]
    async fn test_recompute_users_cancelled_before_start() {
        let store = open_in_memory().unwrap();
        let lock = RunLock::new();
        let cancel = AtomicBool::new(true);

        seed_businesses(&store, &["b1", "b2", "b3"]).await;
        for b in ["b1", "b2", "b3"] {
            seed_rating(&store, "u1", b, 4.0).await;
            seed_rating(&store, "u2", b, 4.0).await;
        }

        let report = recompute_users(&store, &lock, params(), &cancel)
            .await
            .unwrap();

        assert_eq!(report.skipped_batches, report.batches);
        assert_eq!(report.edges_written, 0);
        assert_eq!(store.edge_count(EntityKind::User).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recompute_businesses_jaccard_pairs() {
        let store = open_in_memory().unwrap();
        let lock = RunLock::new();
        let cancel = AtomicBool::new(false);

        let cats = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        store
            .add_business("b1", "Cafe One", &cats(&["Restaurant", "Cafe"]))
            .await
            .unwrap();
        store
            .add_business("b2", "Bakery Two", &cats(&["Cafe", "Bakery"]))
            .await
            .unwrap();
        store
            .add_business("b3", "Garage", &cats(&["Automotive"]))
            .await
            .unwrap();

        let report = recompute_businesses(&store, &lock, params(), &cancel)
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.entities, 3);
        assert_eq!(report.pairs_processed, 3);
        assert_eq!(report.edges_written, 1);

        let edges = store.fetch_edges(EntityKind::Business).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].entity_a, "b1");
        assert_eq!(edges[0].entity_b, "b2");
        assert!((edges[0].score - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(edges[0].support, 1);
    }

    #[tokio::test]
    async fn test_recompute_businesses_needs_two_categorized() {
        let store = open_in_memory().unwrap();
        let lock = RunLock::new();
        let cancel = AtomicBool::new(false);

        store
            .add_business("b1", "Solo", &["Cafe".to_string()])
            .await
            .unwrap();

        let report = recompute_businesses(&store, &lock, params(), &cancel)
            .await
            .unwrap();
        assert_eq!(report.entities, 0);
        assert_eq!(report.edges_written, 0);
    }

    #[tokio::test]
    async fn test_business_and_user_runs_can_overlap() {
        let store = open_in_memory().unwrap();
        let lock = RunLock::new();
        let cancel = AtomicBool::new(false);

        let _user_guard = lock.try_acquire(EntityKind::User).unwrap();
        // A held user lock must not block a business recompute
        let report = recompute_businesses(&store, &lock, params(), &cancel)
            .await
            .unwrap();
        assert!(report.succeeded());
    }
}
