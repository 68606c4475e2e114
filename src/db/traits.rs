// Store trait — backend-agnostic async interface for the similarity engine's
// storage collaborator.
//
// Implementor: SqliteStore (wraps rusqlite). All methods are async so a
// sync backend (rusqlite via Mutex) and a native async backend can fit
// behind a single interface; the pipeline only ever sees `Arc<dyn Store>`.
//
// Errors are anyhow::Error. Transient write conflicts (busy/locked/deadlock)
// are distinguishable from fatal errors by message — see
// `pipeline::writer::is_transient_conflict`.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{
    ActiveUser, BusinessRow, EntityKind, PairScope, RatingFact, Recommendation, SimilarityEdge,
    StoreStats, UserPairRow,
};

#[async_trait]
pub trait Store: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Write path (feeds the incremental orchestrator) ---

    /// Insert a user if it doesn't exist yet.
    async fn add_user(&self, user_id: &str, name: &str) -> Result<()>;

    /// Insert or replace a business and its category set.
    async fn add_business(&self, business_id: &str, name: &str, categories: &[String])
        -> Result<()>;

    /// Upsert a rating fact (latest fact per (user, business) wins).
    async fn upsert_rating(&self, fact: &RatingFact) -> Result<()>;

    // --- Candidate pair generation ---

    /// Users with at least `min_ratings` ratings, busiest first.
    async fn fetch_active_users(&self, min_ratings: u32) -> Result<Vec<ActiveUser>>;

    /// Candidate partners for one user with aligned rating vectors over the
    /// co-rated businesses. Stable order within one invocation.
    async fn fetch_user_pairs(
        &self,
        user_id: &str,
        min_common_items: u32,
        scope: PairScope,
    ) -> Result<Vec<UserPairRow>>;

    /// All businesses that have at least one category, with category sets.
    async fn fetch_businesses_with_categories(&self) -> Result<Vec<BusinessRow>>;

    /// One business's category set, if it has any categories.
    async fn fetch_business_row(&self, business_id: &str) -> Result<Option<BusinessRow>>;

    /// Businesses sharing at least one category with the given business.
    async fn fetch_business_partners(&self, business_id: &str) -> Result<Vec<BusinessRow>>;

    // --- Similarity edges ---

    /// Bulk-upsert already-thresholded edges. Atomic per edge,
    /// last-write-wins per pair.
    async fn upsert_edges(&self, kind: EntityKind, edges: &[SimilarityEdge]) -> Result<()>;

    /// Delete every edge of a kind (full-recompute rebuild). Returns the
    /// number deleted.
    async fn delete_edges(&self, kind: EntityKind) -> Result<u64>;

    async fn edge_count(&self, kind: EntityKind) -> Result<i64>;

    /// All edges of a kind in canonical pair order.
    async fn fetch_edges(&self, kind: EntityKind) -> Result<Vec<SimilarityEdge>>;

    // --- Consumers ---

    /// Similarity-weighted recommendations for a user within a category.
    async fn recommend(
        &self,
        user_id: &str,
        category: &str,
        limit: u32,
    ) -> Result<Vec<Recommendation>>;

    /// Objective fallback ranking for a category.
    async fn recommend_fallback(&self, category: &str, limit: u32)
        -> Result<Vec<Recommendation>>;

    /// Row and edge counts for the status command.
    async fn stats(&self) -> Result<StoreStats>;
}
