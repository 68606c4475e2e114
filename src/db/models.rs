// Data models — Rust structs that map to database rows.
//
// These are the types that flow through the similarity pipeline. They're
// separate from the database queries so other modules can use them without
// depending on rusqlite directly. Rows are validated here at the storage
// boundary; nothing downstream sees untyped records.

use serde::{Deserialize, Serialize};

/// Which side of the dataset a similarity run operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    User,
    Business,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Business => "business",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which partners a candidate-pair query returns for one entity.
///
/// Full recompute walks every entity, so fetching only lexicographically
/// later partners covers each pair exactly once. Incremental updates work
/// from a sparse affected set and need partners on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairScope {
    LaterOnly,
    All,
}

/// One rating a user gave a business. Upserted on (user_id, business_id);
/// a later fact for the same pair supersedes the earlier one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingFact {
    pub user_id: String,
    pub business_id: String,
    /// Star rating, 1.0 to 5.0.
    pub rating: f64,
    /// Epoch milliseconds.
    pub rated_at: i64,
}

/// A stored similarity result for an unordered entity pair.
///
/// Invariant: `entity_a < entity_b` lexicographically, enforced by the
/// constructor so the store's primary key keeps at most one edge per pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub entity_a: String,
    pub entity_b: String,
    /// Similarity score, 0.0 to 1.0.
    pub score: f64,
    /// Co-rated item count (users) or shared category count (businesses).
    pub support: u32,
    /// Epoch milliseconds of the run that last wrote this edge.
    pub last_updated: i64,
}

impl SimilarityEdge {
    /// Build an edge with the pair in canonical order.
    pub fn new(a: &str, b: &str, score: f64, support: u32, last_updated: i64) -> Self {
        let (entity_a, entity_b) = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        Self {
            entity_a,
            entity_b,
            score,
            support,
            last_updated,
        }
    }
}

/// A user who has rated enough businesses to participate in similarity runs.
#[derive(Debug, Clone)]
pub struct ActiveUser {
    pub user_id: String,
    pub rating_count: u32,
}

/// A candidate partner for one user: the two rating vectors are aligned over
/// the co-rated businesses, in matching (business-id) order.
#[derive(Debug, Clone)]
pub struct UserPairRow {
    pub partner_id: String,
    pub ratings_a: Vec<f64>,
    pub ratings_b: Vec<f64>,
    pub common_items: u32,
}

/// A business and its category labels.
#[derive(Debug, Clone)]
pub struct BusinessRow {
    pub business_id: String,
    pub categories: Vec<String>,
}

/// One ranked recommendation for a user.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub business_id: String,
    pub name: String,
    /// Similarity-weighted score (0.0 for objective fallback results).
    pub weighted_score: f64,
    pub total_ratings: u32,
    pub avg_rating: f64,
}

/// Row and edge counts for the status command.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub users: i64,
    pub businesses: i64,
    pub ratings: i64,
    pub user_edges: i64,
    pub business_edges: i64,
    /// Epoch millis of the most recent edge write per kind, if any.
    pub last_user_update: Option<i64>,
    pub last_business_update: Option<i64>,
}
