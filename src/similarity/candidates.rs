// Candidate-pair scoring — turns raw candidate rows into thresholded edges.
//
// The storage layer hands back candidate rows (aligned rating vectors for
// users, category sets for businesses); this module applies the metric and
// the inclusive minimum-similarity threshold, and canonicalizes the pair
// order so the writer stays idempotent. Malformed rows (empty or mismatched
// vectors, empty category sets) are skipped with a warning — a single bad
// pair never aborts a run.

use std::collections::HashSet;

use tracing::warn;

use crate::db::models::{BusinessRow, SimilarityEdge, UserPairRow};
use crate::similarity::metric::{cosine_similarity, jaccard_similarity};

/// Score one user's candidate partners. Returns edges meeting the inclusive
/// `min_similarity` threshold, in the partners' stable query order.
pub fn score_user_pairs(
    user_id: &str,
    pairs: &[UserPairRow],
    min_similarity: f64,
    now_ms: i64,
) -> Vec<SimilarityEdge> {
    let mut edges = Vec::new();
    for pair in pairs {
        if pair.ratings_a.is_empty() || pair.ratings_a.len() != pair.ratings_b.len() {
            warn!(
                user_id,
                partner_id = pair.partner_id,
                len_a = pair.ratings_a.len(),
                len_b = pair.ratings_b.len(),
                "Misaligned rating vectors, skipping pair"
            );
            continue;
        }

        let score = cosine_similarity(&pair.ratings_a, &pair.ratings_b);
        if score >= min_similarity {
            edges.push(SimilarityEdge::new(
                user_id,
                &pair.partner_id,
                score,
                pair.common_items,
                now_ms,
            ));
        }
    }
    edges
}

/// Score one business pair. Returns an edge when the categories' Jaccard
/// similarity meets the inclusive threshold.
pub fn score_business_pair(
    a: &BusinessRow,
    b: &BusinessRow,
    min_similarity: f64,
    now_ms: i64,
) -> Option<SimilarityEdge> {
    if a.categories.is_empty() || b.categories.is_empty() {
        warn!(
            business_a = a.business_id,
            business_b = b.business_id,
            "Empty category set, skipping pair"
        );
        return None;
    }

    let set_a: HashSet<&str> = a.categories.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.categories.iter().map(String::as_str).collect();
    let common = set_a.intersection(&set_b).count() as u32;

    let score = jaccard_similarity(&set_a, &set_b);
    if score >= min_similarity {
        Some(SimilarityEdge::new(
            &a.business_id,
            &b.business_id,
            score,
            common,
            now_ms,
        ))
    } else {
        None
    }
}
