// Similarity metrics.
//
// Cosine similarity compares two users' aligned rating vectors over their
// co-rated businesses; Jaccard similarity compares two businesses' category
// sets. Both are deterministic, symmetric, and return 0.0 instead of erroring
// on degenerate input (zero magnitude, empty union, mismatched lengths) so a
// bad pair never aborts a run.

use std::collections::HashSet;
use std::hash::Hash;

/// Cosine similarity between two equal-length rating vectors.
///
/// Returns 0.0 when either vector has zero magnitude, or when the vectors
/// are empty or of different lengths.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Jaccard similarity |A ∩ B| / |A ∪ B| between two sets.
///
/// Returns 0.0 when both sets are empty.
pub fn jaccard_similarity<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;

    if union == 0 {
        return 0.0;
    }

    intersection as f64 / union as f64
}
