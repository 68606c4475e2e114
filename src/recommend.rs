// Recommendation display — the main consumer of the similarity graph.
//
// Personalized ranking weights each candidate business by the similarity
// of the users who rated it: SUM(rating * similarity) over the asking
// user's neighbors. When the user has no neighbors (or none of them rated
// anything in the category), we fall back to an objective ranking by
// average rating.

use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;

use crate::db::models::Recommendation;
use crate::db::Store;

/// Personalized recommendations for `user_id` in `category`, falling back
/// to the objective ranking when the similarity graph has nothing to offer.
/// The bool is true when the personalized path produced the results.
pub async fn personalized_or_fallback(
    store: &Arc<dyn Store>,
    user_id: &str,
    category: &str,
    limit: u32,
) -> Result<(Vec<Recommendation>, bool)> {
    let recs = store.recommend(user_id, category, limit).await?;
    if !recs.is_empty() {
        return Ok((recs, true));
    }
    let fallback = store.recommend_fallback(category, limit).await?;
    Ok((fallback, false))
}

/// Fetch and print recommendations to the terminal.
pub async fn show(
    store: &Arc<dyn Store>,
    user_id: &str,
    category: &str,
    limit: u32,
) -> Result<()> {
    let (recs, personalized) = personalized_or_fallback(store, user_id, category, limit).await?;

    if recs.is_empty() {
        println!("No businesses found in category {:?}.", category);
        return Ok(());
    }

    if personalized {
        println!(
            "{}",
            format!("Recommendations for {user_id} in {category}:").bold()
        );
    } else {
        println!(
            "{}",
            format!("Top-rated in {category} (no similar users found for {user_id}):").bold()
        );
    }

    for (i, rec) in recs.iter().enumerate() {
        let score_col = if personalized {
            format!("{:>6.2}", rec.weighted_score)
        } else {
            "     -".to_string()
        };
        println!(
            "  {:<4} {:<32} {}  {:.1}★ ({} ratings)",
            format!("{}.", i + 1),
            rec.name,
            score_col.dimmed(),
            rec.avg_rating,
            rec.total_ratings,
        );
    }

    if !personalized {
        println!(
            "{}",
            "Run `kindred recompute users` to enable personalized ranking.".dimmed()
        );
    }

    Ok(())
}
