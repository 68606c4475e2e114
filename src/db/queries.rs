// Database queries — all SQL for the similarity engine.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces
// over typed rows. Rows that fail validation (unparseable rating lists,
// empty category sets) are skipped with a warning rather than failing the
// whole query — a single bad row must never abort a run.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::models::{
    ActiveUser, BusinessRow, EntityKind, PairScope, RatingFact, Recommendation, SimilarityEdge,
    StoreStats, UserPairRow,
};

// --- Entities and ratings (the minimal write path) ---

/// Insert a user if it doesn't exist yet.
pub fn add_user(conn: &Connection, user_id: &str, name: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (user_id, name) VALUES (?1, ?2)",
        params![user_id, name],
    )?;
    Ok(())
}

/// Insert or replace a business and its category set.
pub fn add_business(
    conn: &mut Connection,
    business_id: &str,
    name: &str,
    categories: &[String],
) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO businesses (business_id, name) VALUES (?1, ?2)
         ON CONFLICT(business_id) DO UPDATE SET name = ?2",
        params![business_id, name],
    )?;
    // Replace the category set wholesale; categories are a set, not a log.
    tx.execute(
        "DELETE FROM business_categories WHERE business_id = ?1",
        params![business_id],
    )?;
    for category in categories {
        let category = category.trim();
        if category.is_empty() {
            continue;
        }
        tx.execute(
            "INSERT OR IGNORE INTO business_categories (business_id, category_name)
             VALUES (?1, ?2)",
            params![business_id, category],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Upsert a rating fact and refresh the business's denormalized aggregates.
pub fn upsert_rating(conn: &mut Connection, fact: &RatingFact) -> Result<()> {
    if !(1.0..=5.0).contains(&fact.rating) {
        bail!(
            "rating {} for ({}, {}) is outside 1.0..=5.0",
            fact.rating,
            fact.user_id,
            fact.business_id
        );
    }
    let business_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM businesses WHERE business_id = ?1",
        params![fact.business_id],
        |row| row.get(0),
    )?;
    if !business_exists {
        bail!("unknown business '{}'", fact.business_id);
    }

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT OR IGNORE INTO users (user_id, name) VALUES (?1, '')",
        params![fact.user_id],
    )?;
    tx.execute(
        "INSERT INTO ratings (user_id, business_id, rating, rated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, business_id) DO UPDATE SET
            rating = excluded.rating,
            rated_at = excluded.rated_at",
        params![fact.user_id, fact.business_id, fact.rating, fact.rated_at],
    )?;
    tx.execute(
        "UPDATE businesses SET
            review_count = (SELECT COUNT(*) FROM ratings WHERE business_id = ?1),
            avg_rating = (SELECT AVG(rating) FROM ratings WHERE business_id = ?1)
         WHERE business_id = ?1",
        params![fact.business_id],
    )?;
    tx.commit()?;
    Ok(())
}

// --- Candidate pair queries (users) ---

/// Users with at least `min_ratings` ratings, busiest first.
///
/// The secondary user_id ordering keeps the worklist stable across
/// invocations with unchanged data.
pub fn fetch_active_users(conn: &Connection, min_ratings: u32) -> Result<Vec<ActiveUser>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, COUNT(business_id) AS rating_count
         FROM ratings
         GROUP BY user_id
         HAVING COUNT(business_id) >= ?1
         ORDER BY rating_count DESC, user_id",
    )?;
    let rows = stmt.query_map(params![min_ratings], |row| {
        Ok(ActiveUser {
            user_id: row.get(0)?,
            rating_count: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Candidate partners for one user: everyone sharing at least
/// `min_common_items` co-rated businesses, with both rating vectors aligned
/// over the shared businesses in business-id order.
pub fn fetch_user_pairs(
    conn: &Connection,
    user_id: &str,
    min_common_items: u32,
    scope: PairScope,
) -> Result<Vec<UserPairRow>> {
    let partner_filter = match scope {
        PairScope::LaterOnly => "r2.user_id > ?1",
        PairScope::All => "r2.user_id <> ?1",
    };
    let sql = format!(
        "SELECT r2.user_id AS partner_id,
                GROUP_CONCAT(r1.rating ORDER BY r1.business_id) AS ratings_a,
                GROUP_CONCAT(r2.rating ORDER BY r1.business_id) AS ratings_b,
                COUNT(r1.business_id) AS common_items
         FROM ratings r1
         JOIN ratings r2 ON r2.business_id = r1.business_id AND {partner_filter}
         WHERE r1.user_id = ?1
         GROUP BY r2.user_id
         HAVING COUNT(r1.business_id) >= ?2
         ORDER BY r2.user_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt.query_map(params![user_id, min_common_items], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, u32>(3)?,
        ))
    })?;

    let mut pairs = Vec::new();
    for row in raw {
        let (partner_id, ratings_a, ratings_b, common_items) = row?;
        let (Some(ratings_a), Some(ratings_b)) =
            (parse_rating_list(&ratings_a), parse_rating_list(&ratings_b))
        else {
            warn!(
                user_id,
                partner_id, "Unparseable rating vector, skipping pair"
            );
            continue;
        };
        pairs.push(UserPairRow {
            partner_id,
            ratings_a,
            ratings_b,
            common_items,
        });
    }
    Ok(pairs)
}

fn parse_rating_list(raw: &str) -> Option<Vec<f64>> {
    raw.split(',')
        .map(|s| s.trim().parse::<f64>().ok())
        .collect()
}

// --- Candidate pair queries (businesses) ---

/// All businesses that have at least one category, with their category sets,
/// in business-id order.
pub fn fetch_businesses_with_categories(conn: &Connection) -> Result<Vec<BusinessRow>> {
    let mut stmt = conn.prepare(
        "SELECT business_id, category_name
         FROM business_categories
         ORDER BY business_id, category_name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    Ok(group_categories(rows.collect::<rusqlite::Result<Vec<_>>>()?))
}

/// One business's category set, if it has any categories.
pub fn fetch_business_row(conn: &Connection, business_id: &str) -> Result<Option<BusinessRow>> {
    let mut stmt = conn.prepare(
        "SELECT category_name FROM business_categories
         WHERE business_id = ?1
         ORDER BY category_name",
    )?;
    let categories: Vec<String> = stmt
        .query_map(params![business_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if categories.is_empty() {
        return Ok(None);
    }
    Ok(Some(BusinessRow {
        business_id: business_id.to_string(),
        categories,
    }))
}

/// All businesses sharing at least one category with the given business,
/// with their full category sets.
pub fn fetch_business_partners(conn: &Connection, business_id: &str) -> Result<Vec<BusinessRow>> {
    let mut stmt = conn.prepare(
        "SELECT bc.business_id, bc.category_name
         FROM business_categories bc
         WHERE bc.business_id IN (
            SELECT DISTINCT bc2.business_id
            FROM business_categories bc1
            JOIN business_categories bc2
              ON bc2.category_name = bc1.category_name
             AND bc2.business_id <> ?1
            WHERE bc1.business_id = ?1
         )
         ORDER BY bc.business_id, bc.category_name",
    )?;
    let rows = stmt.query_map(params![business_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    Ok(group_categories(rows.collect::<rusqlite::Result<Vec<_>>>()?))
}

/// Fold (business_id, category) rows, pre-sorted by business_id, into
/// BusinessRow groups.
fn group_categories(rows: Vec<(String, String)>) -> Vec<BusinessRow> {
    let mut businesses: Vec<BusinessRow> = Vec::new();
    for (business_id, category) in rows {
        match businesses.last_mut() {
            Some(last) if last.business_id == business_id => last.categories.push(category),
            _ => businesses.push(BusinessRow {
                business_id,
                categories: vec![category],
            }),
        }
    }
    businesses
}

// --- Similarity edges ---

fn edge_table(kind: EntityKind) -> (&'static str, &'static str, &'static str, &'static str) {
    match kind {
        EntityKind::User => ("user_similarity", "user_a", "user_b", "common_items"),
        EntityKind::Business => (
            "business_similarity",
            "business_a",
            "business_b",
            "common_categories",
        ),
    }
}

/// Bulk-upsert edges in one transaction. Each edge is atomic at the store:
/// created if absent, overwritten with the newest values if present.
pub fn upsert_edges(conn: &mut Connection, kind: EntityKind, edges: &[SimilarityEdge]) -> Result<()> {
    if edges.is_empty() {
        return Ok(());
    }
    let (table, col_a, col_b, col_support) = edge_table(kind);
    let sql = format!(
        "INSERT INTO {table} ({col_a}, {col_b}, score, {col_support}, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT({col_a}, {col_b}) DO UPDATE SET
            score = excluded.score,
            {col_support} = excluded.{col_support},
            last_updated = excluded.last_updated"
    );
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&sql)?;
        for edge in edges {
            stmt.execute(params![
                edge.entity_a,
                edge.entity_b,
                edge.score,
                edge.support,
                edge.last_updated,
            ])?;
        }
    }
    tx.commit()
        .with_context(|| format!("Failed to commit {} {kind} edges", edges.len()))?;
    Ok(())
}

/// Delete all edges of a kind. Returns the number deleted.
pub fn delete_edges(conn: &Connection, kind: EntityKind) -> Result<u64> {
    let (table, ..) = edge_table(kind);
    let deleted = conn.execute(&format!("DELETE FROM {table}"), [])?;
    Ok(deleted as u64)
}

pub fn edge_count(conn: &Connection, kind: EntityKind) -> Result<i64> {
    let (table, ..) = edge_table(kind);
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

/// All edges of a kind in canonical pair order (mainly for tests and status).
pub fn fetch_edges(conn: &Connection, kind: EntityKind) -> Result<Vec<SimilarityEdge>> {
    let (table, col_a, col_b, col_support) = edge_table(kind);
    let sql = format!(
        "SELECT {col_a}, {col_b}, score, {col_support}, last_updated
         FROM {table}
         ORDER BY {col_a}, {col_b}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(SimilarityEdge {
            entity_a: row.get(0)?,
            entity_b: row.get(1)?,
            score: row.get(2)?,
            support: row.get(3)?,
            last_updated: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// --- Recommendations (consumes the edges; ranking only) ---

/// Businesses in a category that the user's similar users rated highly,
/// weighted by the similarity score of whoever rated them.
pub fn recommend(
    conn: &Connection,
    user_id: &str,
    category: &str,
    limit: u32,
) -> Result<Vec<Recommendation>> {
    let mut stmt = conn.prepare(
        "SELECT b.business_id, b.name,
                SUM(r.rating * s.score) AS weighted_score,
                COUNT(r.rating) AS total_ratings,
                AVG(r.rating) AS avg_rating
         FROM user_similarity s
         JOIN ratings r
           ON r.user_id = CASE WHEN s.user_a = ?1 THEN s.user_b ELSE s.user_a END
         JOIN business_categories bc
           ON bc.business_id = r.business_id AND bc.category_name = ?2
         JOIN businesses b ON b.business_id = r.business_id
         WHERE (s.user_a = ?1 OR s.user_b = ?1)
           AND r.business_id NOT IN (
              SELECT business_id FROM ratings WHERE user_id = ?1
           )
         GROUP BY b.business_id, b.name
         ORDER BY weighted_score DESC, avg_rating DESC, b.business_id
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![user_id, category, limit], |row| {
        Ok(Recommendation {
            business_id: row.get(0)?,
            name: row.get(1)?,
            weighted_score: row.get(2)?,
            total_ratings: row.get(3)?,
            avg_rating: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Objective fallback: top-rated businesses in the category, used when the
/// collaborative query returns nothing.
pub fn recommend_fallback(
    conn: &Connection,
    category: &str,
    limit: u32,
) -> Result<Vec<Recommendation>> {
    let mut stmt = conn.prepare(
        "SELECT b.business_id, b.name,
                COUNT(r.rating) AS total_ratings,
                AVG(r.rating) AS avg_rating
         FROM businesses b
         JOIN business_categories bc
           ON bc.business_id = b.business_id AND bc.category_name = ?1
         JOIN ratings r ON r.business_id = b.business_id
         GROUP BY b.business_id, b.name
         ORDER BY avg_rating DESC, total_ratings DESC, b.name ASC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![category, limit], |row| {
        Ok(Recommendation {
            business_id: row.get(0)?,
            name: row.get(1)?,
            weighted_score: 0.0,
            total_ratings: row.get(2)?,
            avg_rating: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// --- Status ---

pub fn stats(conn: &Connection) -> Result<StoreStats> {
    let count = |sql: &str| -> Result<i64> {
        Ok(conn.query_row(sql, [], |row| row.get(0))?)
    };
    let last_update = |table: &str| -> Result<Option<i64>> {
        let result: Option<i64> = conn
            .query_row(
                &format!("SELECT MAX(last_updated) FROM {table}"),
                [],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(result)
    };
    Ok(StoreStats {
        users: count("SELECT COUNT(*) FROM users")?,
        businesses: count("SELECT COUNT(*) FROM businesses")?,
        ratings: count("SELECT COUNT(*) FROM ratings")?,
        user_edges: edge_count(conn, EntityKind::User)?,
        business_edges: edge_count(conn, EntityKind::Business)?,
        last_user_update: last_update("user_similarity")?,
        last_business_update: last_update("business_similarity")?,
    })
}
