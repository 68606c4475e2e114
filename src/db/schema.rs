// Database schema — table creation and migrations.
//
// We use a simple version-based migration approach: a `schema_version` table
// tracks which migrations have run, and each migration is a function that
// executes SQL statements.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// This is idempotent — safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            name TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS businesses (
            business_id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        -- Category labels per business (a business has a set of categories)
        CREATE TABLE IF NOT EXISTS business_categories (
            business_id TEXT NOT NULL,
            category_name TEXT NOT NULL,
            PRIMARY KEY (business_id, category_name)
        );

        -- Rating facts. One row per (user, business); a later rating for the
        -- same pair replaces the earlier one.
        CREATE TABLE IF NOT EXISTS ratings (
            user_id TEXT NOT NULL,
            business_id TEXT NOT NULL,
            rating REAL NOT NULL,
            rated_at INTEGER NOT NULL,       -- epoch millis
            PRIMARY KEY (user_id, business_id)
        );

        -- Similarity edges. The canonical pair order (user_a < user_b) is
        -- enforced by SimilarityEdge::new; the primary key then guarantees
        -- at most one edge per unordered pair.
        CREATE TABLE IF NOT EXISTS user_similarity (
            user_a TEXT NOT NULL,
            user_b TEXT NOT NULL,
            score REAL NOT NULL,
            common_items INTEGER NOT NULL,
            last_updated INTEGER NOT NULL,   -- epoch millis
            PRIMARY KEY (user_a, user_b)
        );

        CREATE TABLE IF NOT EXISTS business_similarity (
            business_a TEXT NOT NULL,
            business_b TEXT NOT NULL,
            score REAL NOT NULL,
            common_categories INTEGER NOT NULL,
            last_updated INTEGER NOT NULL,   -- epoch millis
            PRIMARY KEY (business_a, business_b)
        );

        -- Co-rating joins pivot on business_id
        CREATE INDEX IF NOT EXISTS idx_ratings_business
            ON ratings(business_id);

        -- Shared-category partner lookups pivot on category_name
        CREATE INDEX IF NOT EXISTS idx_categories_name
            ON business_categories(category_name);

        -- Edge lookups from either end of the pair
        CREATE INDEX IF NOT EXISTS idx_user_similarity_b
            ON user_similarity(user_b);

        CREATE INDEX IF NOT EXISTS idx_business_similarity_b
            ON business_similarity(business_b);
        ",
    )
    .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: denormalized aggregates on businesses, used by the
    // objective fallback ranking so it doesn't re-scan ratings.
    run_migration(conn, 2, |c| {
        c.execute_batch(
            "ALTER TABLE businesses ADD COLUMN avg_rating REAL;
             ALTER TABLE businesses ADD COLUMN review_count INTEGER NOT NULL DEFAULT 0;",
        )
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
/// The migration function receives the connection and should execute its SQL.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        // Running create_tables twice should not error
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
    }

    #[test]
    fn test_table_count() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        let count = table_count(&conn).unwrap();
        // schema_version, users, businesses, business_categories, ratings,
        // user_similarity, business_similarity = 7 tables
        assert_eq!(count, 7i64);
    }

    #[test]
    fn test_migration_v2_adds_aggregate_columns() {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();

        conn.execute(
            "INSERT INTO businesses (business_id, name, avg_rating, review_count)
             VALUES ('b1', 'Cafe Uno', 4.2, 17)",
            [],
        )
        .unwrap();

        let (avg, count): (f64, i64) = conn
            .query_row(
                "SELECT avg_rating, review_count FROM businesses WHERE business_id = 'b1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!((avg - 4.2).abs() < f64::EPSILON);
        assert_eq!(count, 17);
    }

    #[test]
    fn test_migration_v2_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        // Run create_tables three times — the migration should only run once
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();
        create_tables(&conn).unwrap();

        let versions: Vec<i64> = conn
            .prepare("SELECT version FROM schema_version ORDER BY version")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(versions, vec![1, 2]);
    }
}
