// SqliteStore — rusqlite backend implementing the Store trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Send.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points — Rust enforces this because
// MutexGuard is !Send. The lock is the store's "connection acquisition":
// scoped to one call, released on every exit path including errors.
//
// The free functions in queries.rs remain usable against a bare Connection,
// which is how the co-located query tests exercise them.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{
    ActiveUser, BusinessRow, EntityKind, PairScope, RatingFact, Recommendation, SimilarityEdge,
    StoreStats, UserPairRow,
};
use super::traits::Store;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn add_user(&self, user_id: &str, name: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::add_user(&conn, user_id, name)
    }

    async fn add_business(
        &self,
        business_id: &str,
        name: &str,
        categories: &[String],
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        super::queries::add_business(&mut conn, business_id, name, categories)
    }

    async fn upsert_rating(&self, fact: &RatingFact) -> Result<()> {
        let mut conn = self.conn.lock().await;
        super::queries::upsert_rating(&mut conn, fact)
    }

    async fn fetch_active_users(&self, min_ratings: u32) -> Result<Vec<ActiveUser>> {
        let conn = self.conn.lock().await;
        super::queries::fetch_active_users(&conn, min_ratings)
    }

    async fn fetch_user_pairs(
        &self,
        user_id: &str,
        min_common_items: u32,
        scope: PairScope,
    ) -> Result<Vec<UserPairRow>> {
        let conn = self.conn.lock().await;
        super::queries::fetch_user_pairs(&conn, user_id, min_common_items, scope)
    }

    async fn fetch_businesses_with_categories(&self) -> Result<Vec<BusinessRow>> {
        let conn = self.conn.lock().await;
        super::queries::fetch_businesses_with_categories(&conn)
    }

    async fn fetch_business_row(&self, business_id: &str) -> Result<Option<BusinessRow>> {
        let conn = self.conn.lock().await;
        super::queries::fetch_business_row(&conn, business_id)
    }

    async fn fetch_business_partners(&self, business_id: &str) -> Result<Vec<BusinessRow>> {
        let conn = self.conn.lock().await;
        super::queries::fetch_business_partners(&conn, business_id)
    }

    async fn upsert_edges(&self, kind: EntityKind, edges: &[SimilarityEdge]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        super::queries::upsert_edges(&mut conn, kind, edges)
    }

    async fn delete_edges(&self, kind: EntityKind) -> Result<u64> {
        let conn = self.conn.lock().await;
        super::queries::delete_edges(&conn, kind)
    }

    async fn edge_count(&self, kind: EntityKind) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::edge_count(&conn, kind)
    }

    async fn fetch_edges(&self, kind: EntityKind) -> Result<Vec<SimilarityEdge>> {
        let conn = self.conn.lock().await;
        super::queries::fetch_edges(&conn, kind)
    }

    async fn recommend(
        &self,
        user_id: &str,
        category: &str,
        limit: u32,
    ) -> Result<Vec<Recommendation>> {
        let conn = self.conn.lock().await;
        super::queries::recommend(&conn, user_id, category, limit)
    }

    async fn recommend_fallback(
        &self,
        category: &str,
        limit: u32,
    ) -> Result<Vec<Recommendation>> {
        let conn = self.conn.lock().await;
        super::queries::recommend_fallback(&conn, category, limit)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().await;
        super::queries::stats(&conn)
    }
}
