//! Relational connection pooling, migrations, and health checks.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub type DatabasePool = SqlitePool;

#[derive(Debug, Clone)]
pub struct PoolStatistics {
    pub idle_connections: u32,
    pub active_connections: u32,
    pub max_connections: u32,
    pub collected_at: u64,
}

/// Owns the SQLite pool backing [`crate::meta_store::MetaStore`] and
/// [`crate::graph_store::GraphStore`] — both relational data and the graph
/// tables live in the same database per spec.md §3.
#[derive(Clone)]
pub struct DatabaseConnection {
    pool: Arc<DatabasePool>,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::with_max_connections(database_url, 5).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").fetch_one(self.pool.as_ref()).await?;
        Ok(())
    }

    pub fn pool_statistics(&self) -> PoolStatistics {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let idle = self.pool.num_idle() as u32;
        let total = self.pool.size();
        PoolStatistics {
            idle_connections: idle,
            active_connections: total.saturating_sub(idle),
            max_connections: total,
            collected_at: now,
        }
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_and_runs_migrations() {
        let conn = DatabaseConnection::new("sqlite::memory:").await.unwrap();
        conn.run_migrations().await.unwrap();
        assert!(conn.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn pool_statistics_reports_capacity() {
        let conn = DatabaseConnection::with_max_connections("sqlite::memory:", 10).await.unwrap();
        assert_eq!(conn.pool_statistics().max_connections, 10);
    }
}
