use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::time::Duration;
use tracing::{error, info};

use crate::error::SyncError;
use crate::ws::SnapshotPersister;

/// Block Row from database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockRow {
    pub id: String,
    pub space_id: String,
    pub block_name: String,
    pub block_type: String,
    pub block_content: String,
    pub is_co_work: bool,
    pub co_work_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Block storage backed by a Postgres connection pool
pub struct BlockStore {
    pool: PgPool,
}

impl BlockStore {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // Recycle connections after 30 minutes
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Load a block by ID
    ///
    /// # Returns
    /// * `Result<Option<BlockRow>, SqlxError>` - The block, or None if it does not exist
    pub async fn find_block(&self, block_id: &str) -> Result<Option<BlockRow>, SqlxError> {
        let query_sql = r#"
            SELECT
                b.id,
                b.space_id,
                b.block_name,
                b.block_type,
                b.block_content,
                b.is_co_work,
                b.co_work_id,
                b.created_at,
                b.updated_at
            FROM blocks b
            WHERE b.id = $1
        "#;

        sqlx::query_as::<_, BlockRow>(query_sql)
            .bind(block_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Overwrite the content of a block
    ///
    /// # Returns
    /// * `Result<u64, SqlxError>` - Number of rows updated (0 when the block does not exist)
    pub async fn update_block_content(&self, block_id: &str, content: &str) -> Result<u64, SqlxError> {
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        info!(
            "Saving content of block {}. Pool connections: {} idle, {} in use",
            block_id,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );

        let res = sqlx::query(
            r#"
            UPDATE blocks
            SET block_content = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(content)
        .bind(block_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to update content of block {}: {}", block_id, e);
            e
        })?;

        Ok(res.rows_affected())
    }

    /// Check that the database answers
    pub async fn ping(&self) -> Result<(), SqlxError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }
}

impl SnapshotPersister for BlockStore {
    fn persist(&self, workspace_id: String, snapshot: String) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(async move {
            match self.update_block_content(&workspace_id, &snapshot).await? {
                0 => Err(SyncError::BlockNotFound(workspace_id)),
                _ => Ok(()),
            }
        })
    }
}
