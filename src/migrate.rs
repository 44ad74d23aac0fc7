//! Store schema.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    pool.close().await;

    println!("Store initialized at {}", config.store.path.display());
    Ok(())
}

/// Create the schema on an open pool. Safe to run repeatedly.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // One row per project per collection; timestamps are unix millis
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body_json TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            modified_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_projects_modified_at ON projects(collection, modified_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let pool = db::open(&dir.path().join("pop.sqlite")).await.unwrap();

        migrate(&pool).await.unwrap();
        migrate(&pool).await.unwrap();

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(tables, vec!["projects".to_string()]);
        pool.close().await;
    }
}
