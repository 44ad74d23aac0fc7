//! Project retrieval by id. Used by the `pop get` command.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::store::{ProjectStore, SqliteProjectStore};

/// Stored record for `id` in the configured collection, with `_createdAt`.
pub async fn get_project(config: &Config, id: &str) -> Result<serde_json::Value> {
    let store = SqliteProjectStore::open(config).await?;
    let stored = store.get(&config.store.collection, id).await?;
    store.close().await;

    match stored {
        Some(project) => Ok(project.to_document()),
        None => bail!(
            "project not found: {} (collection '{}')",
            id,
            config.store.collection
        ),
    }
}

pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let document = get_project(config, id).await?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

/// Print the ids stored in the configured collection, one per line.
pub async fn run_list(config: &Config) -> Result<()> {
    let store = SqliteProjectStore::open(config).await?;
    let ids = store.list(&config.store.collection).await;
    store.close().await;

    for id in ids? {
        println!("{}", id);
    }
    Ok(())
}
