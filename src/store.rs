//! Project storage.
//!
//! The [`ProjectStore`] trait is the document store assembled projects
//! are handed to. It owns the `_createdAt` stamp: set the first time a
//! project id is written to a collection and kept on every later write.
//! Every write stores the record with its fresh timestamps; a SHA-256 hash
//! of the resolved content (timestamps excluded) tells an `Unchanged`
//! write apart from an `Updated` one.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::{AssembledProject, ProjectCore, ProvenanceMap};

/// What a [`ProjectStore::put`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PutOutcome {
    Created,
    Updated,
    Unchanged,
}

/// A project record as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProject {
    pub collection: String,
    pub id: String,
    pub body: serde_json::Value,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl StoredProject {
    /// The stored record with its `_createdAt` stamp.
    pub fn to_document(&self) -> serde_json::Value {
        let mut document = self.body.clone();
        if let serde_json::Value::Object(fields) = &mut document {
            fields.insert(
                "_createdAt".to_string(),
                serde_json::Value::String(self.created_at.to_rfc3339_opts(
                    chrono::SecondsFormat::AutoSi,
                    true,
                )),
            );
        }
        document
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashedContent<'a> {
    core: &'a ProjectCore,
    sources: Vec<(&'a str, &'a serde_json::Value)>,
    source_map: &'a ProvenanceMap,
}

/// Hash of everything in a project except its timestamps.
pub fn content_hash(project: &AssembledProject) -> Result<String> {
    let content = serde_json::to_vec(&HashedContent {
        core: &project.core,
        sources: project
            .sources
            .sources
            .iter()
            .map(|source| (source.name.as_str(), &source.config))
            .collect(),
        source_map: &project.source_map,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn put(&self, collection: &str, project: &AssembledProject) -> Result<PutOutcome>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredProject>>;

    /// Ids in a collection, sorted.
    async fn list(&self, collection: &str) -> Result<Vec<String>>;
}

pub struct SqliteProjectStore {
    pool: SqlitePool,
}

impl SqliteProjectStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the configured database, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| anyhow!("invalid timestamp: {}", millis))
}

#[async_trait]
impl ProjectStore for SqliteProjectStore {
    async fn put(&self, collection: &str, project: &AssembledProject) -> Result<PutOutcome> {
        let hash = content_hash(project)?;
        let body = serde_json::to_string(project)?;
        let modified_at = project.modified_at.timestamp_millis();

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT content_hash FROM projects WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(&project.id)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            None => {
                sqlx::query(
                    "INSERT INTO projects (collection, id, body_json, content_hash, created_at, modified_at) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(collection)
                .bind(&project.id)
                .bind(&body)
                .bind(&hash)
                .bind(modified_at)
                .bind(modified_at)
                .execute(&mut *tx)
                .await?;
                PutOutcome::Created
            }
            Some(row) => {
                let outcome = if row.get::<String, _>("content_hash") == hash {
                    PutOutcome::Unchanged
                } else {
                    PutOutcome::Updated
                };
                // refreshed stamps are written even when the content is unchanged
                sqlx::query(
                    "UPDATE projects SET body_json = ?, content_hash = ?, modified_at = ? \
                     WHERE collection = ? AND id = ?",
                )
                .bind(&body)
                .bind(&hash)
                .bind(modified_at)
                .bind(collection)
                .bind(&project.id)
                .execute(&mut *tx)
                .await?;
                outcome
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredProject>> {
        let row = sqlx::query(
            "SELECT id, body_json, content_hash, created_at, modified_at \
             FROM projects WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let body_json: String = row.get("body_json");
        Ok(Some(StoredProject {
            collection: collection.to_string(),
            id: row.get("id"),
            body: serde_json::from_str(&body_json)
                .with_context(|| format!("stored record for '{}' is not valid JSON", id))?,
            content_hash: row.get("content_hash"),
            created_at: from_millis(row.get("created_at"))?,
            modified_at: from_millis(row.get("modified_at"))?,
        }))
    }

    async fn list(&self, collection: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM projects WHERE collection = ? ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}

/// In-memory store for tests and dry runs.
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<(String, String), StoredProject>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("project store lock poisoned")
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn put(&self, collection: &str, project: &AssembledProject) -> Result<PutOutcome> {
        let hash = content_hash(project)?;
        let body = serde_json::to_value(project)?;
        let key = (collection.to_string(), project.id.clone());

        let mut projects = self.projects.write().map_err(poisoned)?;
        let outcome = match projects.get_mut(&key) {
            None => {
                projects.insert(
                    key,
                    StoredProject {
                        collection: collection.to_string(),
                        id: project.id.clone(),
                        body,
                        content_hash: hash,
                        created_at: project.modified_at,
                        modified_at: project.modified_at,
                    },
                );
                PutOutcome::Created
            }
            Some(stored) => {
                let outcome = if stored.content_hash == hash {
                    PutOutcome::Unchanged
                } else {
                    PutOutcome::Updated
                };
                stored.body = body;
                stored.content_hash = hash;
                stored.modified_at = project.modified_at;
                outcome
            }
        };
        Ok(outcome)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredProject>> {
        let projects = self.projects.read().map_err(poisoned)?;
        Ok(projects
            .get(&(collection.to_string(), id.to_string()))
            .cloned())
    }

    async fn list(&self, collection: &str) -> Result<Vec<String>> {
        let projects = self.projects.read().map_err(poisoned)?;
        let mut ids: Vec<String> = projects
            .keys()
            .filter(|(c, _)| c == collection)
            .map(|(_, id)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
