//! Document store for normalized patch lists.
//!
//! The store is keyed like a document database: a *collection* (the artist's
//! storage key) holds *documents* (one per console channel) addressed by id.
//! Writes go through [`DocumentStore::commit_batch`], which is all-or-nothing.
//!
//! [`SqliteStore`] backs the trait with one SQLite table through `sqlx`.

use crate::error::StoreError;
use crate::pipeline::normalize::NormalizedExtraction;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::{debug, info};

pub type Result<T> = std::result::Result<T, StoreError>;

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    document_id TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (collection, document_id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
"#;

/// A document ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub id: String,
    pub data: Value,
}

/// A document as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub collection: String,
    pub document_id: String,
    pub data: Value,
    pub updated_at: String,
}

/// Keyed document storage with atomic batch writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or overwrite every document in one transaction.
    ///
    /// Returns the number of documents written. Within a batch a later
    /// document with the same id replaces an earlier one.
    async fn commit_batch(&self, collection: &str, documents: Vec<NewDocument>) -> Result<usize>;

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>>;

    async fn list_documents(&self, collection: &str) -> Result<Vec<StoredDocument>>;

    async fn list_collections(&self) -> Result<Vec<String>>;
}

/// Write every entry of a normalized patch list under its storage key.
///
/// Document ids are the stringified channel numbers.
pub async fn persist_patch_list(
    store: &dyn DocumentStore,
    extraction: &NormalizedExtraction,
) -> Result<usize> {
    let documents = extraction
        .entries
        .iter()
        .map(|entry| {
            Ok(NewDocument {
                id: entry.document_id(),
                data: serde_json::to_value(entry)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let written = store
        .commit_batch(&extraction.storage_key, documents)
        .await?;
    info!(
        "Stored {} patch list document(s) in '{}'",
        written, extraction.storage_key
    );
    Ok(written)
}

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn open(path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{path}?mode=rwc"))
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;
        debug!("Opened document store at {}", path);

        Ok(Self { pool })
    }

    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn commit_batch(&self, collection: &str, documents: Vec<NewDocument>) -> Result<usize> {
        if collection.is_empty() {
            return Err(StoreError::InvalidCollection(collection.to_string()));
        }

        let updated_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for doc in &documents {
            let data_json = serde_json::to_string(&doc.data)?;
            sqlx::query(
                r#"
                INSERT INTO documents (collection, document_id, data, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(collection, document_id)
                DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
                "#,
            )
            .bind(collection)
            .bind(&doc.id)
            .bind(data_json)
            .bind(&updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(documents.len())
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT collection, document_id, data, updated_at
            FROM documents WHERE collection = ? AND document_id = ?
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(parse_document_row).transpose()
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT collection, document_id, data, updated_at
            FROM documents WHERE collection = ?
            ORDER BY rowid
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_document_row).collect()
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT collection FROM documents ORDER BY collection")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(c,)| c).collect())
    }
}

fn parse_document_row(row: (String, String, String, String)) -> Result<StoredDocument> {
    let (collection, document_id, data, updated_at) = row;
    Ok(StoredDocument {
        collection,
        document_id,
        data: serde_json::from_str(&data)?,
        updated_at,
    })
}
