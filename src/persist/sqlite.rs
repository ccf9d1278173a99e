use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use super::{BackingStore, IndexSnapshot};
use crate::error::{IndexError, Result};
use crate::models::{Chunk, Document, SearchHistoryEntry};
use crate::store::{blob_to_vec, vec_to_blob, StoredVector};

/// Backing store in a SQLite database (WAL mode).
///
/// Each save runs in one transaction, so readers of the file never see a
/// half-written snapshot.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                url TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                indexed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                text TEXT NOT NULL,
                hash TEXT NOT NULL,
                UNIQUE(url, ordinal),
                FOREIGN KEY (url) REFERENCES documents(url)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                chunk_id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                position INTEGER NOT NULL,
                dims INTEGER NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_history (
                position INTEGER PRIMARY KEY,
                query TEXT NOT NULL,
                result_count INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_url ON chunks(url)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| IndexError::StoreUnavailable(format!("malformed timestamp '{}': {}", raw, e)))
}

#[async_trait]
impl BackingStore for SqliteStore {
    async fn load_index(&self) -> Result<IndexSnapshot> {
        let mut documents = BTreeMap::new();

        let rows = sqlx::query("SELECT url, title, indexed_at FROM documents")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let url: String = row.try_get("url")?;
            let indexed_at: String = row.try_get("indexed_at")?;
            documents.insert(
                url.clone(),
                Document {
                    url,
                    title: row.try_get("title")?,
                    chunks: Vec::new(),
                    indexed_at: parse_timestamp(&indexed_at)?,
                },
            );
        }

        let rows = sqlx::query("SELECT id, url, ordinal, text, hash FROM chunks ORDER BY url, ordinal")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let url: String = row.try_get("url")?;
            let ordinal: i64 = row.try_get("ordinal")?;
            let chunk = Chunk {
                id: row.try_get("id")?,
                ordinal: ordinal as usize,
                text: row.try_get("text")?,
                hash: row.try_get("hash")?,
            };
            if let Some(doc) = documents.get_mut(&url) {
                doc.chunks.push(chunk);
            }
        }

        let rows = sqlx::query("SELECT chunk_id, url, dims, embedding FROM vectors ORDER BY position")
            .fetch_all(&self.pool)
            .await?;
        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let chunk_id: String = row.try_get("chunk_id")?;
            let dims: i64 = row.try_get("dims")?;
            let blob: Vec<u8> = row.try_get("embedding")?;
            let vector = blob_to_vec(&blob);
            if vector.len() != dims as usize {
                return Err(IndexError::StoreUnavailable(format!(
                    "malformed vector for {}: {} bytes for {} dims",
                    chunk_id,
                    blob.len(),
                    dims
                )));
            }
            vectors.push(StoredVector {
                url: row.try_get("url")?,
                chunk_id,
                vector,
            });
        }

        Ok(IndexSnapshot { documents, vectors })
    }

    async fn save_index(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM vectors").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;

        for doc in snapshot.documents.values() {
            sqlx::query("INSERT INTO documents (url, title, indexed_at) VALUES (?, ?, ?)")
                .bind(&doc.url)
                .bind(&doc.title)
                .bind(doc.indexed_at.to_rfc3339())
                .execute(&mut *tx)
                .await?;

            for chunk in &doc.chunks {
                sqlx::query(
                    "INSERT INTO chunks (id, url, ordinal, text, hash) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&chunk.id)
                .bind(&doc.url)
                .bind(chunk.ordinal as i64)
                .bind(&chunk.text)
                .bind(&chunk.hash)
                .execute(&mut *tx)
                .await?;
            }
        }

        for (position, sv) in snapshot.vectors.iter().enumerate() {
            sqlx::query(
                "INSERT INTO vectors (chunk_id, url, position, dims, embedding) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&sv.chunk_id)
            .bind(&sv.url)
            .bind(position as i64)
            .bind(sv.vector.len() as i64)
            .bind(vec_to_blob(&sv.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            documents = snapshot.documents.len(),
            vectors = snapshot.vectors.len(),
            "saved index to sqlite"
        );
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<SearchHistoryEntry>> {
        let rows = sqlx::query(
            "SELECT query, result_count, timestamp FROM search_history ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<SearchHistoryEntry> {
                let result_count: i64 = row.try_get("result_count")?;
                let timestamp: String = row.try_get("timestamp")?;
                Ok(SearchHistoryEntry {
                    query: row.try_get("query")?,
                    result_count: result_count as usize,
                    timestamp: parse_timestamp(&timestamp)?,
                })
            })
            .collect()
    }

    async fn save_history(&self, entries: &[SearchHistoryEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM search_history")
            .execute(&mut *tx)
            .await?;
        for (position, entry) in entries.iter().enumerate() {
            sqlx::query(
                "INSERT INTO search_history (position, query, result_count, timestamp) VALUES (?, ?, ?, ?)",
            )
            .bind(position as i64)
            .bind(&entry.query)
            .bind(entry.result_count as i64)
            .bind(entry.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
