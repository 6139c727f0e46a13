//! Persistent document/section store over SQLite.
//!
//! [`Store`] is an explicitly constructed handle around a [`SqlitePool`];
//! it is passed by reference into the reconciler, never held as process
//! globals. All writes to documents and sections go through this type, and
//! a document's sections are only ever replaced wholesale inside one
//! transaction (delete-all-then-insert-all).

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::Result;
use crate::gateway::vec_to_blob;
use crate::models::{DiscoveredDocument, Section, StoredDocument};

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Open an in-memory database. One connection, so every query sees the
    /// same data.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Load the persisted document set, indexed by path.
    pub async fn load_documents(&self) -> Result<HashMap<String, StoredDocument>> {
        let rows: Vec<(String, String, String, Option<String>)> =
            sqlx::query_as("SELECT id, path, checksum, parent_path FROM documents")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, path, checksum, parent_path)| {
                (
                    path.clone(),
                    StoredDocument {
                        id,
                        path,
                        checksum,
                        parent_path,
                    },
                )
            })
            .collect())
    }

    /// Insert a new document row; returns its generated id.
    pub async fn insert_document(
        &self,
        doc: &DiscoveredDocument,
        version: &str,
        now: i64,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let meta_json = doc.meta.as_ref().map(|m| m.to_string());

        sqlx::query(
            r#"
            INSERT INTO documents (id, path, checksum, meta_json, parent_path, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&doc.path)
        .bind(&doc.checksum)
        .bind(&meta_json)
        .bind(&doc.parent_path)
        .bind(version)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Rewrite checksum, meta, and parent for a changed document.
    pub async fn update_document(
        &self,
        id: &str,
        doc: &DiscoveredDocument,
        version: &str,
        now: i64,
    ) -> Result<()> {
        let meta_json = doc.meta.as_ref().map(|m| m.to_string());

        sqlx::query(
            r#"
            UPDATE documents
            SET checksum = ?, meta_json = ?, parent_path = ?, version = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&doc.checksum)
        .bind(&meta_json)
        .bind(&doc.parent_path)
        .bind(version)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update only the parent reference (content unchanged).
    pub async fn update_parent(
        &self,
        id: &str,
        parent_path: Option<&str>,
        version: &str,
        now: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE documents SET parent_path = ?, version = ?, updated_at = ? WHERE id = ?")
            .bind(parent_path)
            .bind(version)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bookkeeping for an unchanged document: mark it as seen by this pass.
    pub async fn touch_document(&self, id: &str, version: &str, now: i64) -> Result<()> {
        sqlx::query("UPDATE documents SET version = ?, updated_at = ? WHERE id = ?")
            .bind(version)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace a document's sections wholesale, in one transaction.
    pub async fn replace_sections(&self, document_id: &str, sections: &[Section]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sections WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for section in sections {
            sqlx::query(
                r#"
                INSERT INTO sections (id, document_id, slug, heading, content, token_count, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&section.id)
            .bind(&section.document_id)
            .bind(&section.slug)
            .bind(&section.heading)
            .bind(&section.content)
            .bind(section.token_count)
            .bind(vec_to_blob(&section.embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Delete a document and its owned sections.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sections WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Destructive reset for full-refresh mode.
    pub async fn delete_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM sections").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Null every parent_path with no matching documents.path. Returns the
    /// number of rows fixed up.
    pub async fn null_dangling_parents(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE documents SET parent_path = NULL
            WHERE parent_path IS NOT NULL
              AND parent_path NOT IN (SELECT path FROM documents)
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Section count for one document, used by status output and tests.
    pub async fn count_sections(&self, document_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sections WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
