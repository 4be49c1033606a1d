//! Relational metadata store backed by SQLite
//!
//! Holds the durable item rows, their content chunks, the embedding-tracking
//! rows, and the FTS5 projection of active items. WAL journaling and foreign
//! keys are enabled on every pooled connection. All multi-statement
//! mutations run inside a single transaction; failures roll back and surface
//! as database faults.

use crate::error::{Result, ZmemError};
use crate::types::{
    ContentChunk, MemoryItem, MemoryStatus, MemoryType, Scope, WorkspaceStatus,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Embedded, forward-only migrations. Each entry is applied at most once,
/// inside its own transaction, and recorded in `schema_migrations`.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../migrations/001_initial_schema.sql")),
    (2, include_str!("../../migrations/002_fts_index.sql")),
    (3, include_str!("../../migrations/003_indexes.sql")),
];

/// Split migration SQL into executable statements.
///
/// A semicolon normally terminates a statement, but `CREATE TRIGGER` bodies
/// carry inner semicolons, so a statement that opens a trigger only closes
/// at the `END;` line that ends the body. Comment-only and blank lines are
/// dropped.
fn split_migration_sql(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_trigger = false;

    for raw_line in sql.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("--") {
            continue;
        }

        if buf.is_empty() {
            in_trigger = line.to_ascii_uppercase().starts_with("CREATE TRIGGER");
        } else {
            buf.push('\n');
        }
        buf.push_str(line);

        let terminated = if in_trigger {
            line.eq_ignore_ascii_case("END;")
        } else {
            line.ends_with(';')
        };
        if terminated {
            out.push(std::mem::take(&mut buf));
            in_trigger = false;
        }
    }

    if !buf.is_empty() {
        out.push(buf);
    }
    out
}

/// Filter clause shared by the lexical query paths.
#[derive(Debug, Clone)]
pub struct LexicalFilter {
    pub workspace: String,
    pub scopes: Vec<Scope>,
    pub types: Vec<MemoryType>,
    pub statuses: Vec<MemoryStatus>,
}

/// One row produced by a lexical query path (FTS or archived LIKE).
#[derive(Debug, Clone)]
pub struct LexicalRow {
    pub id: String,
    pub title: String,
    pub snippet: String,
    /// Raw BM25 rank for FTS rows; unused for archived rows
    pub rank: f64,
    pub scope: Scope,
    pub item_type: MemoryType,
    pub status: MemoryStatus,
}

/// Hydration record for vector search results.
#[derive(Debug, Clone)]
pub struct ItemMeta {
    pub id: String,
    pub title: String,
    pub content: String,
    pub scope: Scope,
    pub item_type: MemoryType,
    pub status: MemoryStatus,
}

/// Relational store for items, chunks, embedding-tracking rows and the
/// full-text index.
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    /// Open (or create) the store at `path`, enable WAL and foreign keys,
    /// and bring the schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| ZmemError::Database(format!("invalid database path: {}", e)))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, flushing the WAL. Later calls fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        for (version, sql) in MIGRATIONS {
            let applied: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations WHERE version = ?")
                    .bind(version)
                    .fetch_one(&self.pool)
                    .await?;
            if applied > 0 {
                continue;
            }

            let mut tx = self.pool.begin().await?;
            for statement in split_migration_sql(sql) {
                sqlx::query(&statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        ZmemError::Database(format!(
                            "migration {} failed: {}\nstatement: {}",
                            version,
                            e,
                            &statement[..statement.len().min(200)]
                        ))
                    })?;
            }
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(Utc::now().to_rfc3339())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            info!("Applied migration {}", version);
        }

        Ok(())
    }

    // === Item rows ===

    /// Insert a new item together with its chunks and embedding-tracking
    /// rows in one transaction. The item's `status` field is written as-is;
    /// the save protocol inserts with `pending`.
    pub async fn insert_item(
        &self,
        item: &MemoryItem,
        chunks: &[ContentChunk],
        model: &str,
    ) -> Result<()> {
        debug!("Inserting item {} ({} chunks)", item.id, chunks.len());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO memory_items (
                id, type, title, content, summary, source, scope, workspace,
                tags, importance, status, supersedes_id, content_hash,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(item.item_type.as_str())
        .bind(&item.title)
        .bind(&item.content)
        .bind(&item.summary)
        .bind(&item.source)
        .bind(item.scope.as_str())
        .bind(&item.workspace)
        .bind(serde_json::to_string(&item.tags)?)
        .bind(item.importance)
        .bind(item.status.as_str())
        .bind(&item.supersedes_id)
        .bind(&item.content_hash)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let now = Utc::now().to_rfc3339();
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO content_chunks (id, memory_id, seq, pos, token_count, chunk_text, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.memory_id)
            .bind(chunk.seq)
            .bind(chunk.pos)
            .bind(chunk.token_count)
            .bind(&chunk.text)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunk_embeddings (chunk_id, embedded_at, model) VALUES (?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&now)
            .bind(model)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| ZmemError::Database(format!("insert commit failed: {}", e)))?;
        Ok(())
    }

    /// Finalise a saved item: mark it active, and archive the superseded row
    /// (tombstoning its chunks) when present. One transaction.
    pub async fn finalize_save(&self, id: &str, superseded_id: Option<&str>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        sqlx::query("UPDATE memory_items SET status = 'active', updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let Some(old_id) = superseded_id {
            sqlx::query(
                "UPDATE memory_items SET status = 'archived', updated_at = ? WHERE id = ?",
            )
            .bind(&now)
            .bind(old_id)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "UPDATE content_chunks SET deleted_at = ? WHERE memory_id = ? AND deleted_at IS NULL",
            )
            .bind(&now)
            .bind(old_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| ZmemError::Database(format!("finalise commit failed: {}", e)))?;
        Ok(())
    }

    /// Hard-delete an item row; chunks and embedding-tracking rows cascade.
    /// Used to reverse an incomplete save.
    pub async fn delete_item_row(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM memory_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_item(&self, id: &str, workspace: &str) -> Result<Option<MemoryItem>> {
        let row = sqlx::query(
            "SELECT id, type, title, content, summary, source, scope, workspace,
                    tags, importance, status, supersedes_id, content_hash,
                    created_at, updated_at
             FROM memory_items WHERE id = ? AND workspace = ?",
        )
        .bind(id)
        .bind(workspace)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_item(&r)).transpose()
    }

    /// Active row for a `(source, workspace)` pair, if any.
    pub async fn find_active_by_source(
        &self,
        source: &str,
        workspace: &str,
    ) -> Result<Option<MemoryItem>> {
        let row = sqlx::query(
            "SELECT id, type, title, content, summary, source, scope, workspace,
                    tags, importance, status, supersedes_id, content_hash,
                    created_at, updated_at
             FROM memory_items
             WHERE source = ? AND workspace = ? AND status = 'active'",
        )
        .bind(source)
        .bind(workspace)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_item(&r)).transpose()
    }

    /// Page of items ordered `created_at DESC`, with the total count for the
    /// same filter.
    pub async fn list_items(
        &self,
        workspace: &str,
        item_type: Option<MemoryType>,
        scope: Option<Scope>,
        status: MemoryStatus,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<MemoryItem>, i64)> {
        let mut where_sql = String::from("WHERE workspace = ? AND status = ?");
        let mut values: Vec<String> = vec![
            workspace.to_string(),
            status.as_str().to_string(),
        ];
        if let Some(t) = item_type {
            where_sql.push_str(" AND type = ?");
            values.push(t.as_str().to_string());
        }
        if let Some(s) = scope {
            where_sql.push_str(" AND scope = ?");
            values.push(s.as_str().to_string());
        }

        let count_sql = format!("SELECT COUNT(*) FROM memory_items {}", where_sql);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for v in &values {
            count_query = count_query.bind(v);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let page_sql = format!(
            "SELECT id, type, title, content, summary, source, scope, workspace,
                    tags, importance, status, supersedes_id, content_hash,
                    created_at, updated_at
             FROM memory_items {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            where_sql
        );
        let mut page_query = sqlx::query(&page_sql);
        for v in &values {
            page_query = page_query.bind(v);
        }
        let rows = page_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(row_to_item)
            .collect::<Result<Vec<_>>>()?;
        Ok((items, total))
    }

    /// Set an item's status and `updated_at`. Used by delete (forwards and
    /// for rollback restore).
    pub async fn set_status(
        &self,
        id: &str,
        status: MemoryStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE memory_items SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(updated_at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bump only `updated_at` (reindex touches items without reshaping them).
    pub async fn touch_item(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE memory_items SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All active items in a workspace. Used by reindex.
    pub async fn active_items(&self, workspace: &str) -> Result<Vec<MemoryItem>> {
        let rows = sqlx::query(
            "SELECT id, type, title, content, summary, source, scope, workspace,
                    tags, importance, status, supersedes_id, content_hash,
                    created_at, updated_at
             FROM memory_items WHERE workspace = ? AND status = 'active'
             ORDER BY created_at ASC",
        )
        .bind(workspace)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect()
    }

    /// Soft-delete active rows whose source is absent from `seen_sources`.
    /// Returns the ids that were marked deleted.
    pub async fn soft_delete_missing_sources(
        &self,
        workspace: &str,
        seen_sources: &HashSet<String>,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT id, source FROM memory_items
             WHERE workspace = ? AND status = 'active' AND source != ''",
        )
        .bind(workspace)
        .fetch_all(&self.pool)
        .await?;

        let stale: Vec<String> = rows
            .iter()
            .filter(|row| !seen_sources.contains(&row.get::<String, _>("source")))
            .map(|row| row.get::<String, _>("id"))
            .collect();

        let now = Utc::now().to_rfc3339();
        for id in &stale {
            sqlx::query("UPDATE memory_items SET status = 'deleted', updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(stale)
    }

    // === Chunks ===

    /// Non-tombstoned chunks of an item, in sequence order.
    pub async fn live_chunks(&self, memory_id: &str) -> Result<Vec<ContentChunk>> {
        let rows = sqlx::query(
            "SELECT id, memory_id, seq, pos, token_count, chunk_text
             FROM content_chunks
             WHERE memory_id = ? AND deleted_at IS NULL
             ORDER BY seq ASC",
        )
        .bind(memory_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ContentChunk {
                id: row.get("id"),
                memory_id: row.get("memory_id"),
                seq: row.get("seq"),
                pos: row.get("pos"),
                token_count: row.get("token_count"),
                text: row.get("chunk_text"),
            })
            .collect())
    }

    /// All chunk ids of an item, tombstoned or not. Used for vector cleanup.
    pub async fn chunk_ids(&self, memory_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM content_chunks WHERE memory_id = ?")
            .bind(memory_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    /// Drop an item's chunks (embedding rows cascade) and return the removed
    /// chunk ids. Used by reindex before rebuilding.
    pub async fn delete_chunks(&self, memory_id: &str) -> Result<Vec<String>> {
        let ids = self.chunk_ids(memory_id).await?;
        sqlx::query("DELETE FROM content_chunks WHERE memory_id = ?")
            .bind(memory_id)
            .execute(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Insert rebuilt chunks and their embedding-tracking rows in one
    /// transaction. Used by reindex.
    pub async fn insert_chunks(&self, chunks: &[ContentChunk], model: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now().to_rfc3339();

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO content_chunks (id, memory_id, seq, pos, token_count, chunk_text, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.memory_id)
            .bind(chunk.seq)
            .bind(chunk.pos)
            .bind(chunk.token_count)
            .bind(&chunk.text)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunk_embeddings (chunk_id, embedded_at, model) VALUES (?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&now)
            .bind(model)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| ZmemError::Database(format!("chunk insert commit failed: {}", e)))?;
        Ok(())
    }

    /// Remove embedding-tracking rows for an item's chunks. Called after the
    /// matching vectors have been deleted from the collection.
    pub async fn delete_chunk_embeddings(&self, memory_id: &str) -> Result<()> {
        sqlx::query(
            "DELETE FROM chunk_embeddings WHERE chunk_id IN
                 (SELECT id FROM content_chunks WHERE memory_id = ?)",
        )
        .bind(memory_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // === Lexical query paths ===

    /// BM25 query over the FTS projection with the given match expression.
    /// The caller builds `match_expr` from quoted tokens only.
    pub async fn fts_search(
        &self,
        match_expr: &str,
        filter: &LexicalFilter,
        limit: i64,
    ) -> Result<Vec<LexicalRow>> {
        let mut sql = String::from(
            r#"
            SELECT m.id, m.title, m.scope, m.type, m.status,
                   bm25(memory_fts) AS rank,
                   snippet(memory_fts, 1, '<mark>', '</mark>', '…', 64) AS snip,
                   substr(m.content, 1, 200) AS head
            FROM memory_fts
            JOIN memory_items m ON m.rowid = memory_fts.rowid
            WHERE memory_fts MATCH ? AND m.workspace = ?
            "#,
        );
        let mut values: Vec<String> = vec![
            match_expr.to_string(),
            filter.workspace.clone(),
        ];

        push_in_clause(
            &mut sql,
            &mut values,
            "m.status",
            filter.statuses.iter().map(|s| s.as_str()),
        );
        push_in_clause(
            &mut sql,
            &mut values,
            "m.scope",
            filter.scopes.iter().map(|s| s.as_str()),
        );
        push_in_clause(
            &mut sql,
            &mut values,
            "m.type",
            filter.types.iter().map(|t| t.as_str()),
        );

        sql.push_str(" ORDER BY rank LIMIT ?");

        let mut query = sqlx::query(&sql);
        for v in &values {
            query = query.bind(v);
        }
        let rows = query
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ZmemError::Database(format!("fts query failed: {}", e)))?;

        rows.iter()
            .map(|row| {
                let snip: String = row.get("snip");
                let head: String = row.get("head");
                Ok(LexicalRow {
                    id: row.get("id"),
                    title: row.get("title"),
                    scope: parse_scope(&row.get::<String, _>("scope"))?,
                    item_type: parse_type(&row.get::<String, _>("type"))?,
                    status: parse_status(&row.get::<String, _>("status"))?,
                    rank: row.get("rank"),
                    snippet: if snip.trim().is_empty() { head } else { snip },
                })
            })
            .collect()
    }

    /// Keyword fallback over archived rows, which the FTS triggers exclude
    /// by construction. Conjunction of `LIKE '%token%'` over lowered title
    /// and content, newest first.
    pub async fn archived_keyword_search(
        &self,
        tokens: &[String],
        workspace: &str,
        scopes: &[Scope],
        types: &[MemoryType],
        limit: i64,
    ) -> Result<Vec<LexicalRow>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r#"
            SELECT id, title, scope, type, status, substr(content, 1, 200) AS head
            FROM memory_items
            WHERE workspace = ? AND status = 'archived'
            "#,
        );
        let mut values: Vec<String> = vec![workspace.to_string()];

        for token in tokens {
            sql.push_str(
                " AND (LOWER(title) LIKE ? ESCAPE '\\' OR LOWER(content) LIKE ? ESCAPE '\\')",
            );
            let pattern = format!("%{}%", escape_like(token));
            values.push(pattern.clone());
            values.push(pattern);
        }

        push_in_clause(&mut sql, &mut values, "scope", scopes.iter().map(|s| s.as_str()));
        push_in_clause(&mut sql, &mut values, "type", types.iter().map(|t| t.as_str()));

        sql.push_str(" ORDER BY updated_at DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        for v in &values {
            query = query.bind(v);
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                Ok(LexicalRow {
                    id: row.get("id"),
                    title: row.get("title"),
                    scope: parse_scope(&row.get::<String, _>("scope"))?,
                    item_type: parse_type(&row.get::<String, _>("type"))?,
                    status: parse_status(&row.get::<String, _>("status"))?,
                    rank: 0.0,
                    snippet: row.get("head"),
                })
            })
            .collect()
    }

    // === Vector hydration and recall support ===

    /// Batch-load hydration records for the given item ids, restricted to
    /// the requested statuses and workspace. Ids that miss the filter are
    /// simply absent from the map.
    pub async fn items_meta(
        &self,
        ids: &[String],
        statuses: &[MemoryStatus],
        workspace: Option<&str>,
    ) -> Result<HashMap<String, ItemMeta>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let mut sql = format!(
            "SELECT id, title, content, scope, type, status
             FROM memory_items WHERE id IN ({})",
            placeholders
        );
        let mut values: Vec<String> = ids.to_vec();

        push_in_clause(&mut sql, &mut values, "status", statuses.iter().map(|s| s.as_str()));
        if let Some(ws) = workspace {
            sql.push_str(" AND workspace = ?");
            values.push(ws.to_string());
        }

        let mut query = sqlx::query(&sql);
        for v in &values {
            query = query.bind(v);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut map = HashMap::new();
        for row in &rows {
            let meta = ItemMeta {
                id: row.get("id"),
                title: row.get("title"),
                content: row.get("content"),
                scope: parse_scope(&row.get::<String, _>("scope"))?,
                item_type: parse_type(&row.get::<String, _>("type"))?,
                status: parse_status(&row.get::<String, _>("status"))?,
            };
            map.insert(meta.id.clone(), meta);
        }
        Ok(map)
    }

    /// Ids of active items shadowed by another active item's `supersedes_id`
    /// reference. Recall prunes these unless superseded rows were requested.
    pub async fn hidden_active_ids(&self, workspace: &str) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            "SELECT old.id AS id
             FROM memory_items new_item
             JOIN memory_items old ON old.id = new_item.supersedes_id
             WHERE new_item.workspace = ?
               AND new_item.status = 'active'
               AND old.status = 'active'",
        )
        .bind(workspace)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    // === Status ===

    /// Counts for `status()`: items not soft-deleted, embedded chunks joined
    /// through live chunks, live chunks lacking an embedding row, and the
    /// newest `updated_at` across active items.
    pub async fn workspace_status(&self, workspace: &str) -> Result<WorkspaceStatus> {
        let total_items: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM memory_items WHERE workspace = ? AND status != 'deleted'",
        )
        .bind(workspace)
        .fetch_one(&self.pool)
        .await?;

        let total_vectors: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)
             FROM chunk_embeddings ce
             JOIN content_chunks c ON c.id = ce.chunk_id
             JOIN memory_items m ON m.id = c.memory_id
             WHERE m.workspace = ? AND c.deleted_at IS NULL",
        )
        .bind(workspace)
        .fetch_one(&self.pool)
        .await?;

        let pending_embeddings: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)
             FROM content_chunks c
             JOIN memory_items m ON m.id = c.memory_id
             LEFT JOIN chunk_embeddings ce ON ce.chunk_id = c.id
             WHERE m.workspace = ? AND c.deleted_at IS NULL AND ce.chunk_id IS NULL",
        )
        .bind(workspace)
        .fetch_one(&self.pool)
        .await?;

        let last_indexed: Option<String> = sqlx::query_scalar(
            "SELECT MAX(updated_at) FROM memory_items
             WHERE workspace = ? AND status = 'active'",
        )
        .bind(workspace)
        .fetch_one(&self.pool)
        .await?;
        let last_indexed_at = last_indexed
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(WorkspaceStatus {
            total_items,
            total_vectors,
            pending_embeddings,
            last_indexed_at,
        })
    }

    /// One FTS row per id; used by the consistency tests.
    pub async fn fts_row_count(&self, id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM memory_fts
             WHERE rowid = (SELECT rowid FROM memory_items WHERE id = ?)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// Append `AND <column> IN (?, …)` when `values` is non-empty.
fn push_in_clause<'a>(
    sql: &mut String,
    params: &mut Vec<String>,
    column: &str,
    values: impl Iterator<Item = &'a str>,
) {
    let collected: Vec<&str> = values.collect();
    if collected.is_empty() {
        return;
    }
    let placeholders = collected.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    sql.push_str(&format!(" AND {} IN ({})", column, placeholders));
    for v in collected {
        params.push(v.to_string());
    }
}

/// Escape LIKE wildcards in a token so `_` and `%` match literally.
fn escape_like(token: &str) -> String {
    token
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn parse_scope(s: &str) -> Result<Scope> {
    Scope::parse(s).ok_or_else(|| ZmemError::Database(format!("unknown scope in row: {}", s)))
}

fn parse_type(s: &str) -> Result<MemoryType> {
    MemoryType::parse(s)
        .ok_or_else(|| ZmemError::Database(format!("unknown type in row: {}", s)))
}

fn parse_status(s: &str) -> Result<MemoryStatus> {
    MemoryStatus::parse(s)
        .ok_or_else(|| ZmemError::Database(format!("unknown status in row: {}", s)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ZmemError::Database(format!("invalid timestamp in row: {}", e)))
}

fn row_to_item(row: &SqliteRow) -> Result<MemoryItem> {
    let tags_json: String = row.get("tags");
    let tags: Vec<String> = serde_json::from_str(&tags_json)?;

    Ok(MemoryItem {
        id: row.get("id"),
        item_type: parse_type(&row.get::<String, _>("type"))?,
        title: row.get("title"),
        content: row.get("content"),
        summary: row.get("summary"),
        source: row.get("source"),
        scope: parse_scope(&row.get::<String, _>("scope"))?,
        workspace: row.get("workspace"),
        tags,
        importance: row.get("importance"),
        status: parse_status(&row.get::<String, _>("status"))?,
        supersedes_id: row.get("supersedes_id"),
        content_hash: row.get("content_hash"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_trigger_bodies_whole() {
        let sql = r#"
            -- leading comment
            CREATE TABLE t (id TEXT);

            CREATE TRIGGER trg AFTER INSERT ON t
            BEGIN
                DELETE FROM t WHERE id = old.id;
                INSERT INTO t (id) VALUES (new.id);
            END;

            CREATE INDEX idx ON t (id);
        "#;
        let statements = split_migration_sql(sql);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("CREATE TABLE"));
        assert!(statements[1].contains("CREATE TRIGGER"));
        assert!(statements[1].ends_with("END;"));
        assert!(statements[2].starts_with("CREATE INDEX"));
    }

    #[test]
    fn test_split_handles_multiline_plain_statements() {
        let sql = "CREATE TABLE t (\n    id TEXT,\n    body TEXT\n);\nCREATE INDEX i ON t (id);";
        let statements = split_migration_sql(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].ends_with(");"));
    }

    #[test]
    fn test_split_shipped_migrations() {
        // Every embedded migration must split into at least one statement
        // and never leave a dangling buffer.
        for (_, sql) in MIGRATIONS {
            let statements = split_migration_sql(sql);
            assert!(!statements.is_empty());
            for statement in statements {
                assert!(statement.trim_end().ends_with(';'));
            }
        }
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("oauth2"), "oauth2");
        assert_eq!(escape_like("user_flow"), "user\\_flow");
        assert_eq!(escape_like("100%"), "100\\%");
    }

    #[test]
    fn test_push_in_clause_empty_is_noop() {
        let mut sql = String::from("SELECT 1");
        let mut params = Vec::new();
        push_in_clause(&mut sql, &mut params, "status", std::iter::empty());
        assert_eq!(sql, "SELECT 1");
        assert!(params.is_empty());
    }

    #[test]
    fn test_push_in_clause_builds_placeholders() {
        let mut sql = String::new();
        let mut params = Vec::new();
        push_in_clause(&mut sql, &mut params, "status", ["active", "archived"].into_iter());
        assert_eq!(sql, " AND status IN (?, ?)");
        assert_eq!(params.len(), 2);
    }
}
