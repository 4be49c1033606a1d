//! Per-workspace vector collections backed by sqlite-vec
//!
//! Each workspace owns an on-disk collection directory under the configured
//! vector root: a `vectors.db` holding the `vec0` virtual table plus a
//! metadata sidecar used for server-side filtering, and a `manifest.json`
//! recording the collection geometry. Opening an existing collection whose
//! manifest is unreadable or incompatible removes the directory and
//! recreates it.

use crate::error::{Result, ZmemError};
use crate::storage::filter;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use tracing::{debug, info, warn};

/// Metadata fields exposed for server-side filtering.
const FILTER_FIELDS: &[&str] = &["memory_id", "workspace", "scope", "type", "status"];

/// Over-fetch factor applied to filtered queries so post-filtering still
/// fills `top_k`.
const FILTER_OVERSAMPLE: usize = 8;

static VEC_EXTENSION: Once = Once::new();

/// Register sqlite-vec as an auto-extension so every connection opened in
/// this process can use `vec0` tables. The registration pattern follows
/// sqlite-vec's own test suite.
fn register_vec_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        use rusqlite::ffi::sqlite3_auto_extension;

        sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// Sidecar metadata stored with each vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub memory_id: String,
    pub workspace: String,
    pub scope: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

/// One similarity hit, ordered by descending score.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f64,
}

/// ANN collection over chunk embeddings.
///
/// `filter` strings follow the expression form in [`crate::storage::filter`]
/// over the fields `memory_id`, `workspace`, `scope`, `type`, `status`.
pub trait VectorCollection: Send + Sync {
    /// Upsert a vector and its metadata.
    fn insert(&self, id: &str, vector: &[f32], metadata: &VectorMetadata) -> Result<()>;

    /// Return up to `top_k` hits ordered by descending similarity.
    fn query(&self, vector: &[f32], top_k: usize, filter: Option<&str>) -> Result<Vec<VectorHit>>;

    /// Remove a vector; a missing id is not an error.
    fn delete(&self, id: &str) -> Result<()>;

    /// Release file handles. Later calls fail.
    fn close(&self) -> Result<()>;
}

/// On-disk collection geometry. Index parameters are fixed at creation and
/// validated on reopen.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionManifest {
    dimensions: usize,
    metric: String,
    m: usize,
    ef_construction: usize,
    ef_search: usize,
}

/// Creation parameters for new collections.
#[derive(Debug, Clone)]
pub struct VectorStoreOptions {
    pub dimensions: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for VectorStoreOptions {
    fn default() -> Self {
        Self {
            dimensions: 1024,
            m: 16,
            ef_construction: 128,
            ef_search: 128,
        }
    }
}

impl VectorStoreOptions {
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            ..Self::default()
        }
    }

    fn manifest(&self) -> CollectionManifest {
        CollectionManifest {
            dimensions: self.dimensions,
            metric: "cosine".to_string(),
            m: self.m,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
        }
    }
}

/// sqlite-vec backed [`VectorCollection`].
pub struct SqliteVectorCollection {
    conn: Mutex<Option<Connection>>,
    dimensions: usize,
}

impl SqliteVectorCollection {
    /// Open the collection at `dir`, creating it if absent. An existing but
    /// unreadable or incompatible collection is removed and recreated.
    pub fn open(dir: &Path, options: &VectorStoreOptions) -> Result<Self> {
        register_vec_extension();

        match Self::try_open(dir, options) {
            Ok(collection) => Ok(collection),
            Err(e) if dir.exists() => {
                warn!(
                    "Vector collection at {} is unreadable ({}), recreating",
                    dir.display(),
                    e
                );
                std::fs::remove_dir_all(dir)?;
                Self::try_open(dir, options)
            }
            Err(e) => Err(e),
        }
    }

    fn try_open(dir: &Path, options: &VectorStoreOptions) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let manifest_path = dir.join("manifest.json");
        let dimensions = if manifest_path.exists() {
            let raw = std::fs::read_to_string(&manifest_path)?;
            let manifest: CollectionManifest = serde_json::from_str(&raw).map_err(|e| {
                ZmemError::Database(format!("unreadable collection manifest: {}", e))
            })?;
            if manifest.dimensions != options.dimensions {
                return Err(ZmemError::Database(format!(
                    "collection dimensions {} do not match configured {}",
                    manifest.dimensions, options.dimensions
                )));
            }
            manifest.dimensions
        } else {
            let manifest = options.manifest();
            std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
            manifest.dimensions
        };

        let conn = Connection::open(dir.join("vectors.db"))
            .map_err(|e| ZmemError::Database(format!("failed to open vector db: {}", e)))?;

        conn.execute_batch(&format!(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS chunk_vectors USING vec0(
                chunk_id TEXT PRIMARY KEY,
                embedding FLOAT[{}] distance_metric=cosine
            );
            CREATE TABLE IF NOT EXISTS vector_meta (
                chunk_id TEXT PRIMARY KEY,
                memory_id TEXT NOT NULL,
                workspace TEXT NOT NULL,
                scope TEXT NOT NULL,
                type TEXT NOT NULL,
                status TEXT NOT NULL
            );
            "#,
            dimensions
        ))?;

        debug!(
            "Opened vector collection at {} (dimensions: {})",
            dir.display(),
            dimensions
        );

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            dimensions,
        })
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(ZmemError::Database(format!(
                "vector dimension mismatch: expected {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }
        Ok(())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| ZmemError::Database("vector collection lock poisoned".to_string()))?;
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(ZmemError::Database(
                "vector collection is closed".to_string(),
            )),
        }
    }
}

impl VectorCollection for SqliteVectorCollection {
    fn insert(&self, id: &str, vector: &[f32], metadata: &VectorMetadata) -> Result<()> {
        self.check_dimensions(vector)?;
        let embedding_json = serde_json::to_string(vector)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO chunk_vectors (chunk_id, embedding)
                 VALUES (?, vec_f32(?))",
                rusqlite::params![id, embedding_json],
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO vector_meta
                     (chunk_id, memory_id, workspace, scope, type, status)
                 VALUES (?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    id,
                    metadata.memory_id,
                    metadata.workspace,
                    metadata.scope,
                    metadata.kind,
                    metadata.status
                ],
            )?;
            Ok(())
        })
    }

    fn query(&self, vector: &[f32], top_k: usize, filter: Option<&str>) -> Result<Vec<VectorHit>> {
        self.check_dimensions(vector)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query_json = serde_json::to_string(vector)?;
        let fetch_k = match filter {
            Some(_) => (top_k * FILTER_OVERSAMPLE).max(64),
            None => top_k,
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT chunk_id, distance
                 FROM chunk_vectors
                 WHERE embedding MATCH vec_f32(?)
                 ORDER BY distance
                 LIMIT ?",
            )?;
            let candidates: Vec<(String, f64)> = stmt
                .query_map(rusqlite::params![query_json, fetch_k as i64], |row| {
                    let id: String = row.get(0)?;
                    let distance: f64 = row.get(1)?;
                    Ok((id, 1.0 - distance))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut hits: Vec<VectorHit> = match filter {
                Some(expr) if !candidates.is_empty() => {
                    let parsed = filter::parse(expr)?;
                    let (cond, cond_params) = parsed.to_sql("", FILTER_FIELDS)?;

                    let placeholders = candidates
                        .iter()
                        .map(|_| "?")
                        .collect::<Vec<_>>()
                        .join(", ");
                    let sql = format!(
                        "SELECT chunk_id FROM vector_meta
                         WHERE chunk_id IN ({}) AND {}",
                        placeholders, cond
                    );

                    let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::new();
                    for (id, _) in &candidates {
                        params.push(id);
                    }
                    for value in &cond_params {
                        params.push(value);
                    }

                    let mut stmt = conn.prepare(&sql)?;
                    let allowed: std::collections::HashSet<String> = stmt
                        .query_map(params.as_slice(), |row| row.get::<_, String>(0))?
                        .collect::<rusqlite::Result<_>>()?;

                    candidates
                        .into_iter()
                        .filter(|(id, _)| allowed.contains(id))
                        .map(|(id, score)| VectorHit { id, score })
                        .collect()
                }
                _ => candidates
                    .into_iter()
                    .map(|(id, score)| VectorHit { id, score })
                    .collect(),
            };

            hits.truncate(top_k);
            Ok(hits)
        })
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM chunk_vectors WHERE chunk_id = ?",
                rusqlite::params![id],
            )?;
            conn.execute(
                "DELETE FROM vector_meta WHERE chunk_id = ?",
                rusqlite::params![id],
            )?;
            Ok(())
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| ZmemError::Database("vector collection lock poisoned".to_string()))?;
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| ZmemError::Database(format!("close failed: {}", e)))?;
        }
        Ok(())
    }
}

/// Manager for one collection per workspace under a shared root directory.
pub struct VectorStore {
    root: PathBuf,
    options: VectorStoreOptions,
    collections: Mutex<HashMap<String, Arc<dyn VectorCollection>>>,
}

impl VectorStore {
    pub fn new(root: PathBuf, options: VectorStoreOptions) -> Self {
        Self {
            root,
            options,
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Open (or create) the collection for `workspace`, caching the handle.
    pub fn collection(&self, workspace: &str) -> Result<Arc<dyn VectorCollection>> {
        let mut guard = self
            .collections
            .lock()
            .map_err(|_| ZmemError::Database("vector store lock poisoned".to_string()))?;

        if let Some(existing) = guard.get(workspace) {
            return Ok(existing.clone());
        }

        let dir = self.root.join(workspace);
        let collection: Arc<dyn VectorCollection> =
            Arc::new(SqliteVectorCollection::open(&dir, &self.options)?);
        guard.insert(workspace.to_string(), collection.clone());
        Ok(collection)
    }

    /// Replace the collection handle for a workspace. Tests use this to
    /// inject failing collections.
    pub fn install_collection(&self, workspace: &str, collection: Arc<dyn VectorCollection>) {
        if let Ok(mut guard) = self.collections.lock() {
            guard.insert(workspace.to_string(), collection);
        }
    }

    /// Close every open collection exactly once.
    pub fn close_all(&self) {
        if let Ok(mut guard) = self.collections.lock() {
            for (workspace, collection) in guard.drain() {
                if let Err(e) = collection.close() {
                    warn!("Failed to close collection {}: {}", workspace, e);
                } else {
                    info!("Closed vector collection {}", workspace);
                }
            }
        }
    }
}

impl Drop for VectorStore {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(memory_id: &str, status: &str) -> VectorMetadata {
        VectorMetadata {
            memory_id: memory_id.to_string(),
            workspace: "w1".to_string(),
            scope: "workspace".to_string(),
            kind: "fact".to_string(),
            status: status.to_string(),
        }
    }

    fn open_test_collection(dir: &Path) -> SqliteVectorCollection {
        SqliteVectorCollection::open(dir, &VectorStoreOptions::with_dimensions(3)).unwrap()
    }

    #[test]
    fn test_insert_query_delete() {
        let tmp = TempDir::new().unwrap();
        let collection = open_test_collection(&tmp.path().join("w1"));

        collection
            .insert("m1_0", &[1.0, 0.0, 0.0], &meta("m1", "active"))
            .unwrap();
        collection
            .insert("m2_0", &[0.0, 1.0, 0.0], &meta("m2", "active"))
            .unwrap();

        let hits = collection.query(&[1.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "m1_0");
        assert!(hits[0].score > 0.99);
        assert!(hits[0].score > hits[1].score);

        collection.delete("m1_0").unwrap();
        // Deleting a missing id is not an error.
        collection.delete("m1_0").unwrap();

        let hits = collection.query(&[1.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m2_0");
    }

    #[test]
    fn test_metadata_filter_restricts_hits() {
        let tmp = TempDir::new().unwrap();
        let collection = open_test_collection(&tmp.path().join("w1"));

        collection
            .insert("m1_0", &[1.0, 0.0, 0.0], &meta("m1", "active"))
            .unwrap();
        collection
            .insert("m2_0", &[0.9, 0.1, 0.0], &meta("m2", "deleted"))
            .unwrap();

        let filter = r#"workspace = "w1" and status = "active""#;
        let hits = collection.query(&[1.0, 0.0, 0.0], 5, Some(filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m1_0");
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let tmp = TempDir::new().unwrap();
        let collection = open_test_collection(&tmp.path().join("w1"));
        let result = collection.insert("m1_0", &[1.0, 0.0], &meta("m1", "active"));
        assert!(result.is_err());
    }

    #[test]
    fn test_corrupt_manifest_triggers_recreate() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("w1");
        {
            let collection = open_test_collection(&dir);
            collection
                .insert("m1_0", &[1.0, 0.0, 0.0], &meta("m1", "active"))
                .unwrap();
            collection.close().unwrap();
        }

        std::fs::write(dir.join("manifest.json"), "not json").unwrap();

        let collection = open_test_collection(&dir);
        let hits = collection.query(&[1.0, 0.0, 0.0], 5, None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_closed_collection_rejects_operations() {
        let tmp = TempDir::new().unwrap();
        let collection = open_test_collection(&tmp.path().join("w1"));
        collection.close().unwrap();
        assert!(collection.query(&[1.0, 0.0, 0.0], 1, None).is_err());
    }

    #[test]
    fn test_store_caches_collections_per_workspace() {
        let tmp = TempDir::new().unwrap();
        let store = VectorStore::new(
            tmp.path().to_path_buf(),
            VectorStoreOptions::with_dimensions(3),
        );
        let a = store.collection("w1").unwrap();
        let b = store.collection("w1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(tmp.path().join("w1").join("manifest.json").exists());
    }
}
