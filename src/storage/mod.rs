//! Storage layer for the zmem memory engine
//!
//! Two stores back the engine: the relational metadata store (items, chunks,
//! embedding-tracking rows, and the full-text index) and the per-workspace
//! vector collections. The metadata store is the source of truth for item
//! lifecycle; the vector collections hold only derived data and are kept
//! consistent by the save/delete/reindex protocols in the engine.

pub mod filter;
pub mod sqlite;
pub mod vectors;

pub use filter::FilterExpr;
pub use sqlite::{ItemMeta, LexicalFilter, LexicalRow, MetadataStore};
pub use vectors::{
    SqliteVectorCollection, VectorCollection, VectorHit, VectorMetadata, VectorStore,
    VectorStoreOptions,
};
