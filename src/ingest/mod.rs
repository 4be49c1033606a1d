//! Ingestion pipeline stages
//!
//! Discovery, parsing, and chunking are pure stages collected here; the
//! engine drives them and owns the upsert and cleanup steps so that every
//! store mutation goes through the same two-phase machinery as `save`.

pub mod chunker;
pub mod discovery;
pub mod parser;

pub use chunker::{chunk_document, count_tokens, ChunkerOptions, RawChunk};
pub use discovery::{discover_files, DiscoveredFile};
pub use parser::{parse_document, ParsedDocument};

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use tracing::debug;

/// Bounded parallelism for the file parse stage.
pub const PARSE_CONCURRENCY: usize = 10;

/// Documents embedded per `embed_batch` call.
pub const EMBED_DOC_BATCH: usize = 8;

/// Inputs of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub workspace: String,
    pub root: PathBuf,
    pub patterns: Vec<String>,
    pub excludes: Vec<String>,
}

/// Read and parse discovered files with bounded concurrency, preserving
/// discovery order. Per-file failures land in the error list and do not
/// abort the run.
pub async fn parse_files(
    files: Vec<DiscoveredFile>,
) -> (Vec<(DiscoveredFile, ParsedDocument)>, Vec<String>) {
    let results: Vec<(DiscoveredFile, Result<ParsedDocument, String>)> = stream::iter(files)
        .map(|file| async move {
            let parsed = match tokio::fs::read(&file.abs_path).await {
                Ok(raw) => {
                    parse_document(&raw, &file.rel_path).map_err(|e| e.to_string())
                }
                Err(e) => Err(format!("{}: {}", file.rel_path, e)),
            };
            (file, parsed)
        })
        .buffered(PARSE_CONCURRENCY)
        .collect()
        .await;

    let mut parsed = Vec::new();
    let mut errors = Vec::new();
    for (file, result) in results {
        match result {
            Ok(doc) => parsed.push((file, doc)),
            Err(e) => errors.push(e),
        }
    }

    debug!(
        "Parsed {} documents ({} errors)",
        parsed.len(),
        errors.len()
    );
    (parsed, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_parse_files_collects_errors_without_aborting() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("good.md");
        let bad = tmp.path().join("bad.md");
        std::fs::write(&good, "# Good\n\nBody.\n").unwrap();
        std::fs::write(&bad, [0xff, 0xfe]).unwrap();

        let files = vec![
            DiscoveredFile {
                abs_path: bad,
                rel_path: "bad.md".to_string(),
                size: 2,
                mtime: 0,
            },
            DiscoveredFile {
                abs_path: good,
                rel_path: "good.md".to_string(),
                size: 10,
                mtime: 0,
            },
        ];

        let (parsed, errors) = parse_files(files).await;
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0.rel_path, "good.md");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("bad.md"));
    }
}
