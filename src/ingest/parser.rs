//! Document parsing for ingestion
//!
//! Reads UTF-8 markdown/text, splits optional YAML frontmatter, extracts a
//! title (frontmatter, then first heading, then file stem) and computes the
//! content hash over the raw bytes that drives re-ingestion idempotency.

use crate::error::{Result, ZmemError};
use crate::types::{content_hash, MemoryType};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::warn;

/// Recognised frontmatter keys; anything else is ignored.
#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    title: Option<String>,
    tags: Option<Vec<String>>,
    #[serde(rename = "type")]
    item_type: Option<String>,
    date: Option<String>,
    importance: Option<f64>,
}

/// A document ready for chunking and upsert.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub item_type: MemoryType,
    /// Authoring date from frontmatter; seeds the item's creation time
    pub date: Option<DateTime<Utc>>,
    pub importance: f64,
    pub content_hash: String,
}

/// Parse raw file bytes into a [`ParsedDocument`].
///
/// `rel_path` is used for the title fallback and error messages.
pub fn parse_document(raw: &[u8], rel_path: &str) -> Result<ParsedDocument> {
    let hash = content_hash(raw);

    let text = std::str::from_utf8(raw)
        .map_err(|_| ZmemError::Validation(format!("{}: not valid UTF-8", rel_path)))?;
    let text = normalize(text);

    let (frontmatter, body) = split_frontmatter(&text, rel_path);

    let content = body.trim().to_string();
    if content.is_empty() {
        return Err(ZmemError::Validation(format!(
            "{}: document body is empty",
            rel_path
        )));
    }

    let title = frontmatter
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| heading_title(&content, "# "))
        .or_else(|| heading_title(&content, "## "))
        .unwrap_or_else(|| file_stem(rel_path));

    let item_type = frontmatter
        .item_type
        .as_deref()
        .map(MemoryType::parse_lossy)
        .unwrap_or(MemoryType::Fact);

    let importance = frontmatter.importance.unwrap_or(0.5).clamp(0.0, 1.0);

    let date = frontmatter.date.as_deref().and_then(|raw| {
        let parsed = parse_date(raw);
        if parsed.is_none() {
            warn!("{}: unparsable frontmatter date {:?}", rel_path, raw);
        }
        parsed
    });

    Ok(ParsedDocument {
        title,
        content,
        tags: frontmatter.tags.unwrap_or_default(),
        item_type,
        date,
        importance,
        content_hash: hash,
    })
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (taken as
/// midnight UTC).
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Strip a UTF-8 BOM and normalise line endings to `\n`.
fn normalize(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Split a leading `---` delimited YAML block from the body. A malformed
/// block is dropped with a warning rather than failing the file.
fn split_frontmatter(text: &str, rel_path: &str) -> (Frontmatter, String) {
    let Some(rest) = text.strip_prefix("---\n") else {
        return (Frontmatter::default(), text.to_string());
    };

    let Some(end) = rest.find("\n---").map(|i| i + 1) else {
        return (Frontmatter::default(), text.to_string());
    };

    let yaml = &rest[..end - 1];
    let after = &rest[end + 3..];
    let body = after.strip_prefix('\n').unwrap_or(after).to_string();

    match serde_yaml::from_str::<Frontmatter>(yaml) {
        Ok(frontmatter) => (frontmatter, body),
        Err(e) => {
            warn!("{}: ignoring malformed frontmatter: {}", rel_path, e);
            (Frontmatter::default(), body)
        }
    }
}

/// First heading with the given prefix, skipping the generic "Notes".
fn heading_title(content: &str, prefix: &str) -> Option<String> {
    for line in content.lines() {
        if let Some(heading) = line.strip_prefix(prefix) {
            let heading = heading.trim();
            if heading.is_empty() || heading.eq_ignore_ascii_case("notes") {
                continue;
            }
            return Some(heading.to_string());
        }
    }
    None
}

fn file_stem(rel_path: &str) -> String {
    std::path::Path::new(rel_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| rel_path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontmatter_fields_win() {
        let raw = b"---\ntitle: Deploy Checklist\ntags:\n  - ops\n  - deploy\ntype: decision\nimportance: 0.9\n---\n# Ignored Heading\n\nBody text.\n";
        let doc = parse_document(raw, "notes/deploy.md").unwrap();
        assert_eq!(doc.title, "Deploy Checklist");
        assert_eq!(doc.tags, vec!["ops", "deploy"]);
        assert_eq!(doc.item_type, MemoryType::Decision);
        assert_eq!(doc.importance, 0.9);
        assert!(doc.content.starts_with("# Ignored Heading"));
    }

    #[test]
    fn test_h1_fallback_skips_generic_notes() {
        let raw = b"# Notes\n\n# Real Title\n\nBody.\n";
        let doc = parse_document(raw, "a/b.md").unwrap();
        assert_eq!(doc.title, "Real Title");
    }

    #[test]
    fn test_h2_then_stem_fallback() {
        let doc = parse_document(b"## Section Heading\n\nBody.\n", "a/review.md").unwrap();
        assert_eq!(doc.title, "Section Heading");

        let doc = parse_document(b"Plain body only.\n", "dir/meeting-log.md").unwrap();
        assert_eq!(doc.title, "meeting-log");
    }

    #[test]
    fn test_unknown_type_defaults_to_fact() {
        let raw = b"---\ntype: prophecy\n---\nBody.\n";
        let doc = parse_document(raw, "a.md").unwrap();
        assert_eq!(doc.item_type, MemoryType::Fact);
    }

    #[test]
    fn test_importance_is_clamped() {
        let raw = b"---\nimportance: 7\n---\nBody.\n";
        let doc = parse_document(raw, "a.md").unwrap();
        assert_eq!(doc.importance, 1.0);
    }

    #[test]
    fn test_date_formats() {
        let raw = b"---\ndate: 2025-06-01\n---\nBody.\n";
        let doc = parse_document(raw, "a.md").unwrap();
        let date = doc.date.unwrap();
        assert_eq!(date.to_rfc3339(), "2025-06-01T00:00:00+00:00");

        let raw = b"---\ndate: 2025-06-01T09:30:00Z\n---\nBody.\n";
        let doc = parse_document(raw, "a.md").unwrap();
        assert_eq!(doc.date.unwrap().to_rfc3339(), "2025-06-01T09:30:00+00:00");

        // Unparsable dates are dropped, not fatal.
        let raw = b"---\ndate: next tuesday\n---\nBody.\n";
        let doc = parse_document(raw, "a.md").unwrap();
        assert!(doc.date.is_none());

        let doc = parse_document(b"Body only.\n", "a.md").unwrap();
        assert!(doc.date.is_none());
    }

    #[test]
    fn test_bom_and_crlf_are_normalised() {
        let raw = "\u{feff}# Title\r\n\r\nLine one.\r\nLine two.\r\n".as_bytes();
        let doc = parse_document(raw, "a.md").unwrap();
        assert_eq!(doc.title, "Title");
        assert!(!doc.content.contains('\r'));
    }

    #[test]
    fn test_hash_covers_raw_bytes() {
        let a = parse_document(b"# T\n\nBody.\n", "a.md").unwrap();
        let b = parse_document(b"# T\n\nBody.\n", "b.md").unwrap();
        let c = parse_document(b"# T\n\nBody!\n", "a.md").unwrap();
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a.content_hash, c.content_hash);
    }

    #[test]
    fn test_empty_body_is_rejected() {
        assert!(parse_document(b"", "a.md").is_err());
        assert!(parse_document(b"---\ntitle: X\n---\n\n", "a.md").is_err());
    }

    #[test]
    fn test_malformed_frontmatter_is_dropped() {
        let raw = b"---\ntitle: [unclosed\n---\nBody text.\n";
        let doc = parse_document(raw, "a.md").unwrap();
        assert_eq!(doc.title, "a");
        assert_eq!(doc.content, "Body text.");
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        assert!(parse_document(&[0xff, 0xfe, 0x00], "bin.md").is_err());
    }
}
