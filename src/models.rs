//! Core data models used throughout depot.
//!
//! These types represent the artifacts that flow through the ingestion and
//! retrieval pipelines:
//!
//! ```text
//! media bytes → classify → CatalogFile ──→ extract → chunk → Chunk
//!                                                              ↓
//! JSON tree   → analyze  → CatalogJson                    embed → knn
//!                                                              ↓
//!                                                       SearchResponse
//! ```
//!
//! The catalog rows (`CatalogFile`, `CatalogJson`, `Chunk`) are the
//! authoritative record; the payload stores, the vector table, and the
//! in-memory token index are derived from them and can be reconstructed.
//! Timestamps are Unix epoch seconds (i64) for efficient comparison and
//! indexing.

use serde::{Deserialize, Serialize};

/// A tenant of the depot. Every write path checks `active` and the
/// `used_bytes <= quota_bytes` invariant before committing.
#[derive(Debug, Clone, Serialize)]
pub struct Tenant {
    /// Opaque tenant identifier supplied by the caller.
    pub id: String,
    /// Storage quota in bytes.
    pub quota_bytes: i64,
    /// Accumulated usage in bytes. Monotonic except on delete.
    pub used_bytes: i64,
    /// Inactive tenants are rejected at admission.
    pub active: bool,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: i64,
}

/// One generated derivative of a stored image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThumbInfo {
    /// Size label: `small`, `medium`, or `large`.
    pub size: String,
    /// Path relative to the storage root, under `thumbnails/`.
    pub path: String,
    pub width: u32,
    pub height: u32,
    /// Output format: `jpg` for opaque sources, `png` for transparent ones.
    pub format: String,
}

/// Catalog row for a stored binary artifact.
///
/// Created only after the bytes are at their canonical path; mutated only
/// by indexing (`indexed = true`) and thumbnail regeneration; removed only
/// by a tenant-scoped delete, which also removes derivatives and all chunks
/// whose `source_file_id` equals `id`.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogFile {
    pub id: String,
    pub tenant: String,
    /// Name the client supplied at upload time.
    pub original_name: String,
    /// Category tag from the classification taxonomy.
    pub category: String,
    /// Detected MIME type (magic-preferred, declared fallback).
    pub mime: String,
    pub size_bytes: i64,
    /// Hex SHA-256 of the stored bytes.
    pub sha256: String,
    /// Canonical path relative to the storage root.
    pub path: String,
    pub created_at: i64,
    /// Set once the file's text has been chunked and embedded.
    pub indexed: bool,
    /// 0–3 derivative descriptors.
    pub thumbs: Vec<ThumbInfo>,
    /// Extracted metadata (image dimensions, color mode, EXIF presence) as JSON.
    pub meta_json: String,
    /// Free-text comment supplied at upload, if any.
    pub comment: Option<String>,
    /// Set by the reconciler when the underlying bytes have vanished.
    pub orphaned: bool,
}

/// The persistence engine chosen for a JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backing {
    /// Per-document physical table with one row per record.
    Relational,
    /// Single collection, one document per id, structure kept verbatim.
    Document,
}

impl Backing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backing::Relational => "relational",
            Backing::Document => "document",
        }
    }

    pub fn parse(s: &str) -> Option<Backing> {
        match s {
            "relational" => Some(Backing::Relational),
            "document" => Some(Backing::Document),
            _ => None,
        }
    }
}

/// Catalog row for a routed JSON document. Immutable once written;
/// removed only by a tenant-scoped delete that also drops the payload.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogJson {
    pub id: String,
    pub tenant: String,
    pub backing: Backing,
    /// Router confidence in `[0, 1]`.
    pub confidence: f64,
    /// Canonical serialized length, charged against the tenant quota.
    pub size_bytes: i64,
    /// The structural metrics that drove the decision, as JSON.
    pub metrics_json: String,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub orphaned: bool,
}

/// A bounded-length window of an indexed artifact's text.
///
/// For a given `source_file_id` the `ordinal` values always form a
/// contiguous prefix starting at 0. Chunks for one source are written in a
/// single transaction; reindexing purges the old set before writing the
/// new one.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source_file_id: String,
    pub tenant: String,
    /// Zero-based position within the source.
    pub ordinal: i64,
    pub text: String,
    /// Additional context (original name, category) as JSON.
    pub meta_json: String,
}

/// A chunk returned from nearest-neighbour search, with its distance to
/// the query vector. Smaller distance = closer.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub source_file_id: String,
    pub ordinal: i64,
    pub text: String,
    /// Category of the owning file.
    pub category: String,
    pub distance: f32,
}

/// A token-level hit from the prefix index.
#[derive(Debug, Clone, Serialize)]
pub struct TokenHit {
    pub token: String,
    pub frequency: u64,
    /// Files whose indexed text contains the token.
    pub files: Vec<String>,
}

/// How a search request is routed through the retrieval engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Token prefix/exact lookup only.
    Prefix,
    /// Embedding + nearest-neighbour only.
    Semantic,
    /// Both engines, deduplicated, semantic hits ranked first.
    Hybrid,
}

impl SearchMode {
    pub fn parse(s: &str) -> Option<SearchMode> {
        match s {
            "prefix" => Some(SearchMode::Prefix),
            "semantic" => Some(SearchMode::Semantic),
            "hybrid" => Some(SearchMode::Hybrid),
            _ => None,
        }
    }
}

/// Response from the retrieval composer.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// The mode actually used (short queries degrade to `prefix`).
    pub mode: SearchMode,
    pub chunk_hits: Vec<ChunkHit>,
    pub token_hits: Vec<TokenHit>,
}

impl SearchResponse {
    pub fn result_count(&self) -> usize {
        self.chunk_hits.len() + self.token_hits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backing_round_trip() {
        assert_eq!(Backing::parse("relational"), Some(Backing::Relational));
        assert_eq!(Backing::parse("document"), Some(Backing::Document));
        assert_eq!(Backing::parse("mongo"), None);
        assert_eq!(Backing::Relational.as_str(), "relational");
    }

    #[test]
    fn test_search_mode_parse() {
        assert_eq!(SearchMode::parse("hybrid"), Some(SearchMode::Hybrid));
        assert_eq!(SearchMode::parse("keyword"), None);
    }
}
