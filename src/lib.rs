//! # Depot
//!
//! **A multi-tenant artifact depot with smart placement and semantic
//! retrieval.**
//!
//! Depot accepts two classes of artifacts — opaque binary files and
//! structured JSON documents — and places each in the storage engine best
//! suited to its shape. Indexed text is chunked, embedded, and served
//! through prefix, semantic, and hybrid search.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────────┐   ┌───────────────────┐
//! │ media bytes│──▶│ classify + place │──▶│ files + catalog    │
//! └────────────┘   └─────────────────┘   │                   │
//! ┌────────────┐   ┌─────────────────┐   │ SQLite:           │
//! │ JSON tree  │──▶│ analyze + route  │──▶│  catalog, payload  │
//! └────────────┘   └─────────────────┘   │  tables, vectors   │
//!                                        └─────────┬─────────┘
//!                   ┌─────────────────┐            │
//!                   │ chunk + embed    │◀───────────┤
//!                   └───────┬─────────┘            │
//!                     ┌─────▼─────┐        ┌───────▼──────┐
//!                     │ token trie │        │ CLI / HTTP   │
//!                     └───────────┘        └──────────────┘
//! ```
//!
//! ## Data flow
//!
//! 1. Uploads enter the **media pipeline** ([`media`]): streamed to
//!    staging with incremental hashing and quota enforcement, classified
//!    by the **taxonomy** ([`taxonomy`] + [`sniff`]), placed at a
//!    canonical path ([`pathgen`]), derived ([`thumbs`]), committed to
//!    the **catalog** ([`catalog`]).
//! 2. JSON enters the **analyzer** ([`analyzer`]) and the **router**
//!    ([`router`]), which persists to a per-document relational table or
//!    the document collection.
//! 3. Indexable files go through **reindex** ([`reindex`]): extraction
//!    ([`extract`]), chunking ([`chunk`]), the **embedding gateway**
//!    ([`embedding`]), the **vector index** ([`vectors`]), and the
//!    **token trie** ([`trie`]).
//! 4. Queries go through the **retrieval composer** ([`retrieval`]).
//! 5. Every write path consults the **tenant guard** ([`tenant`]); the
//!    **reconciler** ([`reconcile`]) sweeps cross-store drift.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`app`] | Shared state: pool, taxonomy, guard, gateway, token index |
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | The error taxonomy every operation returns |
//! | [`models`] | Catalog rows, chunks, hits, search types |
//! | [`taxonomy`] | Ordered category tags and classification |
//! | [`sniff`] | Magic-byte MIME detection |
//! | [`pathgen`] | Canonical path synthesis |
//! | [`media`] | Streaming media ingest pipeline |
//! | [`thumbs`] | Derivative generation and image metadata |
//! | [`analyzer`] | JSON structural metrics and backing scores |
//! | [`router`] | JSON persistence in either backing |
//! | [`chunk`] | Separator-preferring text chunker |
//! | [`extract`] | Text extraction per category |
//! | [`embedding`] | Embedding gateway trait + HTTP implementation |
//! | [`vectors`] | Chunk/vector persistence and kNN |
//! | [`trie`] | Prefix/fuzzy token index |
//! | [`reindex`] | Per-source index pipeline |
//! | [`retrieval`] | Search composition and query logging |
//! | [`tenant`] | Tenant isolation and quota guard |
//! | [`catalog`] | Authoritative catalog queries |
//! | [`reconcile`] | Orphan sweeping across stores |
//! | [`db`], [`migrate`] | Pool and idempotent schema |
//! | [`server`] | Thin Axum JSON adapter |

pub mod analyzer;
pub mod app;
pub mod catalog;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod media;
pub mod migrate;
pub mod models;
pub mod pathgen;
pub mod reconcile;
pub mod reindex;
pub mod retrieval;
pub mod router;
pub mod server;
pub mod sniff;
pub mod taxonomy;
pub mod tenant;
pub mod thumbs;
pub mod trie;
pub mod vectors;
