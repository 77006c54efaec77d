//! Database schema migrations.
//!
//! Creates all required tables and ensures idempotent execution.
//! Designed to be run via `depot init`.
//!
//! # Schema
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `tenants` | Quota and usage accounting per tenant |
//! | `catalog_file` | Authoritative metadata for stored binary artifacts |
//! | `catalog_json` | Authoritative metadata for routed JSON documents |
//! | `doc_payload` | Document-backing collection (one row per document id) |
//! | `chunk` | Text segments of indexed files |
//! | `chunk_vectors` | Embedding vectors stored as BLOBs, 1:1 with `chunk` |
//! | `query_log` | Append-only search analytics |
//!
//! Relational-backed JSON documents additionally get one physical
//! `payload_<id>` table each, created by the router inside the ingest
//! transaction — those are not part of the static schema here.
//!
//! # Indexes
//!
//! - `(tenant, created_at DESC)` on both catalog tables
//! - `catalog_file(category)` for retrieval filters
//! - `catalog_file(tenant, sha256)` as the de-duplication lookup hook
//! - unique `chunk(source_file_id, ordinal)` backing the contiguous-ordinal
//!   invariant
//!
//! # Idempotency
//!
//! All statements use `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT
//! EXISTS`. Running `depot init` multiple times is safe.

use sqlx::SqlitePool;

use crate::error::Result;

/// Run all database migrations. Safe to call multiple times.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            id TEXT PRIMARY KEY,
            quota_bytes INTEGER NOT NULL,
            used_bytes INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_file (
            id TEXT PRIMARY KEY,
            tenant TEXT NOT NULL,
            original_name TEXT NOT NULL,
            category TEXT NOT NULL,
            mime TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            path TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            indexed INTEGER NOT NULL DEFAULT 0,
            thumbs_json TEXT NOT NULL DEFAULT '[]',
            meta_json TEXT NOT NULL DEFAULT '{}',
            comment TEXT,
            orphaned INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_json (
            id TEXT PRIMARY KEY,
            tenant TEXT NOT NULL,
            backing TEXT NOT NULL,
            confidence REAL NOT NULL,
            size_bytes INTEGER NOT NULL,
            metrics_json TEXT NOT NULL DEFAULT '{}',
            tags TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            orphaned INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS doc_payload (
            id TEXT PRIMARY KEY,
            tenant TEXT NOT NULL,
            body TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk (
            id TEXT PRIMARY KEY,
            source_file_id TEXT NOT NULL,
            tenant TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            text TEXT NOT NULL,
            meta_json TEXT NOT NULL DEFAULT '{}',
            UNIQUE(source_file_id, ordinal)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            source_file_id TEXT NOT NULL,
            tenant TEXT NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunk(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_log (
            id TEXT PRIMARY KEY,
            tenant TEXT NOT NULL,
            query_text TEXT NOT NULL,
            embedding BLOB,
            created_at INTEGER NOT NULL,
            result_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for common query patterns
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_file_tenant_created
         ON catalog_file(tenant, created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catalog_file_category ON catalog_file(category)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_file_sha256 ON catalog_file(tenant, sha256)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_catalog_json_tenant_created
         ON catalog_json(tenant, created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_doc_payload_tenant_created
         ON doc_payload(tenant, created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_doc_payload_tags ON doc_payload(tags)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunk_source ON chunk(source_file_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunk_tenant ON chunk(tenant)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunk_vectors_source ON chunk_vectors(source_file_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_query_log_tenant ON query_log(tenant, created_at)")
        .execute(pool)
        .await?;

    Ok(())
}
