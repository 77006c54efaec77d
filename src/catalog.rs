//! Authoritative catalog queries.
//!
//! All reads take a [`Scope`] so tenant isolation is enforced at the query
//! itself, not left to callers. Writes that must be atomic with other
//! statements (usage accounting, payload creation) take a transaction;
//! standalone mutations take the pool.

use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::embedding::vec_to_blob;
use crate::error::{DepotError, Result};
use crate::models::{Backing, CatalogFile, CatalogJson, Chunk, ThumbInfo};
use crate::tenant::Scope;

fn row_to_file(row: &sqlx::sqlite::SqliteRow) -> CatalogFile {
    let thumbs: Vec<ThumbInfo> =
        serde_json::from_str(row.get::<String, _>("thumbs_json").as_str()).unwrap_or_default();
    CatalogFile {
        id: row.get("id"),
        tenant: row.get("tenant"),
        original_name: row.get("original_name"),
        category: row.get("category"),
        mime: row.get("mime"),
        size_bytes: row.get("size_bytes"),
        sha256: row.get("sha256"),
        path: row.get("path"),
        created_at: row.get("created_at"),
        indexed: row.get::<i64, _>("indexed") != 0,
        thumbs,
        meta_json: row.get("meta_json"),
        comment: row.get("comment"),
        orphaned: row.get::<i64, _>("orphaned") != 0,
    }
}

fn row_to_json(row: &sqlx::sqlite::SqliteRow) -> Result<CatalogJson> {
    let backing_str: String = row.get("backing");
    let backing = Backing::parse(&backing_str)
        .ok_or_else(|| DepotError::Internal(format!("corrupt backing value: {}", backing_str)))?;
    let tags: Vec<String> =
        serde_json::from_str(row.get::<String, _>("tags").as_str()).unwrap_or_default();
    Ok(CatalogJson {
        id: row.get("id"),
        tenant: row.get("tenant"),
        backing,
        confidence: row.get("confidence"),
        size_bytes: row.get("size_bytes"),
        metrics_json: row.get("metrics_json"),
        tags,
        created_at: row.get("created_at"),
        orphaned: row.get::<i64, _>("orphaned") != 0,
    })
}

// ============ catalog_file ============

pub async fn insert_file_tx(tx: &mut Transaction<'_, Sqlite>, file: &CatalogFile) -> Result<()> {
    let thumbs_json = serde_json::to_string(&file.thumbs)
        .map_err(|e| DepotError::Internal(format!("thumbs serialization: {}", e)))?;
    sqlx::query(
        r#"
        INSERT INTO catalog_file
            (id, tenant, original_name, category, mime, size_bytes, sha256, path,
             created_at, indexed, thumbs_json, meta_json, comment, orphaned)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(&file.id)
    .bind(&file.tenant)
    .bind(&file.original_name)
    .bind(&file.category)
    .bind(&file.mime)
    .bind(file.size_bytes)
    .bind(&file.sha256)
    .bind(&file.path)
    .bind(file.created_at)
    .bind(file.indexed as i64)
    .bind(thumbs_json)
    .bind(&file.meta_json)
    .bind(&file.comment)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn get_file(pool: &SqlitePool, scope: Scope<'_>, id: &str) -> Result<CatalogFile> {
    let row = sqlx::query("SELECT * FROM catalog_file WHERE id = ? AND tenant = ?")
        .bind(id)
        .bind(scope.tenant)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DepotError::NotFound(format!("file: {}", id)))?;
    Ok(row_to_file(&row))
}

pub async fn list_files(
    pool: &SqlitePool,
    scope: Scope<'_>,
    category: Option<&str>,
    limit: i64,
) -> Result<Vec<CatalogFile>> {
    let rows = match category {
        Some(cat) => {
            sqlx::query(
                "SELECT * FROM catalog_file WHERE tenant = ? AND category = ?
                 ORDER BY created_at DESC LIMIT ?",
            )
            .bind(scope.tenant)
            .bind(cat)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT * FROM catalog_file WHERE tenant = ?
                 ORDER BY created_at DESC LIMIT ?",
            )
            .bind(scope.tenant)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows.iter().map(row_to_file).collect())
}

/// De-duplication hook: an existing live row with the same content hash.
pub async fn find_by_sha256(
    pool: &SqlitePool,
    scope: Scope<'_>,
    sha256: &str,
) -> Result<Option<CatalogFile>> {
    let row = sqlx::query(
        "SELECT * FROM catalog_file WHERE tenant = ? AND sha256 = ? AND orphaned = 0 LIMIT 1",
    )
    .bind(scope.tenant)
    .bind(sha256)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| row_to_file(&r)))
}

pub async fn mark_indexed(pool: &SqlitePool, scope: Scope<'_>, id: &str, indexed: bool) -> Result<()> {
    let updated = sqlx::query("UPDATE catalog_file SET indexed = ? WHERE id = ? AND tenant = ?")
        .bind(indexed as i64)
        .bind(id)
        .bind(scope.tenant)
        .execute(pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(DepotError::NotFound(format!("file: {}", id)));
    }
    Ok(())
}

pub async fn set_file_orphaned(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("UPDATE catalog_file SET orphaned = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_file_row_tx(
    tx: &mut Transaction<'_, Sqlite>,
    scope: Scope<'_>,
    id: &str,
) -> Result<u64> {
    let deleted = sqlx::query("DELETE FROM catalog_file WHERE id = ? AND tenant = ?")
        .bind(id)
        .bind(scope.tenant)
        .execute(&mut **tx)
        .await?
        .rows_affected();
    Ok(deleted)
}

/// Per-category `(count, total bytes)` for one tenant.
pub async fn category_stats(pool: &SqlitePool, scope: Scope<'_>) -> Result<Vec<(String, i64, i64)>> {
    let rows = sqlx::query(
        "SELECT category, COUNT(*) AS n, COALESCE(SUM(size_bytes), 0) AS bytes
         FROM catalog_file WHERE tenant = ? GROUP BY category ORDER BY category",
    )
    .bind(scope.tenant)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|r| (r.get("category"), r.get("n"), r.get("bytes")))
        .collect())
}

// ============ catalog_json ============

pub async fn insert_json_tx(tx: &mut Transaction<'_, Sqlite>, doc: &CatalogJson) -> Result<()> {
    let tags = serde_json::to_string(&doc.tags)
        .map_err(|e| DepotError::Internal(format!("tags serialization: {}", e)))?;
    sqlx::query(
        r#"
        INSERT INTO catalog_json
            (id, tenant, backing, confidence, size_bytes, metrics_json, tags, created_at, orphaned)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.tenant)
    .bind(doc.backing.as_str())
    .bind(doc.confidence)
    .bind(doc.size_bytes)
    .bind(&doc.metrics_json)
    .bind(tags)
    .bind(doc.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn get_json(pool: &SqlitePool, scope: Scope<'_>, id: &str) -> Result<CatalogJson> {
    let row = sqlx::query("SELECT * FROM catalog_json WHERE id = ? AND tenant = ?")
        .bind(id)
        .bind(scope.tenant)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DepotError::NotFound(format!("document: {}", id)))?;
    row_to_json(&row)
}

pub async fn list_json(
    pool: &SqlitePool,
    scope: Scope<'_>,
    backing: Option<Backing>,
    limit: i64,
) -> Result<Vec<CatalogJson>> {
    let rows = match backing {
        Some(b) => {
            sqlx::query(
                "SELECT * FROM catalog_json WHERE tenant = ? AND backing = ?
                 ORDER BY created_at DESC LIMIT ?",
            )
            .bind(scope.tenant)
            .bind(b.as_str())
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT * FROM catalog_json WHERE tenant = ?
                 ORDER BY created_at DESC LIMIT ?",
            )
            .bind(scope.tenant)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };
    rows.iter().map(row_to_json).collect()
}

pub async fn set_json_orphaned(pool: &SqlitePool, id: &str) -> Result<()> {
    sqlx::query("UPDATE catalog_json SET orphaned = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_json_row_tx(
    tx: &mut Transaction<'_, Sqlite>,
    scope: Scope<'_>,
    id: &str,
) -> Result<u64> {
    let deleted = sqlx::query("DELETE FROM catalog_json WHERE id = ? AND tenant = ?")
        .bind(id)
        .bind(scope.tenant)
        .execute(&mut **tx)
        .await?
        .rows_affected();
    Ok(deleted)
}

// ============ chunk ============

pub async fn chunks_for_source(pool: &SqlitePool, source_file_id: &str) -> Result<Vec<Chunk>> {
    let rows = sqlx::query(
        "SELECT id, source_file_id, tenant, ordinal, text, meta_json
         FROM chunk WHERE source_file_id = ? ORDER BY ordinal",
    )
    .bind(source_file_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|r| Chunk {
            id: r.get("id"),
            source_file_id: r.get("source_file_id"),
            tenant: r.get("tenant"),
            ordinal: r.get("ordinal"),
            text: r.get("text"),
            meta_json: r.get("meta_json"),
        })
        .collect())
}

/// `(source_file_id, text)` pairs for rebuilding the token index.
pub async fn all_chunk_texts(pool: &SqlitePool) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query("SELECT source_file_id, text FROM chunk ORDER BY source_file_id, ordinal")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|r| (r.get("source_file_id"), r.get("text")))
        .collect())
}

// ============ query_log ============

/// Append one search to the analytics log.
pub async fn log_query(
    pool: &SqlitePool,
    tenant: &str,
    query_text: &str,
    embedding: Option<&[f32]>,
    result_count: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO query_log (id, tenant, query_text, embedding, created_at, result_count)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(tenant)
    .bind(query_text)
    .bind(embedding.map(vec_to_blob))
    .bind(chrono::Utc::now().timestamp())
    .bind(result_count)
    .execute(pool)
    .await?;
    Ok(())
}
