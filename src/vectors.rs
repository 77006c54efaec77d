//! Vector index: chunk persistence and nearest-neighbour search.
//!
//! Chunk rows and their embedding BLOBs are written in one transaction per
//! source file — the old set is purged first, so a reindex is all-or-nothing
//! and ordinals always form a contiguous prefix. Vectors are L2-normalized
//! before storage; queries normalize too, so L2 distance ordering matches
//! cosine ordering (the policy is fixed here, at the single write/read
//! site).
//!
//! Search is a scan over the tenant's candidate rows. Results come back
//! ascending by distance, ties broken by `(source_file_id, ordinal)`.

use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, l2_distance, l2_normalize, vec_to_blob};
use crate::error::{DepotError, Result};
use crate::models::{Chunk, ChunkHit};

/// Optional restrictions on a kNN query.
#[derive(Debug, Default, Clone)]
pub struct KnnFilter {
    /// Only chunks whose owning file has one of these categories.
    pub categories: Option<Vec<String>>,
    /// Only chunks from these source files.
    pub source_ids: Option<Vec<String>>,
}

/// Replace all chunks (and vectors) for one source atomically.
///
/// `chunks` and `vectors` are parallel; a length mismatch is an invariant
/// violation. Chunk ordinals must already be contiguous from 0 — the
/// chunker guarantees it, and the unique `(source_file_id, ordinal)` index
/// backs it up.
pub async fn store_chunks(
    pool: &SqlitePool,
    source_file_id: &str,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
) -> Result<()> {
    if chunks.len() != vectors.len() {
        return Err(DepotError::Internal(format!(
            "chunk/vector count mismatch: {} vs {}",
            chunks.len(),
            vectors.len()
        )));
    }

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunk_vectors WHERE source_file_id = ?")
        .bind(source_file_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunk WHERE source_file_id = ?")
        .bind(source_file_id)
        .execute(&mut *tx)
        .await?;

    for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
        sqlx::query(
            "INSERT INTO chunk (id, source_file_id, tenant, ordinal, text, meta_json)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.source_file_id)
        .bind(&chunk.tenant)
        .bind(chunk.ordinal)
        .bind(&chunk.text)
        .bind(&chunk.meta_json)
        .execute(&mut *tx)
        .await?;

        let mut normalized = vector.clone();
        l2_normalize(&mut normalized);
        sqlx::query(
            "INSERT INTO chunk_vectors (chunk_id, source_file_id, tenant, embedding)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.source_file_id)
        .bind(&chunk.tenant)
        .bind(vec_to_blob(&normalized))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Drop all chunks and vectors for a source, atomically.
pub async fn delete_chunks(pool: &SqlitePool, source_file_id: &str) -> Result<()> {
    store_chunks(pool, source_file_id, &[], &[]).await
}

/// `top_k` nearest chunks to `query` within one tenant.
pub async fn knn(
    pool: &SqlitePool,
    tenant: &str,
    query: &[f32],
    top_k: usize,
    filter: &KnnFilter,
) -> Result<Vec<ChunkHit>> {
    let mut normalized = query.to_vec();
    l2_normalize(&mut normalized);

    let rows = sqlx::query(
        r#"
        SELECT cv.chunk_id, cv.source_file_id, cv.embedding,
               c.ordinal, c.text, f.category
        FROM chunk_vectors cv
        JOIN chunk c ON c.id = cv.chunk_id
        JOIN catalog_file f ON f.id = cv.source_file_id
        WHERE cv.tenant = ?
        "#,
    )
    .bind(tenant)
    .fetch_all(pool)
    .await?;

    let mut hits: Vec<ChunkHit> = rows
        .iter()
        .filter_map(|row| {
            let category: String = row.get("category");
            if let Some(ref cats) = filter.categories {
                if !cats.iter().any(|c| c == &category) {
                    return None;
                }
            }
            let source_file_id: String = row.get("source_file_id");
            if let Some(ref ids) = filter.source_ids {
                if !ids.iter().any(|i| i == &source_file_id) {
                    return None;
                }
            }

            let embedding = blob_to_vec(row.get::<Vec<u8>, _>("embedding").as_slice());
            let distance = l2_distance(&normalized, &embedding);
            Some(ChunkHit {
                chunk_id: row.get("chunk_id"),
                source_file_id,
                ordinal: row.get("ordinal"),
                text: row.get("text"),
                category,
                distance,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source_file_id.cmp(&b.source_file_id))
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    });
    hits.truncate(top_k);

    Ok(hits)
}
