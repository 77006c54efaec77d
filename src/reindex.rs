//! Per-source indexing pipeline: extract → chunk → embed → store.
//!
//! Reindexing a source is serialized by a per-source advisory lock; a
//! concurrent caller for the same source waits and then re-runs over the
//! committed state. The chunk batch is atomic: an embedding failure
//! leaves no partial chunk set behind. The token index is updated only
//! after the chunk transaction commits.
//!
//! Reindexing is idempotent modulo chunk ids: the same stored text always
//! produces the same chunk texts and ordinals.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app::{ensure_live, Depot};
use crate::catalog;
use crate::chunk;
use crate::error::{DepotError, Result};
use crate::extract;
use crate::models::Chunk;
use crate::vectors;

/// Index (or re-index) one stored file. Returns the chunk count.
pub async fn reindex_file(
    app: &Depot,
    tenant: &str,
    file_id: &str,
    cancel: &CancellationToken,
) -> Result<usize> {
    let scope = app.guard.scope(tenant).await?;
    let file = catalog::get_file(&app.pool, scope, file_id).await?;

    if !extract::is_indexable(&file.category) {
        return Err(DepotError::Validation(format!(
            "category '{}' has no indexable text",
            file.category
        )));
    }

    let _source_lock = app.reindex_lock(file_id).await;

    ensure_live(cancel)?;
    let bytes = tokio::fs::read(app.config.storage.root.join(&file.path)).await?;
    let text = extract::extract_text(&bytes, &file.category);

    let pieces = chunk::chunk_text(
        &text,
        app.config.chunking.target_chars,
        app.config.chunking.overlap_chars,
    );

    let meta_json = serde_json::json!({
        "name": file.original_name,
        "category": file.category,
    })
    .to_string();

    let chunks: Vec<Chunk> = pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Chunk {
            id: Uuid::new_v4().to_string(),
            source_file_id: file_id.to_string(),
            tenant: tenant.to_string(),
            ordinal: i as i64,
            text: piece,
            meta_json: meta_json.clone(),
        })
        .collect();

    // Embed the whole batch before writing anything: a gateway failure
    // here leaves the previous chunk set untouched.
    let mut embeddings = Vec::with_capacity(chunks.len());
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    for batch in texts.chunks(app.config.embedding.batch_size.max(1)) {
        ensure_live(cancel)?;
        embeddings.extend(app.gateway.embed_batch(batch).await?);
    }

    ensure_live(cancel)?;
    vectors::store_chunks(&app.pool, file_id, &chunks, &embeddings).await?;

    // Cache update strictly after the commit.
    {
        let mut index = app
            .token_index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        index.remove_file(file_id);
        index.index_text(file_id, &text);
    }

    catalog::mark_indexed(&app.pool, scope, file_id, true).await?;

    tracing::info!(tenant, file_id, chunks = chunks.len(), "reindexed");
    Ok(chunks.len())
}
