//! Media ingest pipeline.
//!
//! Coordinates the full upload flow: streaming receipt → classification →
//! canonical placement → derivatives → catalog commit.
//!
//! # Pipeline
//!
//! 1. **Admit** — the tenant guard checks the tenant is active and the
//!    declared size fits the quota.
//! 2. **Receive** — the stream is copied into a tenant-scoped staging
//!    file while SHA-256 and the byte count accumulate incrementally. The
//!    first 4 KiB are buffered for magic detection; nothing is rewound.
//!    Quota is enforced *during* the stream: the ingest aborts the moment
//!    cumulative usage would cross the quota.
//! 3. **Classify** — extension, declared MIME, and sniffed MIME go through
//!    the taxonomy; the category decides placement and thumbnail work.
//! 4. **Place** — the staging file is atomically renamed to the canonical
//!    path; collisions retry with a fresh nonce, bounded.
//! 5. **Derive** — thumbable categories get three derivatives and image
//!    metadata. Derivative failures are demoted to warnings, never
//!    failures.
//! 6. **Commit** — catalog row insert and tenant usage update happen in
//!    one transaction, with the quota re-verified inside it. This is the
//!    non-cancellable point.
//!
//! Per-ingest states run `RECEIVING → STAGED → CLASSIFIED → COMMITTED`,
//! with `ABORTED` on any failure; only `COMMITTED` is observable. Every
//! exit path releases the admit token and removes staged/partial files.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app::{ensure_live, Depot};
use crate::catalog;
use crate::error::{DepotError, Result};
use crate::models::{CatalogFile, ThumbInfo};
use crate::pathgen::{self, MAX_PATH_ATTEMPTS};
use crate::sniff::{self, SNIFF_LEN};
use crate::tenant::AdmitToken;
use crate::thumbs;

/// Everything an in-flight ingest has acquired, released on abort.
#[derive(Default)]
struct IngestScope {
    token: Option<AdmitToken>,
    staging: Option<PathBuf>,
    canonical: Option<PathBuf>,
    thumbs: Vec<ThumbInfo>,
}

impl IngestScope {
    async fn abort(mut self, app: &Depot) {
        if let Some(path) = self.staging.take() {
            let _ = tokio::fs::remove_file(&path).await;
        }
        if let Some(path) = self.canonical.take() {
            let _ = tokio::fs::remove_file(&path).await;
        }
        thumbs::remove_thumbnails(&self.thumbs, &app.config.storage.root);
        if let Some(token) = self.token.take() {
            app.guard.release(token);
        }
    }
}

/// Ingest one binary artifact from a byte stream.
///
/// `expected_bytes` is the declared length when the transport knows it
/// (admission pre-check); actual enforcement happens on the observed
/// bytes either way.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_media(
    app: &Depot,
    tenant: &str,
    stream: impl AsyncRead + Unpin,
    declared_name: &str,
    declared_mime: Option<&str>,
    comment: Option<&str>,
    expected_bytes: Option<i64>,
    cancel: &CancellationToken,
) -> Result<CatalogFile> {
    if declared_name.trim().is_empty() {
        return Err(DepotError::Validation("filename must not be empty".to_string()));
    }

    let mut scope = IngestScope {
        token: Some(app.guard.admit(tenant, expected_bytes.unwrap_or(0)).await?),
        ..IngestScope::default()
    };

    match run_ingest(app, tenant, stream, declared_name, declared_mime, comment, cancel, &mut scope)
        .await
    {
        Ok(file) => Ok(file),
        Err(e) => {
            tracing::debug!(tenant, name = declared_name, error = %e, "ingest aborted");
            scope.abort(app).await;
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_ingest(
    app: &Depot,
    tenant: &str,
    mut stream: impl AsyncRead + Unpin,
    declared_name: &str,
    declared_mime: Option<&str>,
    comment: Option<&str>,
    cancel: &CancellationToken,
    scope: &mut IngestScope,
) -> Result<CatalogFile> {
    let root = app.config.storage.root.clone();
    let (used, quota) = app.guard.usage(tenant).await?;

    // RECEIVING
    let staging_dir = root.join("staging").join(tenant);
    tokio::fs::create_dir_all(&staging_dir).await?;
    let staging_path = staging_dir.join(format!("{}.part", Uuid::new_v4()));
    scope.staging = Some(staging_path.clone());

    let mut out = tokio::fs::File::create(&staging_path).await?;
    let mut hasher = Sha256::new();
    let mut head: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
    let mut total: i64 = 0;
    let mut buf = vec![0u8; 8192];

    loop {
        ensure_live(cancel)?;
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        total += n as i64;
        // Streaming quota enforcement: stop as soon as the write would
        // cross the line, not after the bytes are on disk.
        if used + total > quota {
            return Err(DepotError::QuotaExceeded(format!(
                "tenant {} would exceed quota {} mid-stream",
                tenant, quota
            )));
        }
        hasher.update(&buf[..n]);
        if head.len() < SNIFF_LEN {
            let want = (SNIFF_LEN - head.len()).min(n);
            head.extend_from_slice(&buf[..want]);
        }
        out.write_all(&buf[..n]).await?;
    }
    out.flush().await?;
    drop(out);

    // STAGED
    let sha256 = format!("{:x}", hasher.finalize());
    // De-duplication hook: identical bytes are allowed, but noted.
    if let Some(existing) =
        catalog::find_by_sha256(&app.pool, crate::tenant::Scope { tenant }, &sha256).await?
    {
        tracing::info!(tenant, existing = %existing.id, "content hash already stored");
    }
    let magic = sniff::sniff_mime(&head);
    let classification = app.taxonomy.classify(declared_name, declared_mime, magic);
    let category = classification.category.name.clone();
    let thumbable = classification.category.thumbable;
    let mime = classification.effective_mime.clone();
    tracing::debug!(
        tenant,
        name = declared_name,
        category = %category,
        matched_by = classification.matched_by.as_str(),
        bytes = total,
        "classified"
    );

    // CLASSIFIED — move to the canonical path, bounded collision retry.
    let now = Utc::now();
    let mut rel = pathgen::synthesize(&category, tenant, declared_name, now);
    let mut attempts = 0u32;
    let canonical = loop {
        ensure_live(cancel)?;
        let abs = root.join(&rel);
        if tokio::fs::try_exists(&abs).await? {
            attempts += 1;
            if attempts >= MAX_PATH_ATTEMPTS {
                return Err(DepotError::NameCollision(rel));
            }
            rel = pathgen::synthesize(&category, tenant, declared_name, now);
            continue;
        }
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&staging_path, &abs).await?;
        break abs;
    };
    scope.staging = None;
    scope.canonical = Some(canonical.clone());

    // Derivatives and metadata. Never fails the ingest; empty files get
    // no derivatives even when the category allows them.
    let mut thumb_infos = Vec::new();
    let mut meta_json = "{}".to_string();
    if thumbable && total > 0 {
        ensure_live(cancel)?;
        let bytes = tokio::fs::read(&canonical).await?;
        if let Some(meta) = thumbs::image_metadata(&bytes) {
            meta_json = serde_json::to_string(&meta)
                .map_err(|e| DepotError::Internal(format!("meta serialization: {}", e)))?;
        }
        let rel_for_thumbs = rel.clone();
        let root_for_thumbs = root.clone();
        let generated = tokio::task::spawn_blocking(move || {
            thumbs::generate_thumbnails(&bytes, &rel_for_thumbs, &root_for_thumbs)
        })
        .await
        .map_err(|e| DepotError::Internal(format!("thumbnail task: {}", e)))?;

        match generated {
            Ok(t) => thumb_infos = t,
            Err(e) => {
                tracing::warn!(tenant, name = declared_name, error = %e, "thumbnail generation failed");
            }
        }
        scope.thumbs = thumb_infos.clone();
    }

    let file_row = CatalogFile {
        id: Uuid::new_v4().to_string(),
        tenant: tenant.to_string(),
        original_name: declared_name.to_string(),
        category,
        mime,
        size_bytes: total,
        sha256,
        path: rel,
        created_at: now.timestamp(),
        indexed: false,
        thumbs: thumb_infos,
        meta_json,
        comment: comment.map(|c| c.to_string()),
        orphaned: false,
    };

    // Commit: catalog row plus usage in one transaction, quota re-checked
    // under the per-tenant lock. Not cancellable from here on.
    let token = scope
        .token
        .take()
        .ok_or_else(|| DepotError::Internal("admit token missing at commit".to_string()))?;
    let _tenant_lock = app.guard.tenant_lock(tenant).await;
    let mut tx = app.pool.begin().await?;
    catalog::insert_file_tx(&mut tx, &file_row).await?;
    app.guard.commit_in_tx(token, total, &mut tx).await?;
    tx.commit().await?;

    // COMMITTED
    scope.canonical = None;
    scope.thumbs.clear();
    tracing::info!(tenant, id = %file_row.id, path = %file_row.path, "media committed");
    Ok(file_row)
}

/// Fetch a stored artifact's catalog row and bytes.
pub async fn read_media(app: &Depot, tenant: &str, id: &str) -> Result<(CatalogFile, Vec<u8>)> {
    let scope = app.guard.scope(tenant).await?;
    let file = catalog::get_file(&app.pool, scope, id).await?;
    let abs = app.config.storage.root.join(&file.path);
    let bytes = tokio::fs::read(&abs)
        .await
        .map_err(|_| DepotError::NotFound(format!("stored bytes for {}", id)))?;
    Ok((file, bytes))
}

/// Tenant-scoped delete: catalog row, stored bytes, derivatives, chunks,
/// and the usage charge all go. Deleting an unknown id is `NotFound`.
pub async fn delete_media(app: &Depot, tenant: &str, id: &str) -> Result<()> {
    let scope = app.guard.scope(tenant).await?;
    let file = catalog::get_file(&app.pool, scope, id).await?;

    // Serialize against reindex of the same source.
    let _reindex_guard = app.reindex_lock(id).await;

    let mut tx = app.pool.begin().await?;
    sqlx::query("DELETE FROM chunk_vectors WHERE source_file_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunk WHERE source_file_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let deleted = catalog::delete_file_row_tx(&mut tx, scope, id).await?;
    if deleted == 0 {
        return Err(DepotError::NotFound(format!("file: {}", id)));
    }
    tx.commit().await?;

    // Derived caches and bytes follow the authoritative delete.
    {
        let mut index = app
            .token_index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        index.remove_file(id);
    }
    let _ = tokio::fs::remove_file(app.config.storage.root.join(&file.path)).await;
    thumbs::remove_thumbnails(&file.thumbs, &app.config.storage.root);
    app.guard.refund(tenant, file.size_bytes).await?;

    tracing::info!(tenant, id, "media deleted");
    Ok(())
}
