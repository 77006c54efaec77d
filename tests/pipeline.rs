//! End-to-end pipeline tests over a tempdir-backed depot: media ingest,
//! JSON routing, quota enforcement, indexing, retrieval, deletion, and
//! reconciliation.

mod common;

use common::{png_fixture, setup, setup_with_quota, storage_root};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use depot::catalog;
use depot::error::DepotError;
use depot::media;
use depot::models::{Backing, SearchMode};
use depot::reconcile;
use depot::reindex;
use depot::retrieval::{self, SearchOptions};
use depot::router;

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

async fn ingest_bytes(
    t: &common::TestDepot,
    name: &str,
    mime: Option<&str>,
    bytes: &[u8],
) -> Result<depot::models::CatalogFile, DepotError> {
    media::ingest_media(
        &t.depot,
        &t.tenant,
        bytes,
        name,
        mime,
        None,
        Some(bytes.len() as i64),
        &cancel(),
    )
    .await
}

// ============ media ============

#[tokio::test]
async fn test_media_ingest_roundtrip() {
    let t = setup().await;
    let content = b"The quick brown fox jumps over the lazy dog.\n".repeat(10);

    let file = ingest_bytes(&t, "notes.txt", Some("text/plain"), &content)
        .await
        .unwrap();

    assert_eq!(file.category, "text");
    assert_eq!(file.size_bytes, content.len() as i64);
    assert!(file.path.starts_with("text/"));
    assert!(!file.indexed);

    let (fetched, bytes) = media::read_media(&t.depot, &t.tenant, &file.id).await.unwrap();
    assert_eq!(bytes, content);
    assert_eq!(fetched.sha256, file.sha256);

    // Size and digest match what is actually on disk.
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    assert_eq!(format!("{:x}", hasher.finalize()), file.sha256);
}

#[tokio::test]
async fn test_photo_ingest_generates_three_derivatives() {
    let t = setup().await;
    let png = png_fixture(640, 320);

    let file = ingest_bytes(&t, "photo.JPG", Some("image/jpeg"), &png)
        .await
        .unwrap();

    // Extension decides, and the canonical path lands under the category.
    assert_eq!(file.category, "photos");
    assert!(file.path.starts_with("photos/"));
    assert!(file.path.ends_with(".jpg"));

    assert_eq!(file.thumbs.len(), 3);
    let sizes: Vec<&str> = file.thumbs.iter().map(|th| th.size.as_str()).collect();
    assert_eq!(sizes, vec!["small", "medium", "large"]);
    for th in &file.thumbs {
        assert!(storage_root(&t).join(&th.path).exists());
        assert!(th.path.starts_with("thumbnails/"));
    }

    let meta: serde_json::Value = serde_json::from_str(&file.meta_json).unwrap();
    assert_eq!(meta["width"], 640);
    assert_eq!(meta["height"], 320);
}

#[tokio::test]
async fn test_empty_file_ingest_succeeds_without_derivatives() {
    let t = setup().await;

    let file = ingest_bytes(&t, "empty.png", Some("image/png"), b"").await.unwrap();

    assert_eq!(file.category, "photos"); // from the extension
    assert_eq!(file.size_bytes, 0);
    assert!(file.thumbs.is_empty());
    assert!(storage_root(&t).join(&file.path).exists());
}

#[tokio::test]
async fn test_garbage_image_bytes_demote_thumbnails_to_warning() {
    let t = setup().await;

    // Claims to be a photo, is not decodable. Ingest must still succeed.
    let file = ingest_bytes(&t, "broken.jpg", Some("image/jpeg"), b"not really a jpeg")
        .await
        .unwrap();
    assert_eq!(file.category, "photos");
    assert!(file.thumbs.is_empty());
}

#[tokio::test]
async fn test_unknown_everything_lands_in_other() {
    let t = setup().await;
    let file = ingest_bytes(&t, "mystery.qqq", None, &[0u8, 1, 2, 3, 251, 250])
        .await
        .unwrap();
    assert_eq!(file.category, "other");
    assert!(file.path.starts_with("other/"));
}

#[tokio::test]
async fn test_cancelled_ingest_cleans_up() {
    let t = setup().await;
    let token = CancellationToken::new();
    token.cancel();

    let err = media::ingest_media(
        &t.depot,
        &t.tenant,
        &b"some bytes"[..],
        "doomed.txt",
        None,
        None,
        None,
        &token,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DepotError::Cancelled));

    // Nothing staged, nothing charged.
    let staging = storage_root(&t).join("staging").join(&t.tenant);
    let leftovers = std::fs::read_dir(&staging)
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
    let (used, _) = t.depot.guard.usage(&t.tenant).await.unwrap();
    assert_eq!(used, 0);
}

// ============ quota ============

#[tokio::test]
async fn test_quota_aborts_mid_stream() {
    let t = setup_with_quota(100).await;

    // 60 bytes land fine.
    ingest_bytes(&t, "a.bin", None, &[7u8; 60]).await.unwrap();
    let (used, _) = t.depot.guard.usage(&t.tenant).await.unwrap();
    assert_eq!(used, 60);

    // 50 more cross the line mid-stream: no file, usage unchanged.
    let err = media::ingest_media(
        &t.depot,
        &t.tenant,
        &[7u8; 50][..],
        "b.bin",
        None,
        None,
        None, // undeclared size: admission passes, streaming check trips
        &cancel(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DepotError::QuotaExceeded(_)));

    let (used, _) = t.depot.guard.usage(&t.tenant).await.unwrap();
    assert_eq!(used, 60);
    let scope = t.depot.guard.scope(&t.tenant).await.unwrap();
    let files = catalog::list_files(&t.depot.pool, scope, None, 100).await.unwrap();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn test_quota_exact_boundary() {
    let t = setup_with_quota(100).await;

    ingest_bytes(&t, "big.bin", None, &[1u8; 99]).await.unwrap();

    // One byte left: a one-byte file commits.
    ingest_bytes(&t, "one.bin", None, &[1u8]).await.unwrap();
    let (used, quota) = t.depot.guard.usage(&t.tenant).await.unwrap();
    assert_eq!((used, quota), (100, 100));

    // The next byte is over.
    let err = ingest_bytes(&t, "two.bin", None, &[1u8]).await.unwrap_err();
    assert!(matches!(err, DepotError::QuotaExceeded(_)));
}

#[tokio::test]
async fn test_suspended_tenant_is_rejected() {
    let t = setup().await;
    t.depot.guard.set_active(&t.tenant, false).await.unwrap();
    let err = ingest_bytes(&t, "x.txt", None, b"hi").await.unwrap_err();
    assert!(matches!(err, DepotError::Forbidden(_)));
}

// ============ json routing ============

#[tokio::test]
async fn test_flat_records_go_relational_with_fanout() {
    let t = setup().await;
    let data = json!([
        {"id": 1, "name": "A", "price": 9.99},
        {"id": 2, "name": "B", "price": 19.99},
        {"id": 3, "name": "C", "price": 29.99}
    ]);

    let (row, routing) = router::ingest_json(&t.depot, &t.tenant, data.clone(), vec![], &cancel())
        .await
        .unwrap();

    assert_eq!(row.backing, Backing::Relational);
    assert!(row.confidence > 0.99);
    assert_eq!(routing.nosql_score, 0.0);

    // The per-document physical table exists and holds one row per element.
    let table = format!("payload_{}", row.id);
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(&t.depot.pool)
        .await
        .unwrap();
    assert_eq!(count, 3);

    // Round trip.
    let (_, fetched) = router::fetch_json(&t.depot, &t.tenant, &row.id).await.unwrap();
    assert_eq!(fetched, data);
}

#[tokio::test]
async fn test_nested_tree_goes_document() {
    let t = setup().await;
    let data = json!({
        "u": {"p": {
            "c": [{"t": "e", "v": "x"}, {"t": "p", "v": "y"}],
            "pref": {"n": {"e": true, "s": false}}
        }}
    });

    let (row, _) = router::ingest_json(
        &t.depot,
        &t.tenant,
        data.clone(),
        vec!["prefs".to_string()],
        &cancel(),
    )
    .await
    .unwrap();

    assert_eq!(row.backing, Backing::Document);
    assert!(row.confidence > 0.7);
    assert_eq!(row.tags, vec!["prefs"]);

    let (fetched_row, fetched) = router::fetch_json(&t.depot, &t.tenant, &row.id).await.unwrap();
    assert_eq!(fetched, data);
    assert_eq!(fetched_row.backing, Backing::Document);
}

#[tokio::test]
async fn test_json_quota_charged_and_refunded() {
    let t = setup().await;
    let data = json!({"k": "v"});

    let (row, _) = router::ingest_json(&t.depot, &t.tenant, data, vec![], &cancel())
        .await
        .unwrap();
    let (used, _) = t.depot.guard.usage(&t.tenant).await.unwrap();
    assert_eq!(used, row.size_bytes);

    router::delete_json(&t.depot, &t.tenant, &row.id).await.unwrap();
    let (used, _) = t.depot.guard.usage(&t.tenant).await.unwrap();
    assert_eq!(used, 0);
}

#[tokio::test]
async fn test_json_over_quota_is_rejected() {
    let t = setup_with_quota(10).await;
    let data = json!({"text": "far larger than ten bytes of quota"});
    let err = router::ingest_json(&t.depot, &t.tenant, data, vec![], &cancel())
        .await
        .unwrap_err();
    assert!(matches!(err, DepotError::QuotaExceeded(_)));
}

// ============ indexing + retrieval ============

async fn ingest_and_index(t: &common::TestDepot, name: &str, text: &str) -> String {
    let file = ingest_bytes(t, name, Some("text/plain"), text.as_bytes())
        .await
        .unwrap();
    reindex::reindex_file(&t.depot, &t.tenant, &file.id, &cancel())
        .await
        .unwrap();
    file.id
}

#[tokio::test]
async fn test_chunk_ordinals_are_contiguous() {
    let t = setup().await;
    let text = "Paragraph one about nothing in particular.\n\n".repeat(40);
    let id = ingest_and_index(&t, "long.txt", &text).await;

    let chunks = catalog::chunks_for_source(&t.depot.pool, &id).await.unwrap();
    assert!(chunks.len() > 1);
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.ordinal, i as i64);
    }

    let scope = t.depot.guard.scope(&t.tenant).await.unwrap();
    let file = catalog::get_file(&t.depot.pool, scope, &id).await.unwrap();
    assert!(file.indexed);
}

#[tokio::test]
async fn test_reindex_is_idempotent_on_text_and_ordinals() {
    let t = setup().await;
    let text = "Determinism matters. ".repeat(80);
    let id = ingest_and_index(&t, "det.txt", &text).await;

    let first = catalog::chunks_for_source(&t.depot.pool, &id).await.unwrap();
    reindex::reindex_file(&t.depot, &t.tenant, &id, &cancel())
        .await
        .unwrap();
    let second = catalog::chunks_for_source(&t.depot.pool, &id).await.unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.text, b.text);
        assert_eq!(a.ordinal, b.ordinal);
    }
}

#[tokio::test]
async fn test_reindex_rejects_binary_categories() {
    let t = setup().await;
    let file = ingest_bytes(&t, "img.png", None, &png_fixture(32, 32)).await.unwrap();
    let err = reindex::reindex_file(&t.depot, &t.tenant, &file.id, &cancel())
        .await
        .unwrap_err();
    assert!(matches!(err, DepotError::Validation(_)));
}

#[tokio::test]
async fn test_semantic_search_ranks_related_file_first() {
    let t = setup().await;
    let ml = ingest_and_index(
        &t,
        "ml.txt",
        "neural network training improves model accuracy with gradient descent",
    )
    .await;
    let baking = ingest_and_index(
        &t,
        "baking.txt",
        "baking sourdough bread requires a lively starter and a hot oven",
    )
    .await;

    let response = retrieval::search(
        &t.depot,
        &t.tenant,
        "deep learning",
        &SearchOptions::semantic(3),
    )
    .await
    .unwrap();

    assert_eq!(response.mode, SearchMode::Semantic);
    assert!(!response.chunk_hits.is_empty());
    assert_eq!(response.chunk_hits[0].source_file_id, ml);

    let baking_hit = response
        .chunk_hits
        .iter()
        .find(|h| h.source_file_id == baking);
    if let Some(hit) = baking_hit {
        assert!(hit.distance > response.chunk_hits[0].distance);
    }
}

#[tokio::test]
async fn test_category_filter_restricts_semantic_hits() {
    let t = setup().await;
    ingest_and_index(&t, "ml.txt", "neural network training notes").await;

    let opts = SearchOptions {
        mode: SearchMode::Semantic,
        top_k: 5,
        categories: Some(vec!["markdown".to_string()]),
    };
    let response = retrieval::search(&t.depot, &t.tenant, "neural network", &opts)
        .await
        .unwrap();
    assert!(response.chunk_hits.is_empty());
}

#[tokio::test]
async fn test_short_query_degrades_to_prefix() {
    let t = setup().await;
    ingest_and_index(&t, "ml.txt", "neural network training notes").await;

    let opts = SearchOptions {
        mode: SearchMode::Hybrid,
        top_k: 5,
        categories: None,
    };
    let response = retrieval::search(&t.depot, &t.tenant, "ne", &opts).await.unwrap();
    assert_eq!(response.mode, SearchMode::Prefix);
    assert!(response.chunk_hits.is_empty());
    assert!(response
        .token_hits
        .iter()
        .any(|h| h.token.starts_with("ne")));
}

#[tokio::test]
async fn test_prefix_search_tolerates_typos() {
    let t = setup().await;
    let id = ingest_and_index(&t, "ml.txt", "neural network training notes").await;

    let opts = SearchOptions {
        mode: SearchMode::Prefix,
        top_k: 5,
        categories: None,
    };
    let response = retrieval::search(&t.depot, &t.tenant, "netwrk", &opts).await.unwrap();
    let hit = response
        .token_hits
        .iter()
        .find(|h| h.token == "network")
        .expect("fuzzy fallback should surface the real token");
    assert!(hit.files.contains(&id));
}

#[tokio::test]
async fn test_hybrid_dedups_by_source() {
    let t = setup().await;
    let ml = ingest_and_index(&t, "ml.txt", "neural network training notes").await;

    let opts = SearchOptions {
        mode: SearchMode::Hybrid,
        top_k: 5,
        categories: None,
    };
    let response = retrieval::search(&t.depot, &t.tenant, "neural network training", &opts)
        .await
        .unwrap();

    // The file already surfaced semantically must not reappear in the
    // token hits.
    assert!(response.chunk_hits.iter().any(|h| h.source_file_id == ml));
    for hit in &response.token_hits {
        assert!(!hit.files.contains(&ml));
    }
}

#[tokio::test]
async fn test_search_is_tenant_scoped() {
    let t = setup().await;
    ingest_and_index(&t, "ml.txt", "neural network training notes").await;

    t.depot.guard.create_tenant("rival", 1_000_000).await.unwrap();
    let response = retrieval::search(
        &t.depot,
        "rival",
        "neural network",
        &SearchOptions::semantic(5),
    )
    .await
    .unwrap();
    assert!(response.chunk_hits.is_empty());
}

#[tokio::test]
async fn test_query_log_receives_rows() {
    let t = setup().await;
    ingest_and_index(&t, "ml.txt", "neural network training notes").await;

    retrieval::search(
        &t.depot,
        &t.tenant,
        "neural network",
        &SearchOptions::semantic(5),
    )
    .await
    .unwrap();

    // The log write is async; give it a beat.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_log WHERE tenant = ?")
        .bind(&t.tenant)
        .fetch_one(&t.depot.pool)
        .await
        .unwrap();
    assert!(count >= 1);
}

// ============ delete ============

#[tokio::test]
async fn test_delete_file_cascades_and_is_idempotent() {
    let t = setup().await;
    let id = ingest_and_index(&t, "ml.txt", "neural network training notes").await;

    media::delete_media(&t.depot, &t.tenant, &id).await.unwrap();

    // Chunks, vectors, bytes, and usage all gone.
    let chunks = catalog::chunks_for_source(&t.depot.pool, &id).await.unwrap();
    assert!(chunks.is_empty());
    let (used, _) = t.depot.guard.usage(&t.tenant).await.unwrap();
    assert_eq!(used, 0);

    // Second delete reports not-found, never crashes.
    let err = media::delete_media(&t.depot, &t.tenant, &id).await.unwrap_err();
    assert!(matches!(err, DepotError::NotFound(_)));

    // Deleted sources vanish from prefix search too.
    let opts = SearchOptions {
        mode: SearchMode::Prefix,
        top_k: 5,
        categories: None,
    };
    let response = retrieval::search(&t.depot, &t.tenant, "neural", &opts).await.unwrap();
    assert!(response.token_hits.iter().all(|h| !h.files.contains(&id)));
}

#[tokio::test]
async fn test_delete_is_tenant_scoped() {
    let t = setup().await;
    let file = ingest_bytes(&t, "mine.txt", None, b"private bytes").await.unwrap();

    t.depot.guard.create_tenant("rival", 1_000_000).await.unwrap();
    let err = media::delete_media(&t.depot, "rival", &file.id).await.unwrap_err();
    assert!(matches!(err, DepotError::NotFound(_)));

    // Still there for the owner.
    media::read_media(&t.depot, &t.tenant, &file.id).await.unwrap();
}

#[tokio::test]
async fn test_delete_relational_json_drops_table() {
    let t = setup().await;
    let data = json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]);
    let (row, _) = router::ingest_json(&t.depot, &t.tenant, data, vec![], &cancel())
        .await
        .unwrap();
    assert_eq!(row.backing, Backing::Relational);

    router::delete_json(&t.depot, &t.tenant, &row.id).await.unwrap();

    let table = format!("payload_{}", row.id);
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(&table)
    .fetch_one(&t.depot.pool)
    .await
    .unwrap();
    assert!(!exists);

    let err = router::delete_json(&t.depot, &t.tenant, &row.id).await.unwrap_err();
    assert!(matches!(err, DepotError::NotFound(_)));
}

// ============ reconciler ============

#[tokio::test]
async fn test_reconciler_drops_orphan_payloads() {
    let t = setup().await;

    // Orphan relational table with no catalog row.
    sqlx::query(
        "CREATE TABLE payload_doc_19990101000000_deadbeef0123 (
            row_id INTEGER PRIMARY KEY, tenant TEXT, created_at INTEGER, body TEXT)",
    )
    .execute(&t.depot.pool)
    .await
    .unwrap();
    // Orphan document payload.
    sqlx::query(
        "INSERT INTO doc_payload (id, tenant, body, tags, created_at)
         VALUES ('doc_19990101000000_feedfacecafe', 'acme', '{}', '[]', 0)",
    )
    .execute(&t.depot.pool)
    .await
    .unwrap();

    let report = reconcile::run_reconciler(&t.depot).await.unwrap();
    assert_eq!(report.payload_tables_dropped, 1);
    assert_eq!(report.doc_payloads_deleted, 1);
}

#[tokio::test]
async fn test_reconciler_flags_hollow_catalog_rows() {
    let t = setup().await;
    let file = ingest_bytes(&t, "vanish.txt", None, b"soon gone").await.unwrap();

    // Bytes disappear behind the catalog's back.
    std::fs::remove_file(storage_root(&t).join(&file.path)).unwrap();

    let report = reconcile::run_reconciler(&t.depot).await.unwrap();
    assert_eq!(report.files_flagged, 1);

    let scope = t.depot.guard.scope(&t.tenant).await.unwrap();
    let row = catalog::get_file(&t.depot.pool, scope, &file.id).await.unwrap();
    assert!(row.orphaned);

    // A second sweep finds nothing new.
    let report = reconcile::run_reconciler(&t.depot).await.unwrap();
    assert_eq!(report.files_flagged, 0);
}

#[tokio::test]
async fn test_reconciler_keeps_healthy_documents() {
    let t = setup().await;
    let (row, _) = router::ingest_json(&t.depot, &t.tenant, json!({"a": {"b": {"c": 1}}}), vec![], &cancel())
        .await
        .unwrap();

    let report = reconcile::run_reconciler(&t.depot).await.unwrap();
    assert_eq!(report.json_flagged, 0);
    assert_eq!(report.doc_payloads_deleted, 0);

    let (_, data) = router::fetch_json(&t.depot, &t.tenant, &row.id).await.unwrap();
    assert_eq!(data, json!({"a": {"b": {"c": 1}}}));
}
