//! Background reconciler for cross-store drift.
//!
//! The catalog is authoritative; the payload stores and the filesystem
//! are reconcilable side effects. Partial commits leave two kinds of
//! debris, swept here:
//!
//! - **orphan payloads** — `payload_<id>` tables or `doc_payload` rows
//!   whose id is absent from the catalog: dropped/deleted.
//! - **hollow catalog rows** — catalog entries whose payload or stored
//!   bytes have vanished: flagged `orphaned`, never deleted, so the
//!   trace survives for inspection.
//!
//! Also removes chunk rows whose source file no longer exists (derived
//! data, safe to drop).

use sqlx::Row;

use crate::app::Depot;
use crate::catalog;
use crate::error::Result;
use crate::models::Backing;

/// What one reconciler sweep did.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ReconcileReport {
    pub payload_tables_dropped: u64,
    pub doc_payloads_deleted: u64,
    pub files_flagged: u64,
    pub json_flagged: u64,
    pub chunks_purged: u64,
}

/// Run one reconciliation sweep over the whole depot.
pub async fn run_reconciler(app: &Depot) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    // Orphan relational payload tables.
    let tables: Vec<String> = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'payload_%'",
    )
    .fetch_all(&app.pool)
    .await?
    .iter()
    .map(|r| r.get::<String, _>("name"))
    .collect();

    for table in tables {
        // Document ids only contain [a-z0-9_], so the table suffix is the id.
        let id = table.trim_start_matches("payload_");
        let known: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM catalog_json WHERE id = ?")
            .bind(id)
            .fetch_one(&app.pool)
            .await?;
        if !known {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&app.pool)
                .await?;
            report.payload_tables_dropped += 1;
            tracing::info!(table = %table, "dropped orphan payload table");
        }
    }

    // Orphan document payloads.
    report.doc_payloads_deleted = sqlx::query(
        "DELETE FROM doc_payload WHERE id NOT IN (SELECT id FROM catalog_json)",
    )
    .execute(&app.pool)
    .await?
    .rows_affected();

    // Catalog rows whose payload went missing.
    let json_rows: Vec<(String, String)> =
        sqlx::query("SELECT id, backing FROM catalog_json WHERE orphaned = 0")
            .fetch_all(&app.pool)
            .await?
            .iter()
            .map(|r| (r.get("id"), r.get("backing")))
            .collect();

    for (id, backing) in json_rows {
        let present = match Backing::parse(&backing) {
            Some(Backing::Relational) => {
                let table = format!(
                    "payload_{}",
                    id.chars()
                        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                        .collect::<String>()
                );
                sqlx::query_scalar::<_, bool>(
                    "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
                )
                .bind(&table)
                .fetch_one(&app.pool)
                .await?
            }
            Some(Backing::Document) => {
                sqlx::query_scalar::<_, bool>("SELECT COUNT(*) > 0 FROM doc_payload WHERE id = ?")
                    .bind(&id)
                    .fetch_one(&app.pool)
                    .await?
            }
            None => false,
        };
        if !present {
            catalog::set_json_orphaned(&app.pool, &id).await?;
            report.json_flagged += 1;
            tracing::warn!(id = %id, "catalog_json row flagged orphaned");
        }
    }

    // Catalog files whose bytes vanished from disk.
    let file_rows: Vec<(String, String)> =
        sqlx::query("SELECT id, path FROM catalog_file WHERE orphaned = 0")
            .fetch_all(&app.pool)
            .await?
            .iter()
            .map(|r| (r.get("id"), r.get("path")))
            .collect();

    for (id, path) in file_rows {
        if !app.config.storage.root.join(&path).exists() {
            catalog::set_file_orphaned(&app.pool, &id).await?;
            report.files_flagged += 1;
            tracing::warn!(id = %id, path = %path, "catalog_file row flagged orphaned");
        }
    }

    // Chunks pointing at deleted files are derived data: purge.
    report.chunks_purged = sqlx::query(
        "DELETE FROM chunk WHERE source_file_id NOT IN (SELECT id FROM catalog_file)",
    )
    .execute(&app.pool)
    .await?
    .rows_affected();
    sqlx::query(
        "DELETE FROM chunk_vectors WHERE source_file_id NOT IN (SELECT id FROM catalog_file)",
    )
    .execute(&app.pool)
    .await?;

    tracing::info!(?report, "reconcile sweep complete");
    Ok(report)
}
