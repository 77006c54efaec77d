//! JSON ingest: shape analysis, backing selection, and persistence.
//!
//! Incoming trees are measured by the analyzer, then persisted in the
//! backing the score picks:
//!
//! - **relational** — one physical table `payload_<id>` per document,
//!   created inside the insert transaction (SQLite DDL is transactional).
//!   A top-level array fans out into one row per element; anything else
//!   is a single row.
//! - **document** — one row in the shared `doc_payload` collection,
//!   carrying the structure verbatim plus the tenant.
//!
//! The catalog row is written last, in its own transaction together with
//! the tenant usage charge. The payload store and the catalog are *not*
//! coordinated transactionally: if the payload lands and the catalog
//! write fails, the payload is an orphan and the reconciler sweeps it.
//!
//! Document ids are content-addressed:
//! `doc_<UTC timestamp>_<first 12 hex of sha256(canonical form)>` where
//! the canonical form is UTF-8 JSON with object keys sorted.

use chrono::Utc;
use serde_json::Value;
use sqlx::Row;
use tokio_util::sync::CancellationToken;

use crate::analyzer::{self, Routing};
use crate::app::{ensure_live, Depot};
use crate::catalog;
use crate::error::{DepotError, Result};
use crate::models::{Backing, CatalogJson};
use crate::tenant::Scope;

/// Serialize a tree to its canonical byte form: compact, keys sorted.
pub fn canonical_json(v: &Value) -> String {
    let mut out = String::new();
    write_canonical(v, &mut out);
    out
}

fn write_canonical(v: &Value, out: &mut String) {
    match v {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&Value::String(s.clone()).to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}

fn doc_id(canonical: &str, now: chrono::DateTime<Utc>) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("doc_{}_{}", now.format("%Y%m%d%H%M%S"), &hash[..12])
}

fn payload_table(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("payload_{}", safe)
}

/// Route and persist one JSON document.
pub async fn ingest_json(
    app: &Depot,
    tenant: &str,
    tree: Value,
    tags: Vec<String>,
    cancel: &CancellationToken,
) -> Result<(CatalogJson, Routing)> {
    let metrics = analyzer::analyze(&tree);
    let routing = analyzer::route(&metrics);

    let canonical = canonical_json(&tree);
    let size_bytes = canonical.len() as i64;
    let now = Utc::now();
    let id = doc_id(&canonical, now);

    let token = app.guard.admit(tenant, size_bytes).await?;

    ensure_live(cancel)?;
    let store_result = match routing.backing {
        Backing::Relational => store_relational(app, &id, tenant, &tree, now.timestamp()).await,
        Backing::Document => store_document(app, &id, tenant, &tree, &tags, now.timestamp()).await,
    };
    if let Err(e) = store_result {
        app.guard.release(token);
        return Err(e);
    }

    // The metrics blob also records the fan-out shape so retrieval can
    // reassemble relational rows faithfully.
    let metrics_json = serde_json::json!({
        "metrics": metrics,
        "root_array": tree.is_array(),
        "reasons": routing.reasons,
    })
    .to_string();

    let row = CatalogJson {
        id: id.clone(),
        tenant: tenant.to_string(),
        backing: routing.backing,
        confidence: routing.confidence,
        size_bytes,
        metrics_json,
        tags,
        created_at: now.timestamp(),
        orphaned: false,
    };

    // Catalog commit with the quota re-check; payload left for the
    // reconciler if this fails.
    let _tenant_lock = app.guard.tenant_lock(tenant).await;
    let mut tx = app.pool.begin().await?;
    catalog::insert_json_tx(&mut tx, &row).await?;
    app.guard.commit_in_tx(token, size_bytes, &mut tx).await?;
    tx.commit().await?;

    tracing::info!(
        tenant,
        id = %row.id,
        backing = row.backing.as_str(),
        confidence = row.confidence,
        "json committed"
    );
    Ok((row, routing))
}

async fn store_relational(
    app: &Depot,
    id: &str,
    tenant: &str,
    tree: &Value,
    created_at: i64,
) -> Result<()> {
    let table = payload_table(id);
    let mut tx = app.pool.begin().await?;

    sqlx::query(&format!(
        "CREATE TABLE {} (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            body TEXT NOT NULL
        )",
        table
    ))
    .execute(&mut *tx)
    .await?;
    sqlx::query(&format!("CREATE INDEX {}_tenant_idx ON {} (tenant)", table, table))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("CREATE INDEX {}_body_idx ON {} (body)", table, table))
        .execute(&mut *tx)
        .await?;

    let insert = format!(
        "INSERT INTO {} (tenant, created_at, body) VALUES (?, ?, ?)",
        table
    );
    match tree {
        Value::Array(items) => {
            for item in items {
                sqlx::query(&insert)
                    .bind(tenant)
                    .bind(created_at)
                    .bind(item.to_string())
                    .execute(&mut *tx)
                    .await?;
            }
        }
        other => {
            sqlx::query(&insert)
                .bind(tenant)
                .bind(created_at)
                .bind(other.to_string())
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

async fn store_document(
    app: &Depot,
    id: &str,
    tenant: &str,
    tree: &Value,
    tags: &[String],
    created_at: i64,
) -> Result<()> {
    let tags_json = serde_json::to_string(tags)
        .map_err(|e| DepotError::Internal(format!("tags serialization: {}", e)))?;
    sqlx::query(
        "INSERT OR REPLACE INTO doc_payload (id, tenant, body, tags, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(tenant)
    .bind(tree.to_string())
    .bind(tags_json)
    .bind(created_at)
    .execute(&app.pool)
    .await?;
    Ok(())
}

/// Fetch a routed document's catalog row and reassembled tree.
pub async fn fetch_json(app: &Depot, tenant: &str, id: &str) -> Result<(CatalogJson, Value)> {
    let scope = app.guard.scope(tenant).await?;
    let row = catalog::get_json(&app.pool, scope, id).await?;

    let tree = match row.backing {
        Backing::Relational => fetch_relational(app, &row).await?,
        Backing::Document => fetch_document(app, scope, id).await?,
    };
    Ok((row, tree))
}

async fn fetch_relational(app: &Depot, row: &CatalogJson) -> Result<Value> {
    let table = payload_table(&row.id);
    let rows = sqlx::query(&format!("SELECT body FROM {} ORDER BY row_id", table))
        .fetch_all(&app.pool)
        .await
        .map_err(|_| DepotError::NotFound(format!("payload table for {}", row.id)))?;

    let mut values = Vec::with_capacity(rows.len());
    for r in &rows {
        let body: String = r.get("body");
        values.push(serde_json::from_str(&body)?);
    }

    let root_array = serde_json::from_str::<serde_json::Value>(&row.metrics_json)
        .ok()
        .and_then(|m| m.get("root_array").and_then(|b| b.as_bool()))
        .unwrap_or(values.len() != 1);

    if root_array {
        Ok(Value::Array(values))
    } else {
        values
            .into_iter()
            .next()
            .ok_or_else(|| DepotError::Internal(format!("empty payload table for {}", row.id)))
    }
}

async fn fetch_document(app: &Depot, scope: Scope<'_>, id: &str) -> Result<Value> {
    let row = sqlx::query("SELECT body FROM doc_payload WHERE id = ? AND tenant = ?")
        .bind(id)
        .bind(scope.tenant)
        .fetch_optional(&app.pool)
        .await?
        .ok_or_else(|| DepotError::NotFound(format!("document payload: {}", id)))?;
    let body: String = row.get("body");
    Ok(serde_json::from_str(&body)?)
}

/// Tenant-scoped delete of a routed document: catalog row, payload, and
/// the usage charge. Deleting an unknown id is `NotFound`.
pub async fn delete_json(app: &Depot, tenant: &str, id: &str) -> Result<()> {
    let scope = app.guard.scope(tenant).await?;
    let row = catalog::get_json(&app.pool, scope, id).await?;

    let mut tx = app.pool.begin().await?;
    let deleted = catalog::delete_json_row_tx(&mut tx, scope, id).await?;
    if deleted == 0 {
        return Err(DepotError::NotFound(format!("document: {}", id)));
    }
    tx.commit().await?;

    match row.backing {
        Backing::Relational => {
            let table = payload_table(id);
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&app.pool)
                .await?;
        }
        Backing::Document => {
            sqlx::query("DELETE FROM doc_payload WHERE id = ? AND tenant = ?")
                .bind(id)
                .bind(scope.tenant)
                .execute(&app.pool)
                .await?;
        }
    }

    app.guard.refund(tenant, row.size_bytes).await?;
    tracing::info!(tenant, id, "json deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_sorts_keys_recursively() {
        let v = json!({"b": 1, "a": {"z": true, "m": [3, 1]}});
        assert_eq!(canonical_json(&v), r#"{"a":{"m":[3,1],"z":true},"b":1}"#);
    }

    #[test]
    fn test_canonical_is_stable_across_key_order() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":2,"x":1}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn test_canonical_escapes_strings() {
        let v = json!({"k": "line\nbreak \"quoted\""});
        let s = canonical_json(&v);
        assert!(s.contains(r#"\n"#));
        assert!(s.contains(r#"\""#));
    }

    #[test]
    fn test_doc_id_shape() {
        let now = chrono::Utc::now();
        let id = doc_id("{\"a\":1}", now);
        assert!(id.starts_with("doc_"));
        let hex = id.rsplit('_').next().unwrap();
        assert_eq!(hex.len(), 12);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_content_same_hash_suffix() {
        let now = chrono::Utc::now();
        let a = doc_id("{\"a\":1}", now);
        let b = doc_id("{\"a\":1}", now);
        assert_eq!(a, b);
    }

    #[test]
    fn test_payload_table_sanitizes() {
        assert_eq!(
            payload_table("doc_20240101_ab12cd34ef56"),
            "payload_doc_20240101_ab12cd34ef56"
        );
        assert_eq!(payload_table("weird-id;drop"), "payload_weird_id_drop");
    }
}
