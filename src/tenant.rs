//! Tenant isolation and quota accounting.
//!
//! Every write path goes through [`TenantGuard::admit`] before touching
//! storage and [`TenantGuard::commit_in_tx`] when the catalog row is
//! written, so the `used_bytes <= quota_bytes` invariant holds at every
//! successful commit. Quota is checked on admission *and* re-verified
//! inside the commit transaction: two writers admitted concurrently
//! cannot jointly exceed the quota, the second one fails at commit.
//!
//! Usage mutation happens under a per-tenant async mutex; reads are
//! lock-free best-effort. Read paths only need [`TenantGuard::scope`],
//! which yields the predicate value injected into catalog queries.

use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{DepotError, Result};
use crate::models::Tenant;

/// Capability returned by admission; required to commit or release.
#[derive(Debug)]
pub struct AdmitToken {
    pub tenant: String,
    pub expected_bytes: i64,
}

/// Tenant predicate for read paths. Catalog queries take this instead of
/// a raw string so a query can't accidentally skip scoping.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub tenant: &'a str,
}

/// Per-tenant quota guard over the shared pool.
pub struct TenantGuard {
    pool: SqlitePool,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TenantGuard {
    pub fn new(pool: SqlitePool) -> TenantGuard {
        TenantGuard {
            pool,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a tenant. Fails with `Validation` if the id already exists.
    pub async fn create_tenant(&self, id: &str, quota_bytes: i64) -> Result<Tenant> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(DepotError::Validation(format!(
                "tenant id must be non-empty alphanumeric/-/_: {:?}",
                id
            )));
        }
        let now = chrono::Utc::now().timestamp();
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO tenants (id, quota_bytes, used_bytes, active, created_at)
             VALUES (?, ?, 0, 1, ?)",
        )
        .bind(id)
        .bind(quota_bytes)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(DepotError::Validation(format!("tenant already exists: {}", id)));
        }

        Ok(Tenant {
            id: id.to_string(),
            quota_bytes,
            used_bytes: 0,
            active: true,
            created_at: now,
        })
    }

    pub async fn get_tenant(&self, id: &str) -> Result<Tenant> {
        use sqlx::Row;
        let row = sqlx::query(
            "SELECT id, quota_bytes, used_bytes, active, created_at FROM tenants WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DepotError::NotFound(format!("tenant: {}", id)))?;

        Ok(Tenant {
            id: row.get("id"),
            quota_bytes: row.get("quota_bytes"),
            used_bytes: row.get("used_bytes"),
            active: row.get::<i64, _>("active") != 0,
            created_at: row.get("created_at"),
        })
    }

    pub async fn set_quota(&self, id: &str, quota_bytes: i64) -> Result<()> {
        let updated = sqlx::query("UPDATE tenants SET quota_bytes = ? WHERE id = ?")
            .bind(quota_bytes)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(DepotError::NotFound(format!("tenant: {}", id)));
        }
        Ok(())
    }

    pub async fn set_active(&self, id: &str, active: bool) -> Result<()> {
        let updated = sqlx::query("UPDATE tenants SET active = ? WHERE id = ?")
            .bind(active as i64)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(DepotError::NotFound(format!("tenant: {}", id)));
        }
        Ok(())
    }

    /// Read-path predicate. Verifies the tenant exists and is active.
    pub async fn scope<'a>(&self, tenant: &'a str) -> Result<Scope<'a>> {
        let t = self.get_tenant(tenant).await?;
        if !t.active {
            return Err(DepotError::Forbidden(format!("tenant is inactive: {}", tenant)));
        }
        Ok(Scope { tenant })
    }

    /// Admit a write of approximately `expected_bytes`.
    ///
    /// Rejects inactive tenants and writes that would already exceed the
    /// quota at admission time. The returned token must be passed to
    /// [`commit_in_tx`](Self::commit_in_tx) or [`release`](Self::release).
    pub async fn admit(&self, tenant: &str, expected_bytes: i64) -> Result<AdmitToken> {
        let t = self.get_tenant(tenant).await?;
        if !t.active {
            return Err(DepotError::Forbidden(format!("tenant is inactive: {}", tenant)));
        }
        if t.used_bytes + expected_bytes > t.quota_bytes {
            return Err(DepotError::QuotaExceeded(format!(
                "tenant {} usage {} + {} exceeds quota {}",
                tenant, t.used_bytes, expected_bytes, t.quota_bytes
            )));
        }
        Ok(AdmitToken {
            tenant: tenant.to_string(),
            expected_bytes,
        })
    }

    /// Current usage, read without locking.
    pub async fn usage(&self, tenant: &str) -> Result<(i64, i64)> {
        let t = self.get_tenant(tenant).await?;
        Ok((t.used_bytes, t.quota_bytes))
    }

    /// The per-tenant mutex serializing usage mutation. Hold the guard
    /// across the commit transaction.
    pub async fn tenant_lock(&self, tenant: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(tenant.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Charge `actual_bytes` against the tenant inside the caller's
    /// transaction, re-verifying the quota. The caller must hold
    /// [`tenant_lock`](Self::tenant_lock) and commit the transaction for
    /// the charge to take effect.
    pub async fn commit_in_tx(
        &self,
        token: AdmitToken,
        actual_bytes: i64,
        tx: &mut Transaction<'_, Sqlite>,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE tenants SET used_bytes = used_bytes + ?
             WHERE id = ? AND active = 1 AND used_bytes + ? <= quota_bytes",
        )
        .bind(actual_bytes)
        .bind(&token.tenant)
        .bind(actual_bytes)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(DepotError::QuotaExceeded(format!(
                "tenant {} quota re-check failed at commit for {} bytes",
                token.tenant, actual_bytes
            )));
        }
        Ok(())
    }

    /// Release an admit token without committing. Admission does not
    /// reserve bytes, so this only closes the token's lifecycle.
    pub fn release(&self, token: AdmitToken) {
        tracing::debug!(
            tenant = %token.tenant,
            expected = token.expected_bytes,
            "admit token released without commit"
        );
    }

    /// Return freed bytes after a delete. Usage never drops below zero.
    pub async fn refund(&self, tenant: &str, bytes: i64) -> Result<()> {
        let _lock = self.tenant_lock(tenant).await;
        sqlx::query("UPDATE tenants SET used_bytes = MAX(0, used_bytes - ?) WHERE id = ?")
            .bind(bytes)
            .bind(tenant)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// List all tenants, newest first.
    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        use sqlx::Row;
        let rows = sqlx::query(
            "SELECT id, quota_bytes, used_bytes, active, created_at
             FROM tenants ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Tenant {
                id: row.get("id"),
                quota_bytes: row.get("quota_bytes"),
                used_bytes: row.get("used_bytes"),
                active: row.get::<i64, _>("active") != 0,
                created_at: row.get("created_at"),
            })
            .collect())
    }
}
