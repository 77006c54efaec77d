//! Shared application state.
//!
//! [`Depot`] owns everything the pipelines share: the connection pool, the
//! immutable taxonomy, the tenant guard, the embedding gateway, the token
//! index, and the per-source reindex locks. It is constructed once at
//! startup and borrowed by every operation — there is no process-global
//! mutable state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::catalog;
use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingGateway};
use crate::error::{DepotError, Result};
use crate::migrate;
use crate::taxonomy::Taxonomy;
use crate::tenant::TenantGuard;
use crate::trie::TokenIndex;

pub struct Depot {
    pub config: Config,
    pub pool: sqlx::SqlitePool,
    pub taxonomy: Arc<Taxonomy>,
    pub guard: TenantGuard,
    pub gateway: Box<dyn EmbeddingGateway>,
    /// Single-writer, many-reader token index; writes happen only after
    /// chunk transactions commit.
    pub token_index: RwLock<TokenIndex>,
    reindex_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Depot {
    /// Open the depot with the gateway named by the configuration.
    pub async fn open(config: Config) -> Result<Depot> {
        let gateway = embedding::create_gateway(&config.embedding)?;
        Depot::open_with_gateway(config, gateway).await
    }

    /// Open the depot with an explicit gateway (dependency injection for
    /// tests and alternative deployments).
    pub async fn open_with_gateway(
        config: Config,
        gateway: Box<dyn EmbeddingGateway>,
    ) -> Result<Depot> {
        std::fs::create_dir_all(&config.storage.root)?;

        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;

        let taxonomy = match &config.taxonomy.path {
            Some(path) => Taxonomy::load(path)?,
            None => Taxonomy::builtin(),
        };

        let guard = TenantGuard::new(pool.clone());

        // The token index is a cache over the chunk table; rebuild it.
        let mut index = TokenIndex::with_stop_words(&config.retrieval.stop_words);
        for (source_id, text) in catalog::all_chunk_texts(&pool).await? {
            index.index_text(&source_id, &text);
        }
        tracing::debug!(tokens = index.len(), "token index rebuilt from catalog");

        Ok(Depot {
            config,
            pool,
            taxonomy: Arc::new(taxonomy),
            guard,
            gateway,
            token_index: RwLock::new(index),
            reindex_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Advisory lock serializing reindex per source file. A concurrent
    /// caller for the same source waits here and then re-runs over the
    /// committed state.
    pub async fn reindex_lock(&self, source_file_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.reindex_locks.lock().await;
            locks
                .entry(source_file_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Abort with `Cancelled` when the caller's signal has fired. Checked
/// before every suspension point on the write paths.
pub fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(DepotError::Cancelled)
    } else {
        Ok(())
    }
}
