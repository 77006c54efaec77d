//! Retrieval composer: routes queries through the prefix index and the
//! vector index and merges the results.
//!
//! - `prefix` mode (or any query under 3 chars) answers from the token
//!   index alone: exact postings for each query token plus autocomplete
//!   on the query tail.
//! - `semantic` mode embeds the query and runs nearest-neighbour search.
//! - `hybrid` runs both and deduplicates by source file, semantic hits
//!   ranked first.
//!
//! Every call appends to the query log from a spawned task; a logging
//! failure is a warning, never a failed query.

use serde::Deserialize;

use crate::app::Depot;
use crate::catalog;
use crate::error::{DepotError, Result};
use crate::models::{SearchMode, SearchResponse, TokenHit};
use crate::vectors::{self, KnnFilter};

/// Options for one search call.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub top_k: usize,
    /// Restrict chunk hits to these categories.
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

impl SearchOptions {
    pub fn semantic(top_k: usize) -> SearchOptions {
        SearchOptions {
            mode: SearchMode::Semantic,
            top_k,
            categories: None,
        }
    }
}

/// Run one search for a tenant.
pub async fn search(
    app: &Depot,
    tenant: &str,
    query: &str,
    opts: &SearchOptions,
) -> Result<SearchResponse> {
    app.guard.scope(tenant).await?;

    let query = query.trim();
    if query.is_empty() {
        return Err(DepotError::Validation("query must not be empty".to_string()));
    }
    let top_k = opts.top_k.max(1);

    // Short queries cannot embed meaningfully; they degrade to prefix.
    let effective_mode = if opts.mode == SearchMode::Prefix || query.chars().count() < 3 {
        SearchMode::Prefix
    } else {
        opts.mode
    };

    let mut query_embedding: Option<Vec<f32>> = None;
    let response = match effective_mode {
        SearchMode::Prefix => SearchResponse {
            mode: SearchMode::Prefix,
            chunk_hits: Vec::new(),
            token_hits: prefix_hits(app, query, top_k),
        },
        SearchMode::Semantic => {
            let vector = app.gateway.embed(query).await?;
            let hits = vectors::knn(
                &app.pool,
                tenant,
                &vector,
                top_k,
                &KnnFilter {
                    categories: opts.categories.clone(),
                    source_ids: None,
                },
            )
            .await?;
            query_embedding = Some(vector);
            SearchResponse {
                mode: SearchMode::Semantic,
                chunk_hits: hits,
                token_hits: Vec::new(),
            }
        }
        SearchMode::Hybrid => {
            let vector = app.gateway.embed(query).await?;
            let chunk_hits = vectors::knn(
                &app.pool,
                tenant,
                &vector,
                top_k,
                &KnnFilter {
                    categories: opts.categories.clone(),
                    source_ids: None,
                },
            )
            .await?;
            query_embedding = Some(vector);

            // Dedup by source: a file already surfaced semantically does
            // not reappear through its tokens.
            let covered: std::collections::HashSet<&str> = chunk_hits
                .iter()
                .map(|h| h.source_file_id.as_str())
                .collect();
            let token_hits = prefix_hits(app, query, top_k)
                .into_iter()
                .filter_map(|mut hit| {
                    hit.files.retain(|f| !covered.contains(f.as_str()));
                    if hit.files.is_empty() {
                        None
                    } else {
                        Some(hit)
                    }
                })
                .collect();

            SearchResponse {
                mode: SearchMode::Hybrid,
                chunk_hits,
                token_hits,
            }
        }
    };

    log_query_async(app, tenant, query, query_embedding, response.result_count() as i64);
    Ok(response)
}

/// Token-level hits: exact postings for each query token, then
/// autocomplete suggestions on the (single-token) query.
fn prefix_hits(app: &Depot, query: &str, k: usize) -> Vec<TokenHit> {
    let index = app
        .token_index
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let mut hits: Vec<TokenHit> = Vec::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

    let mut tokens: Vec<String> = index.tokenize(query).into_iter().collect();
    tokens.sort();
    for token in &tokens {
        let files = index.exact(token);
        if !files.is_empty() && seen.insert(token.clone()) {
            hits.push(TokenHit {
                token: token.clone(),
                frequency: files.len() as u64,
                files,
            });
        }
    }

    // Complete the trailing word of the query.
    if let Some(tail) = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .next_back()
    {
        for (token, frequency) in
            index.autocomplete(&tail.to_lowercase(), app.config.retrieval.autocomplete_k)
        {
            if seen.insert(token.clone()) {
                hits.push(TokenHit {
                    files: index.postings(&token),
                    token,
                    frequency,
                });
            }
        }
    }

    // Typo tolerance: only when nothing matched directly.
    if hits.is_empty() {
        for token in &tokens {
            for candidate in index.fuzzy(token, app.config.retrieval.fuzzy_max_edits) {
                if seen.insert(candidate.clone()) {
                    let files = index.postings(&candidate);
                    hits.push(TokenHit {
                        token: candidate,
                        frequency: files.len() as u64,
                        files,
                    });
                }
            }
        }
    }

    hits.truncate(k);
    hits
}

fn log_query_async(
    app: &Depot,
    tenant: &str,
    query: &str,
    embedding: Option<Vec<f32>>,
    result_count: i64,
) {
    let pool = app.pool.clone();
    let tenant = tenant.to_string();
    let query = query.to_string();
    tokio::spawn(async move {
        if let Err(e) =
            catalog::log_query(&pool, &tenant, &query, embedding.as_deref(), result_count).await
        {
            tracing::warn!(tenant = %tenant, error = %e, "query log write failed");
        }
    });
}
