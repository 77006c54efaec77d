//! # Depot CLI
//!
//! The `depot` binary drives the artifact depot: schema setup, tenant
//! administration, ingest, retrieval, indexing, reconciliation, and the
//! HTTP server.
//!
//! ```bash
//! depot --config ./config/depot.toml init
//! depot --config ./config/depot.toml tenant add acme --quota 1073741824
//! depot --config ./config/depot.toml ingest file acme ./notes.md
//! depot --config ./config/depot.toml ingest json acme ./payload.json --tag invoices
//! depot --config ./config/depot.toml reindex acme <file-id>
//! depot --config ./config/depot.toml search acme "deep learning" --mode semantic
//! depot --config ./config/depot.toml serve
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use depot::app::Depot;
use depot::config;
use depot::embedding;
use depot::error::DepotError;
use depot::media;
use depot::models::SearchMode;
use depot::reconcile;
use depot::reindex;
use depot::retrieval::{self, SearchOptions};
use depot::router;
use depot::server;

/// Depot — a multi-tenant artifact depot with smart placement and
/// semantic retrieval.
#[derive(Parser)]
#[command(
    name = "depot",
    about = "Multi-tenant artifact depot: classified media, shape-routed JSON, semantic search",
    version
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/depot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and storage directories.
    ///
    /// Idempotent — safe to run repeatedly.
    Init,

    /// Tenant administration.
    Tenant {
        #[command(subcommand)]
        action: TenantAction,
    },

    /// Ingest an artifact.
    Ingest {
        #[command(subcommand)]
        what: IngestWhat,
    },

    /// Chunk and embed a stored file for retrieval.
    Reindex {
        /// Owning tenant.
        tenant: String,
        /// Catalog file id.
        id: String,
    },

    /// Search indexed content.
    Search {
        /// Owning tenant.
        tenant: String,
        /// Query text.
        query: String,
        /// Retrieval mode: prefix, semantic, or hybrid.
        #[arg(long, default_value = "hybrid")]
        mode: String,
        /// Maximum results.
        #[arg(long)]
        top_k: Option<usize>,
        /// Restrict to a category.
        #[arg(long)]
        category: Option<String>,
    },

    /// Print a stored artifact (catalog row, document body).
    Get {
        tenant: String,
        id: String,
    },

    /// Delete an artifact (file or document) and everything derived.
    Delete {
        tenant: String,
        id: String,
    },

    /// List a tenant's stored artifacts, newest first.
    List {
        tenant: String,
        /// Restrict files to a category.
        #[arg(long)]
        category: Option<String>,
        /// Maximum rows per artifact kind.
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Sweep orphaned payloads and flag hollow catalog rows.
    Reconcile,

    /// Per-category file statistics for a tenant.
    Stats {
        tenant: String,
    },

    /// List the classification taxonomy.
    Categories,

    /// Start the HTTP server.
    Serve,
}

#[derive(Subcommand)]
enum TenantAction {
    /// Create a tenant.
    Add {
        id: String,
        /// Quota in bytes; defaults to tenants.default_quota_bytes.
        #[arg(long)]
        quota: Option<i64>,
    },
    /// Change a tenant's quota.
    Quota { id: String, quota: i64 },
    /// Deactivate a tenant (rejected at admission).
    Suspend { id: String },
    /// Reactivate a tenant.
    Activate { id: String },
    /// List tenants with usage.
    List,
}

#[derive(Subcommand)]
enum IngestWhat {
    /// Ingest a binary file from disk.
    File {
        tenant: String,
        path: PathBuf,
        /// Declared MIME type.
        #[arg(long)]
        mime: Option<String>,
        /// Free-text comment stored on the catalog row.
        #[arg(long)]
        comment: Option<String>,
    },
    /// Ingest a JSON document from disk.
    Json {
        tenant: String,
        path: PathBuf,
        /// Tags for the document (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

fn setup_logger() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logger();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let depot = Arc::new(Depot::open(cfg).await?);

    // Ctrl-C flips the cancellation signal; write paths abort and clean
    // up at their next suspension point.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Init => {
            // Depot::open already ran the idempotent migrations.
            println!("Database initialized successfully.");
        }

        Commands::Tenant { action } => match action {
            TenantAction::Add { id, quota } => {
                let quota = quota.unwrap_or(depot.config.tenants.default_quota_bytes);
                let tenant = depot.guard.create_tenant(&id, quota).await?;
                println!("tenant {} created, quota {} bytes", tenant.id, tenant.quota_bytes);
            }
            TenantAction::Quota { id, quota } => {
                depot.guard.set_quota(&id, quota).await?;
                println!("tenant {} quota set to {} bytes", id, quota);
            }
            TenantAction::Suspend { id } => {
                depot.guard.set_active(&id, false).await?;
                println!("tenant {} suspended", id);
            }
            TenantAction::Activate { id } => {
                depot.guard.set_active(&id, true).await?;
                println!("tenant {} activated", id);
            }
            TenantAction::List => {
                for t in depot.guard.list_tenants().await? {
                    println!(
                        "{}  {}/{} bytes  {}",
                        t.id,
                        t.used_bytes,
                        t.quota_bytes,
                        if t.active { "active" } else { "suspended" }
                    );
                }
            }
        },

        Commands::Ingest { what } => match what {
            IngestWhat::File {
                tenant,
                path,
                mime,
                comment,
            } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .context("path has no file name")?;
                let file = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("cannot open {}", path.display()))?;
                let size = file.metadata().await.ok().map(|m| m.len() as i64);

                let row = media::ingest_media(
                    &depot,
                    &tenant,
                    file,
                    &name,
                    mime.as_deref(),
                    comment.as_deref(),
                    size,
                    &cancel,
                )
                .await?;
                println!("stored {} as {} ({})", name, row.id, row.category);
                println!("  path: {}", row.path);
                println!("  sha256: {}", row.sha256);
                if !row.thumbs.is_empty() {
                    println!("  thumbnails: {}", row.thumbs.len());
                }
            }
            IngestWhat::Json { tenant, path, tags } => {
                let raw = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("cannot read {}", path.display()))?;
                let tree: serde_json::Value =
                    serde_json::from_str(&raw).context("input is not valid JSON")?;

                let (row, routing) =
                    router::ingest_json(&depot, &tenant, tree, tags, &cancel).await?;
                println!(
                    "stored {} in {} backing (confidence {:.2})",
                    row.id,
                    row.backing.as_str(),
                    row.confidence
                );
                for reason in &routing.reasons {
                    println!("  - {}", reason);
                }
            }
        },

        Commands::Reindex { tenant, id } => {
            embedding::validate(depot.gateway.as_ref()).await?;
            let chunks = reindex::reindex_file(&depot, &tenant, &id, &cancel).await?;
            println!("indexed {} chunks for {}", chunks, id);
        }

        Commands::Search {
            tenant,
            query,
            mode,
            top_k,
            category,
        } => {
            let mode = SearchMode::parse(&mode)
                .with_context(|| format!("unknown mode: {} (prefix|semantic|hybrid)", mode))?;
            let opts = SearchOptions {
                mode,
                top_k: top_k.unwrap_or(depot.config.retrieval.top_k),
                categories: category.map(|c| vec![c]),
            };
            let response = retrieval::search(&depot, &tenant, &query, &opts).await?;

            if response.chunk_hits.is_empty() && response.token_hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in response.chunk_hits.iter().enumerate() {
                let excerpt: String = hit.text.chars().take(96).collect();
                println!(
                    "{}. [{:.4}] {} #{} ({})",
                    i + 1,
                    hit.distance,
                    hit.source_file_id,
                    hit.ordinal,
                    hit.category
                );
                println!("    \"{}\"", excerpt.replace('\n', " "));
            }
            for hit in &response.token_hits {
                println!("~ {} ({} files)", hit.token, hit.files.len());
            }
        }

        Commands::Get { tenant, id } => {
            // Files and documents share one lookup surface.
            match media::read_media(&depot, &tenant, &id).await {
                Ok((file, bytes)) => {
                    println!("{}", serde_json::to_string_pretty(&file)?);
                    println!("({} bytes on disk)", bytes.len());
                }
                Err(DepotError::NotFound(_)) => {
                    let (row, data) = router::fetch_json(&depot, &tenant, &id).await?;
                    println!("{}", serde_json::to_string_pretty(&row)?);
                    println!("{}", serde_json::to_string_pretty(&data)?);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Delete { tenant, id } => {
            match media::delete_media(&depot, &tenant, &id).await {
                Ok(()) => println!("deleted file {}", id),
                Err(DepotError::NotFound(_)) => {
                    router::delete_json(&depot, &tenant, &id).await?;
                    println!("deleted document {}", id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::List {
            tenant,
            category,
            limit,
        } => {
            let scope = depot.guard.scope(&tenant).await?;
            let files =
                depot::catalog::list_files(&depot.pool, scope, category.as_deref(), limit).await?;
            for f in &files {
                println!("{}  {:12}  {:8} bytes  {}", f.id, f.category, f.size_bytes, f.original_name);
            }
            let docs = depot::catalog::list_json(&depot.pool, scope, None, limit).await?;
            for d in &docs {
                println!(
                    "{}  {:12}  {:8} bytes  conf {:.2}",
                    d.id,
                    d.backing.as_str(),
                    d.size_bytes,
                    d.confidence
                );
            }
            if files.is_empty() && docs.is_empty() {
                println!("nothing stored");
            }
        }

        Commands::Reconcile => {
            let report = reconcile::run_reconciler(&depot).await?;
            println!("reconcile:");
            println!("  payload tables dropped: {}", report.payload_tables_dropped);
            println!("  document payloads deleted: {}", report.doc_payloads_deleted);
            println!("  files flagged orphaned: {}", report.files_flagged);
            println!("  documents flagged orphaned: {}", report.json_flagged);
            println!("  chunks purged: {}", report.chunks_purged);
        }

        Commands::Stats { tenant } => {
            let scope = depot.guard.scope(&tenant).await?;
            let stats = depot::catalog::category_stats(&depot.pool, scope).await?;
            if stats.is_empty() {
                println!("no files stored");
            }
            for (category, count, bytes) in stats {
                println!("{:20} {:6} files {:12} bytes", category, count, bytes);
            }
            let (used, quota) = depot.guard.usage(&tenant).await?;
            println!("usage: {}/{} bytes", used, quota);
        }

        Commands::Categories => {
            for cat in depot.taxonomy.categories() {
                println!(
                    "{:18} {}{}",
                    cat.name,
                    if cat.thumbable { "[thumbable] " } else { "" },
                    cat.description
                );
            }
        }

        Commands::Serve => {
            if depot.config.embedding.is_enabled() {
                // A wrong dimension must be fatal before any write.
                embedding::validate(depot.gateway.as_ref()).await?;
            }
            server::run_server(depot.clone()).await?;
        }
    }

    Ok(())
}
