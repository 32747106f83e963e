mod commands;
mod settings;

use std::{path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    recall_memory::{MemoryManager, SearchOptions, SemanticSearch},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "recall", about = "Tiered memory with cross-tier search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./recall.toml, then ~/.config/recall/).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overriding `memory.db_path`.
    #[arg(long, global = true, env = "RECALL_DB")]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a short-term memory.
    Remember {
        /// Text or JSON content.
        content: String,
        #[arg(long, default_value = "interaction")]
        kind: String,
        /// 0..1; derived from kind and length when omitted.
        #[arg(long)]
        importance: Option<f64>,
        /// JSON object stored alongside the memory.
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Record an episode.
    Episode {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        outcome: Option<String>,
        #[arg(long, default_value = "event")]
        kind: String,
        #[arg(long)]
        importance: Option<f64>,
        #[arg(long, default_value_t = false)]
        success: bool,
    },
    /// Search every tier and print ranked results as JSON.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        stm_limit: Option<usize>,
        #[arg(long)]
        ltm_limit: Option<usize>,
        #[arg(long)]
        episode_limit: Option<usize>,
    },
    /// Search short-term memories created within a time range.
    Range {
        query: String,
        /// Start, as epoch milliseconds or RFC 3339.
        #[arg(long)]
        from: String,
        /// End, as epoch milliseconds or RFC 3339.
        #[arg(long)]
        to: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Promote due short-term memories to long-term.
    Consolidate {
        /// Keep consolidating on the configured interval until Ctrl-C.
        #[arg(long, default_value_t = false)]
        watch: bool,
    },
    /// Delete consolidated short-term memories past retention.
    Prune,
    /// Print memory and search statistics.
    Stats,
    /// Print the effective configuration.
    Config,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "recall starting");

    let config = recall_config::discover_and_load(cli.config.as_deref())?;
    if let Commands::Config = cli.command {
        print!("{}", commands::render_config(&config)?);
        return Ok(());
    }

    let manager = Arc::new(
        MemoryManager::open(settings::memory_config(&config, cli.db.as_deref())).await?,
    );
    let mut search = SemanticSearch::new(Arc::clone(&manager), settings::search_config(&config));
    if let Some(embedder) = settings::build_embedder(&config.embeddings)? {
        search = search.with_embedder(embedder);
    }

    let result = match cli.command {
        Commands::Remember {
            content,
            kind,
            importance,
            metadata,
        } => commands::remember(&manager, &content, &kind, importance, metadata.as_deref()).await,
        Commands::Episode {
            title,
            description,
            outcome,
            kind,
            importance,
            success,
        } => {
            commands::episode(&manager, commands::EpisodeArgs {
                title,
                description,
                outcome,
                kind,
                importance,
                success,
            })
            .await
        },
        Commands::Search {
            query,
            limit,
            stm_limit,
            ltm_limit,
            episode_limit,
        } => {
            commands::search(&search, &query, SearchOptions {
                limit,
                stm_limit,
                ltm_limit,
                episode_limit,
            })
            .await
        },
        Commands::Range {
            query,
            from,
            to,
            limit,
        } => commands::range(&search, &query, &from, &to, limit).await,
        Commands::Consolidate { watch } => commands::consolidate(&manager, watch).await,
        Commands::Prune => commands::prune(&manager).await,
        Commands::Stats => commands::stats(&manager, &search).await,
        Commands::Config => Ok(()),
    };

    if let Err(e) = manager.end_session().await {
        warn!(error = %e, "failed to close memory session");
    }
    result
}
