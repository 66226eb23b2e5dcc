//! index-attest binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};

use index_attest::store::{ChecksumRepository, SourceIndex, SqliteChecksumRepo};
use index_attest::{
    rpc, telemetry, AttestConfig, AttestationApi, Attestor, ConfigOverrides, EpochRange,
};

/// Publish and query chunk checksums over a message index
#[derive(Parser, Debug)]
#[command(name = "index-attest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "INDEX_ATTEST_CONFIG")]
    config: Option<PathBuf>,

    /// Default log filter (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Append logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Directory containing msgindex.db
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,

    /// Directory containing checksums.db
    #[arg(long, global = true)]
    repo_dir: Option<PathBuf>,

    /// Epochs per chunk
    #[arg(long, global = true)]
    chunk_size: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the checksum pipeline and RPC server until interrupted
    Run,

    /// Print gaps in the source index or the repository
    Gaps {
        /// Scan the source index (per epoch)
        #[arg(long, conflicts_with = "repo", required_unless_present = "repo")]
        source: bool,

        /// Scan the repository (per chunk)
        #[arg(long)]
        repo: bool,

        #[arg(long)]
        start: u64,

        #[arg(long)]
        stop: u64,
    },

    /// Compute the checksum of a range
    Checksum {
        #[arg(long)]
        start: u64,

        #[arg(long)]
        stop: u64,

        /// Also publish the result, replacing any existing record
        #[arg(long)]
        publish: bool,
    },

    /// Print the checksum published for a range
    Lookup {
        #[arg(long)]
        start: u64,

        #[arg(long)]
        stop: u64,
    },

    /// Check whether a checksum has been published
    Exists {
        /// Hex-encoded hash
        hash: String,
    },

    /// List published checksums
    List {
        #[arg(long, default_value_t = 0)]
        start: u64,

        #[arg(long)]
        stop: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        log_level: cli.log_level.clone(),
        log_file: cli.log_file.clone(),
        source_dir: cli.source_dir.clone(),
        repo_dir: cli.repo_dir.clone(),
        chunk_size: cli.chunk_size,
    };
    let config = AttestConfig::load(cli.config.as_deref(), &overrides)
        .context("failed to load configuration")?;

    telemetry::init(&config.log)?;
    tracing::info!("index-attest v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run => run_service(config).await,
        Commands::Gaps {
            source,
            repo: _,
            start,
            stop,
        } => print_gaps(&config, source, EpochRange::new(start, stop)?).await,
        Commands::Checksum {
            start,
            stop,
            publish,
        } => checksum(&config, EpochRange::new(start, stop)?, publish).await,
        Commands::Lookup { start, stop } => {
            let api = AttestationApi::new(Arc::new(open_repo(&config)?));
            let hash = api.get_checksum(start, stop).await?;
            if hash.is_empty() {
                println!("no checksum published for [{}, {}]", start, stop);
            } else {
                println!("{}", hash);
            }
            Ok(())
        }
        Commands::Exists { hash } => {
            let api = AttestationApi::new(Arc::new(open_repo(&config)?));
            println!("{}", api.checksum_exists(&hash).await?);
            Ok(())
        }
        Commands::List { start, stop } => {
            let repo = open_repo(&config)?;
            let stop = match stop {
                Some(stop) => stop,
                None => match repo.last_published_stop().await? {
                    Some(stop) => stop,
                    None => return Ok(()),
                },
            };
            if stop < start {
                return Ok(());
            }
            for record in repo.records_in(EpochRange::new(start, stop)?).await? {
                println!("{}\t{}\t{}", record.start(), record.stop(), record.hash);
            }
            Ok(())
        }
    }
}

fn open_repo(config: &AttestConfig) -> Result<SqliteChecksumRepo> {
    let path = config.repo_path()?;
    SqliteChecksumRepo::open(&path, config.checksum.chunk_size)
        .with_context(|| format!("failed to open checksum repository {}", path.display()))
}

async fn run_service(config: AttestConfig) -> Result<()> {
    config.validate()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let attestor = if config.checksum.enabled {
        let attestor = Attestor::open(&config).context("failed to open stores")?;
        attestor.startup_gap_check().await?;
        Some(attestor)
    } else {
        tracing::info!("checksum pipeline disabled");
        None
    };

    // Bind before anything is spawned so a bad address stops startup.
    let server_setup = if config.server.enabled {
        let repo: Arc<dyn ChecksumRepository> = match &attestor {
            Some(attestor) => attestor.repo().clone() as Arc<dyn ChecksumRepository>,
            None => Arc::new(open_repo(&config)?) as Arc<dyn ChecksumRepository>,
        };
        let addr = config.server.bind_addr();
        let listener = rpc::bind(&addr)
            .await
            .with_context(|| format!("failed to bind rpc server on {}", addr))?;
        Some((AttestationApi::new(repo), listener))
    } else {
        None
    };

    if attestor.is_none() && server_setup.is_none() {
        tracing::warn!("neither the checksum pipeline nor the RPC server is enabled");
        return Ok(());
    }

    let mut pipeline = attestor.map(|attestor| {
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { attestor.run(rx).await })
    });
    let mut server = server_setup.map(|(api, listener)| {
        tokio::spawn(rpc::serve_on(api, listener, shutdown_rx.clone()))
    });

    let mut pipeline_done = None;
    let mut server_done = None;
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
        }
        joined = join_task(pipeline.as_mut()) => pipeline_done = Some(joined),
        joined = join_task(server.as_mut()) => {
            if let Ok(Err(e)) = &joined {
                tracing::error!(error = %e, "rpc server stopped");
            }
            server_done = Some(joined);
        }
    }

    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);

    let server_result = match (server_done, server) {
        (Some(joined), _) => Some(joined),
        (None, Some(handle)) => Some(handle.await),
        (None, None) => None,
    };
    let pipeline_result = match (pipeline_done, pipeline) {
        (Some(joined), _) => Some(joined),
        (None, Some(handle)) => Some(handle.await),
        (None, None) => None,
    };

    if let Some(joined) = server_result {
        joined
            .context("rpc server task panicked")?
            .context("rpc server failed")?;
    }
    if let Some(joined) = pipeline_result {
        joined.context("checksum pipeline task panicked")??;
    }
    Ok(())
}

/// Await a spawned task, or never resolve when there is none.
async fn join_task<T>(handle: Option<&mut JoinHandle<T>>) -> std::result::Result<T, JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn print_gaps(config: &AttestConfig, source: bool, range: EpochRange) -> Result<()> {
    let gaps = if source {
        let index = SourceIndex::open(config.source_path()?).context("failed to open source index")?;
        index.find_gaps(range).await?
    } else {
        open_repo(config)?.find_gaps(range).await?
    };

    if gaps.is_empty() {
        println!("no gaps in {}", range);
    }
    for gap in gaps {
        println!("{}\t{}", gap.start, gap.stop);
    }
    Ok(())
}

async fn checksum(config: &AttestConfig, range: EpochRange, publish: bool) -> Result<()> {
    let attestor = Attestor::open(config).context("failed to open stores")?;

    if publish {
        let (record, outcome) = attestor.republish(range).await?;
        println!("{}\t{:?}", record, outcome);
    } else {
        let digest = attestor.checksum_range(range).await?;
        println!("{}\t{} messages", digest.hash, digest.message_count);
    }
    Ok(())
}
