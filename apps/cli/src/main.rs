//! # storepush CLI
//!
//! Uploads an application package directory to a content store, either the
//! HTTP upload gateway or a mounted file share.
//!
//! ```bash
//! storepush upload ./pkg --target MyApp
//! storepush --backend filesystem --fs-root /mnt/store upload ./pkg --target MyApp
//! storepush probe --endpoint http://localhost:19080
//! ```

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use storepush_store::{FileShareStore, HttpStore, HttpStoreOptions};
use storepush_transfer::StoreGateway;
use storepush_upload::{PipelineConfig, ProgressEvent, UploadPipeline};
use tracing_subscriber::EnvFilter;

use config::{BackendKind, StorePushConfig};

/// Upload application packages to a content store.
#[derive(Parser)]
#[command(name = "storepush", version)]
struct Cli {
    /// Configuration file (JSON). Defaults to `~/.config/storepush/config.json`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gateway base URL, overriding the config file.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Store backend, overriding the config file.
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendKind>,

    /// Mount point for the filesystem backend.
    #[arg(long, global = true)]
    fs_root: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a package directory.
    Upload {
        /// Local directory to upload.
        dir: PathBuf,

        /// Store path the directory is uploaded under.
        #[arg(long)]
        target: String,

        /// Maximum concurrent file uploads.
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Check that the store is reachable.
    Probe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = StorePushConfig::load(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(root) = cli.fs_root {
        config.filesystem_root = Some(root);
    }

    match cli.command {
        Commands::Upload {
            dir,
            target,
            concurrency,
        } => {
            if let Some(concurrency) = concurrency {
                config.max_concurrency = concurrency;
            }
            upload(&config, &dir, &target).await
        }
        Commands::Probe => probe(&config).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn http_store(config: &StorePushConfig) -> anyhow::Result<HttpStore> {
    let options = HttpStoreOptions {
        endpoint: config.endpoint.clone(),
        api_version: config.api_version.clone(),
        timeout: config.request_timeout(),
        breaker: (&config.breaker).into(),
    };
    HttpStore::new(options).context("failed to create gateway client")
}

fn filesystem_root(config: &StorePushConfig) -> anyhow::Result<&Path> {
    match config.filesystem_root.as_deref() {
        Some(root) if root.is_dir() => Ok(root),
        Some(root) => bail!("file share root {} is not a directory", root.display()),
        None => bail!("the filesystem backend needs --fs-root or `filesystem_root` in the config"),
    }
}

fn gateway(config: &StorePushConfig) -> anyhow::Result<Arc<dyn StoreGateway>> {
    let gateway: Arc<dyn StoreGateway> = match config.backend {
        BackendKind::Gateway => Arc::new(http_store(config)?),
        BackendKind::Filesystem => Arc::new(FileShareStore::new(filesystem_root(config)?)),
    };
    Ok(gateway)
}

async fn upload(config: &StorePushConfig, dir: &Path, target: &str) -> anyhow::Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }

    let pipeline = UploadPipeline::new(gateway(config)?).with_config(PipelineConfig {
        max_concurrency: config.max_concurrency,
    });
    let progress = Arc::new(|event: ProgressEvent| {
        println!("[{}/{}] {}", event.completed, event.total, event.file_name);
    });

    let summary = pipeline
        .run(dir, target, progress)
        .await
        .context("failed to upload application package")?;

    println!(
        "uploaded {} files ({} bytes) and {} directory markers to {target}",
        summary.files, summary.bytes, summary.markers
    );
    Ok(())
}

async fn probe(config: &StorePushConfig) -> anyhow::Result<()> {
    match config.backend {
        BackendKind::Gateway => {
            http_store(config)?
                .probe()
                .await
                .with_context(|| format!("gateway {} is not reachable", config.endpoint))?;
            println!("gateway {} is reachable", config.endpoint);
        }
        BackendKind::Filesystem => {
            let root = filesystem_root(config)?;
            println!("file share {} is available", root.display());
        }
    }
    Ok(())
}
