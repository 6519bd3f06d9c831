//! netfirst - command line host for the network-first offline cache.
//!
//! Plays the part of the hosting runtime: it boots the worker against the
//! on-disk stores, dispatches install / activate events, and routes single
//! requests through the interception layer.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netfirst_core::{
    CacheStorage, Config, DiskStorage, Fetcher, HttpFetcher, Interception, Request, Response,
    ResponseSource, SeedReport, Worker,
};
use reqwest::header::{self, HeaderValue};
use reqwest::Method;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

#[derive(Parser)]
#[command(name = "netfirst", version, about = "Network-first offline cache for a single-page app")]
struct Cli {
    /// Config file (defaults to ~/.config/netfirst/config.json)
    #[arg(long, env = "NETFIRST_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Debug logging for netfirst itself
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open the current version's store and seed it with the manifest
    Install,
    /// Delete every store that does not belong to the current version
    Activate,
    /// Send one request through the interception layer
    Fetch {
        url: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Accept header, e.g. "text/html"
        #[arg(long)]
        accept: Option<String>,
        /// Write the body here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List stores and their entries
    Stores,
    /// Print the effective configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = if verbose {
        EnvFilter::new("warn,netfirst=debug,netfirst_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.log_file.as_deref())?;

    // Writing defaults must work even when the existing file is unreadable
    if let Command::Config { init: true } = cli.command {
        return init_config(cli.config.as_deref());
    }

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Install => install(&config).await,
        Command::Activate => activate(&config).await,
        Command::Fetch {
            url,
            method,
            accept,
            output,
        } => fetch(&config, &url, &method, accept.as_deref(), output.as_deref()).await,
        Command::Stores => stores(&config).await,
        Command::Config { .. } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

struct Host {
    worker: Worker,
    fetcher: Arc<HttpFetcher>,
    storage: Arc<DiskStorage>,
}

fn host(config: &Config) -> Result<Host> {
    let settings = config.worker_settings()?;
    let storage_dir = config.storage_dir()?;
    let storage = Arc::new(
        DiskStorage::new(storage_dir.clone())
            .with_context(|| format!("Failed to open store directory: {}", storage_dir.display()))?,
    );
    let fetcher = Arc::new(HttpFetcher::with_timeout(config.request_timeout())?);

    let worker = Worker::new(settings, storage.clone(), fetcher.clone());
    Ok(Host {
        worker,
        fetcher,
        storage,
    })
}

async fn install(config: &Config) -> Result<()> {
    let host = host(config)?;
    let outcome = host.worker.on_install().await;

    match outcome.seed {
        SeedReport::Seeded { entries } => {
            eprintln!("Installed {}: cached {} resources", host.worker.version(), entries)
        }
        SeedReport::Failed { reason } => eprintln!(
            "Installed {} without seeding: {}",
            host.worker.version(),
            reason
        ),
    }
    Ok(())
}

async fn activate(config: &Config) -> Result<()> {
    let host = host(config)?;
    let outcome = host.worker.on_activate().await;

    eprintln!("Activated {}", host.worker.version());
    for name in &outcome.reclaim.deleted {
        eprintln!("  deleted old store {}", name);
    }
    for name in &outcome.reclaim.failed {
        eprintln!("  could not delete {}", name);
    }
    Ok(())
}

async fn fetch(
    config: &Config,
    url: &str,
    method: &str,
    accept: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let url = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid method: {}", method))?;
    let mut request = Request::new(method, url);
    if let Some(accept) = accept {
        request = request.with_header(
            header::ACCEPT,
            HeaderValue::from_str(accept).context("Invalid Accept header")?,
        );
    }

    let host = host(config)?;
    host.worker.boot().await;

    let (response, source) = match host.worker.on_intercept(request).await {
        Interception::PassThrough(request) => {
            info!(url = %request.url, "Not managed, fetching directly");
            let response = host.fetcher.fetch(&request).await?;
            (response, "pass-through")
        }
        Interception::Respond(retrieval) => {
            // The process is about to exit; let the write-back land first
            if let Some(write_back) = retrieval.write_back {
                write_back.settled().await;
            }
            let source = match retrieval.source {
                ResponseSource::Network => "network",
                ResponseSource::Store => "store",
                ResponseSource::Synthetic => "offline",
            };
            (retrieval.response, source)
        }
    };

    print_response(&response, source, output)
}

fn print_response(response: &Response, source: &str, output: Option<&Path>) -> Result<()> {
    eprintln!("{} ({})", response.status, source);
    for (name, value) in &response.headers {
        eprintln!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }

    match output {
        Some(path) => std::fs::write(path, &response.body)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&response.body)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn stores(config: &Config) -> Result<()> {
    let host = host(config)?;
    let names = host.storage.list_names().await?;
    if names.is_empty() {
        println!("No stores in {}", host.storage.root().display());
        return Ok(());
    }

    for name in names {
        let entries = host.storage.entries(&name).await?;
        let marker = if name == host.worker.version() { "*" } else { " " };
        println!("{} {} ({} entries)", marker, name, entries.len());
        for (key, cached) in entries {
            println!(
                "    {} {} {}B {}",
                cached.status,
                key,
                cached.body.len(),
                cached.age_display()
            );
        }
    }
    Ok(())
}

fn init_config(explicit_path: Option<&Path>) -> Result<()> {
    let defaults = Config::default();
    let path = match explicit_path {
        Some(path) => {
            defaults.save_to(path)?;
            path.to_path_buf()
        }
        None => defaults.save()?,
    };
    eprintln!("Wrote default configuration to {}", path.display());
    Ok(())
}
