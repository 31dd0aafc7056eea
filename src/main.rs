//! Domain-Catalog main entry point
//!
//! This is the command-line interface for the domain-marketplace catalog mirror.

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser};
use domain_catalog::config::{load_config_with_hash, Config};
use domain_catalog::query::{DomainSort, SortDirection, DEFAULT_PAGE_SIZE};
use domain_catalog::{Availability, CatalogService, DomainFilter, DomainQuery, SortKey};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Domain-Catalog: a local mirror of a domain-marketplace catalog
///
/// Synchronizes the upstream catalog into a SQLite store and answers
/// filtered queries and analytics from it. Results print as JSON.
#[derive(Parser, Debug)]
#[command(name = "domain-catalog")]
#[command(version)]
#[command(about = "A local mirror of a domain-marketplace catalog", long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .args(["status", "sync", "query", "analytics", "reset_catalog", "daemon"])
))]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show the synchronization state (default)
    #[arg(long)]
    status: bool,

    /// Run a synchronization and wait for it
    #[arg(long)]
    sync: bool,

    /// Bypass the cooldown and staleness guards and start a full pass
    #[arg(long, requires = "sync")]
    force: bool,

    /// Clear the catalog before syncing (implies --force)
    #[arg(long, requires = "sync")]
    reset: bool,

    /// Query one page of the catalog
    #[arg(long)]
    query: bool,

    /// Page number for --query
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Page size for --query
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,

    /// Substring of the domain name
    #[arg(long)]
    search: Option<String>,

    /// Exact top-level domain
    #[arg(long)]
    tld: Option<String>,

    /// available, unavailable or unknown
    #[arg(long)]
    availability: Option<String>,

    /// Raw field filter as FIELD=TEXT (repeatable)
    #[arg(long = "filter", value_name = "FIELD=TEXT")]
    filters: Vec<String>,

    /// Sort key: a fixed column or a raw field name
    #[arg(long)]
    sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    desc: bool,

    /// Show analytics for the filter
    #[arg(long)]
    analytics: bool,

    /// Delete every record and all sync metadata
    #[arg(long)]
    reset_catalog: bool,

    /// Keep running and refresh on the configured interval
    #[arg(long)]
    daemon: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let service = CatalogService::open(&config)?;

    if cli.sync {
        handle_sync(&service, cli.force, cli.reset).await?;
    } else if cli.query {
        handle_query(&service, &cli)?;
    } else if cli.analytics {
        print_json(&service.analytics(&build_filter(&cli)?)?)?;
    } else if cli.reset_catalog {
        service.reset_catalog()?;
        print_json(&service.sync_status()?)?;
    } else if cli.daemon {
        handle_daemon(&service, &config).await?;
    } else {
        print_json(&service.sync_status()?)?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr so stdout stays valid JSON.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("domain_catalog=info,warn"),
            1 => EnvFilter::new("domain_catalog=debug,info"),
            2 => EnvFilter::new("domain_catalog=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Handles --sync: runs once and prints the report
async fn handle_sync(service: &CatalogService, force: bool, reset: bool) -> anyhow::Result<()> {
    if reset {
        tracing::info!("Resetting catalog and starting a full sync");
    } else if force {
        tracing::info!("Starting forced full sync");
    }

    match service.trigger_sync(force, reset).wait().await {
        Ok(report) => print_json(&report),
        Err(e) => {
            tracing::error!("Sync failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handles --query: prints one page of results
fn handle_query(service: &CatalogService, cli: &Cli) -> anyhow::Result<()> {
    let key = match &cli.sort {
        Some(sort) => sort.parse::<SortKey>()?,
        None => SortKey::default(),
    };
    let direction = if cli.desc {
        SortDirection::Desc
    } else {
        SortDirection::Asc
    };

    let query = DomainQuery {
        page: cli.page,
        page_size: cli.page_size,
        filter: build_filter(cli)?,
        sort: DomainSort::new(key, direction),
    };

    print_json(&service.query_domains(&query)?)
}

fn build_filter(cli: &Cli) -> anyhow::Result<DomainFilter> {
    let mut filter = DomainFilter {
        search: cli.search.clone(),
        tld: cli.tld.clone(),
        availability: cli
            .availability
            .as_deref()
            .map(str::parse::<Availability>)
            .transpose()?,
        ..DomainFilter::default()
    };

    for entry in &cli.filters {
        let Some((field, text)) = entry.split_once('=') else {
            bail!("filter {:?} is not FIELD=TEXT", entry);
        };
        filter = filter.with_column(field, text);
    }

    Ok(filter)
}

/// Handles --daemon: refreshes on an interval until Ctrl-C
async fn handle_daemon(service: &CatalogService, config: &Config) -> anyhow::Result<()> {
    let Some(every) = config.sync.auto_refresh_secs else {
        bail!("--daemon requires sync.auto-refresh-secs in the configuration");
    };

    tracing::info!("Running as daemon, refreshing every {:?}", Duration::from_secs(every));
    service.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    service.shutdown().await;
    Ok(())
}
