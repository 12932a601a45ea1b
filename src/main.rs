//! Lantern main entry point
//!
//! This is the command-line interface for the Lantern crawler.

use anyhow::{bail, Context};
use clap::Parser;
use lantern_crawl::config::{load_config_with_hash, Config, OutputFormat, Preset};
use lantern_crawl::output::{print_statistics, summarize, write_results};
use lantern_crawl::Crawler;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Lantern: a polite, depth-bounded web crawler
///
/// Lantern crawls a site from a seed URL while respecting robots.txt,
/// adaptive per-domain rate limits and proxy health, and exports what it
/// found as JSON, CSV or markdown.
#[derive(Parser, Debug)]
#[command(name = "lantern-crawl")]
#[command(version)]
#[command(about = "A polite, depth-bounded web crawler", long_about = None)]
struct Cli {
    /// Seed URL to start crawling from
    #[arg(value_name = "URL")]
    url: String,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Named preset applied on top of the configuration
    #[arg(long, value_name = "NAME")]
    preset: Option<Preset>,

    /// Crawl depth (1 fetches only the seed)
    #[arg(short, long)]
    depth: Option<u32>,

    /// Crawl the seed as a paginated listing
    #[arg(long)]
    paginate: bool,

    /// Query parameter carrying the page number
    #[arg(long, default_value = "page", requires = "paginate")]
    page_param: String,

    /// Maximum number of listing pages
    #[arg(long, default_value_t = 10, requires = "paginate")]
    max_pages: u32,

    /// Output format: json, csv, markdown or all
    #[arg(short, long, value_parser = parse_format)]
    format: Option<OutputFormat>,

    /// File with User-Agent strings to rotate (one per line)
    #[arg(long, value_name = "FILE")]
    user_agents: Option<PathBuf>,

    /// Redact emails, phone numbers and similar data from page content
    #[arg(long)]
    redact: bool,

    /// Output path stem; extensions are appended per format
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = build_config(&cli)?;
    let depth = config.crawler.max_depth;
    let format = config.output.format;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.path));

    let crawler = Crawler::setup(config).context("Failed to set up crawler")?;

    let result = run_crawl(&crawler, &cli, depth).await;
    let closed = crawler.close().await;
    let pages = result?;
    closed.context("Failed to close crawler")?;

    if pages.is_empty() {
        bail!("Nothing was crawled from {}", cli.url);
    }

    let written = write_results(&pages, format, &output).context("Failed to write results")?;

    if !cli.quiet {
        print_statistics(&summarize(&pages));
        println!();
        for path in written {
            println!("✓ Results written to: {}", path.display());
        }
    }

    Ok(())
}

/// Loads the configuration file if given, then applies the preset and flags
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    if let Some(preset) = cli.preset {
        tracing::info!("Applying preset: {}", preset);
        preset.apply(&mut config);
    }

    if let Some(depth) = cli.depth {
        config.crawler.max_depth = depth;
    }

    if let Some(file) = &cli.user_agents {
        config.user_agent.agents_file = Some(file.to_string_lossy().into_owned());
    }

    if cli.redact {
        config.output.redact_sensitive = true;
    }

    if let Some(format) = cli.format {
        config.output.format = format;
    }

    Ok(config)
}

/// Runs a single or paginated crawl, stopping cleanly on Ctrl-C
async fn run_crawl(
    crawler: &Crawler,
    cli: &Cli,
    depth: u32,
) -> anyhow::Result<Vec<std::sync::Arc<lantern_crawl::PageResult>>> {
    let crawl = async {
        if cli.paginate {
            crawler
                .crawl_paginated(&cli.url, depth, &cli.page_param, cli.max_pages)
                .await
        } else {
            crawler
                .crawl(&cli.url, depth)
                .await
                .map(|page| page.into_iter().collect())
        }
    };

    tokio::select! {
        result = crawl => result.with_context(|| format!("Crawl of {} failed", cli.url)),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping crawl");
            crawler.cancel();
            bail!("Crawl interrupted")
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("lantern_crawl=info,warn"),
            1 => EnvFilter::new("lantern_crawl=debug,info"),
            2 => EnvFilter::new("lantern_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn parse_format(value: &str) -> Result<OutputFormat, String> {
    match value.to_ascii_lowercase().as_str() {
        "json" => Ok(OutputFormat::Json),
        "csv" => Ok(OutputFormat::Csv),
        "markdown" | "md" => Ok(OutputFormat::Markdown),
        "all" => Ok(OutputFormat::All),
        other => Err(format!(
            "unknown format '{}' (expected json, csv, markdown or all)",
            other
        )),
    }
}
