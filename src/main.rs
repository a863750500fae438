//! Harvest command-line entry point
//!
//! Runs a single job against an in-process orchestrator and prints the job
//! record and its results as JSON.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use harvest_engine::config::{load_config_with_hash, Config};
use harvest_engine::extract::Format;
use harvest_engine::jobs::{BatchJob, CrawlJob, JobSpec, MapJob, ScrapeJob};
use harvest_engine::scrape::ScrapeOptions;
use harvest_engine::JobOrchestrator;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const CLI_USER: &str = "cli";

/// Harvest: escalating web scraper and crawler
///
/// Fetches pages through progressively heavier strategies until one of
/// them yields real content, then extracts it in the requested formats.
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(version)]
#[command(about = "Escalating web scraper and crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape a single page
    Scrape {
        url: String,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Crawl a site breadth-first from a start URL
    Crawl {
        url: String,

        #[arg(long, default_value_t = 100)]
        max_pages: u32,

        #[arg(long, default_value_t = 3)]
        max_depth: u32,

        /// Path glob a page must match (repeatable)
        #[arg(long = "include")]
        include_paths: Vec<String>,

        /// Path glob that excludes a page (repeatable)
        #[arg(long = "exclude")]
        exclude_paths: Vec<String>,

        /// Follow links to other sites
        #[arg(long)]
        allow_external_links: bool,

        /// Crawl pages robots.txt disallows
        #[arg(long)]
        ignore_robots: bool,

        #[arg(long, default_value_t = 5)]
        concurrency: usize,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Scrape many URLs as one job
    Batch {
        urls: Vec<String>,

        /// File with one URL per line
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,

        #[arg(long, default_value_t = 5)]
        concurrency: usize,

        #[command(flatten)]
        page: PageArgs,
    },

    /// List the URLs of a site without scraping them
    Map {
        url: String,

        /// Keep only URLs containing this text
        #[arg(long)]
        search: Option<String>,

        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Drop URLs on subdomains of the start host
        #[arg(long)]
        no_subdomains: bool,

        /// Skip sitemap discovery
        #[arg(long)]
        no_sitemap: bool,

        /// Route every request through one configured proxy
        #[arg(long)]
        proxy: bool,
    },

    /// Validate the configuration and print it
    CheckConfig,
}

/// Per-page options shared by the page-producing commands
#[derive(clap::Args, Debug)]
struct PageArgs {
    /// Output formats (markdown, html, raw_html, links, structured_data, headings, images, screenshot)
    #[arg(long = "format", value_parser = parse_format, default_value = "markdown")]
    formats: Vec<Format>,

    /// Keep navigation, headers and footers
    #[arg(long)]
    full_page: bool,

    /// Extra settle time for rendered pages (milliseconds)
    #[arg(long, default_value_t = 0)]
    wait_for: u64,

    /// Per-attempt timeout (milliseconds)
    #[arg(long, default_value_t = 30_000)]
    timeout: u64,

    /// Route requests through a configured proxy
    #[arg(long)]
    proxy: bool,
}

impl PageArgs {
    fn into_options(self) -> ScrapeOptions {
        ScrapeOptions {
            formats: self.formats,
            only_main_content: !self.full_page,
            wait_for: self.wait_for,
            timeout: self.timeout,
            use_proxy: self.proxy,
            ..ScrapeOptions::default()
        }
    }
}

fn parse_format(raw: &str) -> Result<Format, String> {
    let name = raw.trim().to_ascii_lowercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(name))
        .map_err(|_| format!("unknown format '{}'", raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    let spec = match cli.command {
        Command::CheckConfig => return handle_check_config(&config),
        Command::Scrape { url, page } => JobSpec::Scrape(ScrapeJob {
            url,
            options: page.into_options(),
        }),
        Command::Crawl {
            url,
            max_pages,
            max_depth,
            include_paths,
            exclude_paths,
            allow_external_links,
            ignore_robots,
            concurrency,
            page,
        } => JobSpec::Crawl(CrawlJob {
            url,
            max_pages,
            max_depth,
            include_paths,
            exclude_paths,
            allow_external_links,
            respect_robots_txt: !ignore_robots,
            concurrency,
            scrape_options: page.into_options(),
        }),
        Command::Batch {
            mut urls,
            file,
            concurrency,
            page,
        } => {
            if let Some(file) = file {
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?;
                urls.extend(
                    content
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty() && !line.starts_with('#'))
                        .map(str::to_string),
                );
            }
            if urls.is_empty() {
                bail!("batch needs at least one URL");
            }
            JobSpec::Batch(BatchJob {
                urls,
                items: Vec::new(),
                concurrency,
                options: page.into_options(),
            })
        }
        Command::Map {
            url,
            search,
            limit,
            no_subdomains,
            no_sitemap,
            proxy,
        } => JobSpec::Map(MapJob {
            url,
            search,
            limit,
            include_subdomains: !no_subdomains,
            use_sitemap: !no_sitemap,
            use_proxy: proxy,
        }),
    };

    run_job(&config, spec).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("harvest_engine=info,warn"),
            1 => EnvFilter::new("harvest_engine=debug,info"),
            2 => EnvFilter::new("harvest_engine=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn handle_check_config(config: &Config) -> anyhow::Result<()> {
    harvest_engine::config::validate(config)?;
    println!("{}", serde_json::to_string_pretty(config)?);
    eprintln!("✓ Configuration is valid");
    Ok(())
}

/// Submits one job, waits for it and prints the outcome
///
/// Ctrl-C cancels the job; results gathered so far are still printed.
async fn run_job(config: &Config, spec: JobSpec) -> anyhow::Result<()> {
    let orchestrator = JobOrchestrator::from_config(config)?;

    let recovered = orchestrator.recover().await?;
    if recovered > 0 {
        tracing::info!("Resuming {} unfinished jobs from the store", recovered);
    }

    let id = orchestrator.submit(CLI_USER, spec).await?;
    tracing::info!("Submitted job {}", id);

    let job = tokio::select! {
        job = orchestrator.wait(id) => job?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling job {}", id);
            if let Err(e) = orchestrator.cancel(id).await {
                tracing::debug!("Cancel of {} had no effect: {}", id, e);
            }
            orchestrator.wait(id).await?
        }
    };
    let results = orchestrator.results(id).await?;

    let output = serde_json::json!({
        "job": job,
        "results": results,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    orchestrator.shutdown().await;

    if let Some(error) = &job.error {
        bail!("job {} ended as {}: {}", id, job.status, error);
    }
    Ok(())
}
