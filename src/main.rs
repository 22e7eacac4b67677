//! Page-Harvest main entry point
//!
//! This is the command-line interface for the Page-Harvest pagination harvester.

use anyhow::Context;
use clap::Parser;
use page_harvest::config::{load_config_with_hash, validate, Config};
use page_harvest::harvest::{
    print_status, print_summary, run_harvest, write_summary_json, TemplateVars,
};
use page_harvest::ProgressStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Page-Harvest: a resumable pagination harvester
///
/// Page-Harvest walks a paginated listing, fetches the document behind every
/// listed record with bounded concurrency, and appends one row per document to
/// a CSV or JSON-lines dataset. Progress is checkpointed after every page, so an
/// interrupted run picks up where it left off.
#[derive(Parser, Debug)]
#[command(name = "page-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable pagination harvester", long_about = None)]
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

    /// Override the number of concurrent document fetches
    #[arg(long, value_name = "K")]
    concurrency: Option<u32>,

    /// Override the first page to process
    #[arg(long, value_name = "N")]
    start_page: Option<u32>,

    /// Override the last page to process
    #[arg(long, value_name = "N")]
    end_page: Option<u32>,

    /// Override the progress checkpoint path
    #[arg(long, value_name = "PATH")]
    progress_path: Option<String>,

    /// Override the output dataset path
    #[arg(long, value_name = "PATH")]
    output_path: Option<String>,

    /// Stop once this many records are collected (across runs)
    #[arg(long, value_name = "N")]
    max_records: Option<u64>,

    /// Also write the run summary as JSON to this file
    #[arg(long, value_name = "PATH")]
    summary_json: Option<PathBuf>,

    /// Validate config and show what would be harvested without sending requests
    #[arg(long, conflicts_with_all = ["status", "requeue_failed"])]
    dry_run: bool,

    /// Show what the progress checkpoint records and exit
    #[arg(long, conflicts_with_all = ["dry_run", "requeue_failed"])]
    status: bool,

    /// Reopen pages with abandoned units so the next run retries them, then exit
    #[arg(long, conflicts_with_all = ["dry_run", "status"])]
    requeue_failed: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(concurrency) = self.concurrency {
            config.harvest.concurrency = concurrency;
        }
        if let Some(start_page) = self.start_page {
            config.harvest.start_page = start_page;
        }
        if let Some(end_page) = self.end_page {
            config.harvest.end_page = Some(end_page);
        }
        if let Some(path) = &self.progress_path {
            config.output.progress_path = path.clone();
        }
        if let Some(path) = &self.output_path {
            config.output.output_path = path.clone();
        }
        if let Some(max_records) = self.max_records {
            config.harvest.max_records = Some(max_records);
        }
    }
}

/// How the process ended, mapped to its exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    Finished,
    /// Stopped by Ctrl-C; 128 + SIGINT, as shells report it
    Interrupted,
}

impl RunEnd {
    fn exit_status(self) -> u8 {
        match self {
            Self::Finished => 0,
            Self::Interrupted => 130,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    cli.apply_overrides(&mut config);
    validate(&config).context("Invalid command-line override")?;

    // Handle different modes
    let end = if cli.dry_run {
        handle_dry_run(&config)?;
        RunEnd::Finished
    } else if cli.status {
        handle_status(&config)?;
        RunEnd::Finished
    } else if cli.requeue_failed {
        handle_requeue(&config)?;
        RunEnd::Finished
    } else {
        handle_harvest(config, config_hash, cli.summary_json.as_deref()).await?
    };

    Ok(ExitCode::from(end.exit_status()))
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("page_harvest=info,warn"),
            1 => EnvFilter::new("page_harvest=debug,info"),
            2 => EnvFilter::new("page_harvest=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Page-Harvest Dry Run ===\n");

    println!("Harvest:");
    println!("  Concurrency: {}", config.harvest.concurrency);
    match config.harvest.end_page {
        Some(end) => println!("  Pages: {} - {}", config.harvest.start_page, end),
        None => println!("  Pages: {} - end of listing", config.harvest.start_page),
    }
    println!("  Page size: {}", config.harvest.page_size);
    if let Some(target) = config.harvest.max_records {
        println!("  Stop after: {} records", target);
    }
    println!(
        "  Halt after: {} consecutive failed pages",
        config.harvest.max_consecutive_page_failures + 1
    );

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}ms doubling, capped at {}ms",
        config.retry.base_delay_ms, config.retry.max_delay_ms
    );

    println!("\nClient:");
    println!("  Backend: {:?}", config.client.backend);
    println!("  User agent: {}", config.client.user_agent);
    if let Some(var) = &config.client.api_key_env {
        let present = std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false);
        println!(
            "  API key: ${} ({})",
            var,
            if present { "set" } else { "NOT SET" }
        );
    }

    let first = TemplateVars {
        page: config.harvest.start_page,
        page_size: config.harvest.page_size,
        id: None,
    };
    let request = config.listing.request.build(&first)?;
    println!("\nFirst listing request:");
    println!("  {} {}", request.method, request.url);
    if let Some(body) = &request.body {
        println!("  Body: {}", body);
    }

    match &config.document {
        Some(document) => {
            println!("\nDocuments:");
            println!(
                "  {} {}",
                document.request.method, document.request.url
            );
            match &document.save_dir {
                Some(dir) => println!(
                    "  Saved as files in {} (paths in column {})",
                    dir, document.column
                ),
                None => println!("  Stored in column: {}", document.column),
            }
        }
        None => println!("\nDocuments: none (listing records are stored directly)"),
    }

    println!("\nOutput:");
    println!("  Dataset: {} ({:?})", config.output.output_path, config.output.format);
    println!("  Columns: {}", config.output.columns.join(", "));
    println!("  Progress: {}", config.output.progress_path);

    let progress = ProgressStore::load(Path::new(&config.output.progress_path))?;
    println!(
        "\n✓ Configuration is valid ({} pages already done)",
        progress.state().completed_pages.len()
    );

    Ok(())
}

/// Handles the --status mode: shows the progress checkpoint
fn handle_status(config: &Config) -> anyhow::Result<()> {
    println!("Progress: {}\n", config.output.progress_path);

    let progress = ProgressStore::load(Path::new(&config.output.progress_path))?;
    print_status(progress.state());

    Ok(())
}

/// Handles the --requeue-failed mode: reopens pages with abandoned units
fn handle_requeue(config: &Config) -> anyhow::Result<()> {
    let mut progress = ProgressStore::load(Path::new(&config.output.progress_path))?;
    let abandoned = progress.state().abandoned_units.len();
    let pages = progress.requeue_abandoned()?;

    if pages.is_empty() {
        println!("No abandoned units to requeue");
    } else {
        let list: Vec<String> = pages.iter().map(u32::to_string).collect();
        println!(
            "✓ Requeued {} abandoned units on {} pages: {}",
            abandoned,
            pages.len(),
            list.join(", ")
        );
    }

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: Config,
    config_hash: String,
    summary_json: Option<&Path>,
) -> anyhow::Result<RunEnd> {
    tracing::info!(
        "Harvesting into {} with concurrency {}",
        config.output.output_path,
        config.harvest.concurrency
    );

    tokio::select! {
        result = run_harvest(&config, Some(config_hash)) => {
            match result {
                Ok(summary) => {
                    print_summary(&summary);
                    if let Some(path) = summary_json {
                        write_summary_json(&summary, path).with_context(|| {
                            format!("Failed to write summary to {}", path.display())
                        })?;
                    }
                    Ok(RunEnd::Finished)
                }
                Err(e) => {
                    tracing::error!("Harvest failed: {}", e);
                    Err(e.into())
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(
                "Interrupted; progress up to the last committed page is saved in {}",
                config.output.progress_path
            );
            Ok(RunEnd::Interrupted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_run_exits_nonzero() {
        assert_eq!(RunEnd::Finished.exit_status(), 0);
        assert_eq!(RunEnd::Interrupted.exit_status(), 130);
    }

    #[test]
    fn test_overrides_replace_file_settings() {
        let cli = Cli::try_parse_from([
            "page-harvest",
            "harvest.toml",
            "--concurrency",
            "8",
            "--max-records",
            "3000000",
            "--summary-json",
            "summary.json",
        ])
        .unwrap();

        let mut config = page_harvest::config::parse_config(
            r#"
[harvest]
concurrency = 2

[output]
progress-path = "progress.json"
output-path = "companies.csv"
columns = ["cin", "name"]

[listing.request]
url = "https://www.zaubacorp.com/company-list/p-{page}-company.html"

[listing.parser]
kind = "html-table"
row-selector = "table#table tr"
columns = ["cin", "name"]
id-column = "cin"
"#,
        )
        .unwrap();
        cli.apply_overrides(&mut config);

        assert_eq!(config.harvest.concurrency, 8);
        assert_eq!(config.harvest.max_records, Some(3_000_000));
        assert_eq!(cli.summary_json, Some(PathBuf::from("summary.json")));
    }
}
