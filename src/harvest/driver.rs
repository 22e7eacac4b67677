//! Pagination driver - main harvest loop
//!
//! Walks listing pages in order and, for each page that is not already
//! committed:
//! - Fetches and parses the listing (with retries)
//! - Hands the units to the dispatcher
//! - Commits the page to the progress store once every unit has settled
//!
//! The run stops at the configured end page, at the end of the listing, once
//! the progress file holds `max-records` completed units, or when too many
//! pages in a row fail.

use crate::config::{Config, RequestTemplate};
use crate::fetch::{build_fetcher, Fetcher};
use crate::harvest::{
    Dispatcher, HarvestSummary, Listing, PageParser, RetryPolicy, RunOutcome, TemplateVars,
};
use crate::progress::ProgressStore;
use crate::sink::{open_sink, ResultSink};
use crate::HarvestError;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Main harvest driver
pub struct Harvester {
    fetcher: Arc<dyn Fetcher>,
    progress: ProgressStore,
    dispatcher: Dispatcher,
    listing: RequestTemplate,
    parser: PageParser,
    retry: RetryPolicy,
    start_page: u32,
    end_page: Option<u32>,
    page_size: u32,
    max_consecutive_failures: u32,
    max_records: Option<u64>,
}

impl Harvester {
    /// Creates a harvester with the backends selected by `config`
    ///
    /// The progress checkpoint is loaded before anything else, so a corrupt
    /// checkpoint fails the run before the output is opened or a request is
    /// sent.
    ///
    /// # Arguments
    ///
    /// * `config` - The validated harvest configuration
    /// * `config_hash` - Hash of the configuration file, recorded with progress
    pub fn new(config: &Config, config_hash: Option<String>) -> Result<Self, HarvestError> {
        let mut progress = ProgressStore::load(Path::new(&config.output.progress_path))?;

        if let Some(hash) = config_hash {
            match progress.config_hash() {
                Some(previous) if previous != hash => {
                    tracing::warn!(
                        "Configuration changed since {} was written; completed pages and units are still skipped",
                        progress.path().display()
                    );
                }
                _ => {}
            }
            progress.set_config_hash(hash);
        }

        let fetcher = build_fetcher(&config.client)?;
        let sink = open_sink(&config.output)?;

        Self::with_parts(config, fetcher, sink, progress)
    }

    /// Creates a harvester from already constructed parts
    pub fn with_parts(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn ResultSink>,
        progress: ProgressStore,
    ) -> Result<Self, HarvestError> {
        let retry = RetryPolicy::from_config(&config.retry);
        let parser = PageParser::from_config(&config.listing.parser)?;

        let dispatcher = Dispatcher::new(
            Arc::clone(&fetcher),
            sink,
            config.document.clone(),
            retry,
            config.harvest.concurrency as usize,
            config.harvest.page_size,
        );

        Ok(Self {
            fetcher,
            progress,
            dispatcher,
            listing: config.listing.request.clone(),
            parser,
            retry,
            start_page: config.harvest.start_page,
            end_page: config.harvest.end_page,
            page_size: config.harvest.page_size,
            max_consecutive_failures: config.harvest.max_consecutive_page_failures,
            max_records: config.harvest.max_records,
        })
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    /// Runs the harvest loop until a stop condition is met
    ///
    /// Page and unit failures are logged and counted; an error is returned
    /// only when progress or output can no longer be written.
    pub async fn run(&mut self) -> Result<HarvestSummary, HarvestError> {
        let mut summary = HarvestSummary::new();
        let start_time = Instant::now();
        let mut consecutive_failures = 0u32;
        let mut page = self.start_page;

        tracing::info!(
            "Starting harvest at page {} ({} pages already done, concurrency {})",
            page,
            self.progress.state().completed_pages.len(),
            self.dispatcher.concurrency()
        );

        let outcome = loop {
            if let Some(target) = self.max_records {
                let collected = self.progress.state().completed_units.len() as u64;
                if collected >= target {
                    tracing::info!("{} records collected, target of {} reached", collected, target);
                    break RunOutcome::TargetReached;
                }
            }

            if self.end_page.is_some_and(|end| page > end) {
                break RunOutcome::Completed;
            }

            if self.progress.is_page_done(page) {
                tracing::debug!("Page {} already done, skipping", page);
                summary.pages_skipped += 1;
            } else {
                let listing = match self.fetch_listing(page).await {
                    Ok(listing) => {
                        consecutive_failures = 0;
                        Some(listing)
                    }
                    Err(reason) => {
                        consecutive_failures += 1;
                        summary.pages_failed.push(page);
                        tracing::warn!(
                            "Page {} failed: {} ({} consecutive)",
                            page,
                            reason,
                            consecutive_failures
                        );
                        None
                    }
                };

                if consecutive_failures > self.max_consecutive_failures {
                    tracing::error!(
                        "{} consecutive pages failed, halting the run",
                        consecutive_failures
                    );
                    break RunOutcome::Halted;
                }

                if let Some(listing) = listing {
                    if listing.units.is_empty() {
                        tracing::info!("Page {} has no records, end of listing", page);
                        break RunOutcome::EndOfData;
                    }

                    let has_next = listing.has_next(page, self.page_size);
                    let outcome = self
                        .dispatcher
                        .dispatch(page, listing.units, self.progress.state())
                        .await?;

                    self.progress
                        .commit(page, &outcome.completed, &outcome.abandoned)?;
                    summary.record_page(&outcome);

                    let elapsed = start_time.elapsed().as_secs_f64();
                    tracing::info!(
                        "Page {} done: {} stored, {} skipped, {} abandoned ({} units this run, {:.2} units/sec)",
                        page,
                        outcome.completed.len(),
                        outcome.skipped,
                        outcome.abandoned.len(),
                        summary.units_stored,
                        if elapsed > 0.0 {
                            summary.units_stored as f64 / elapsed
                        } else {
                            0.0
                        }
                    );

                    if !has_next {
                        tracing::info!("Page {} is the last page of the listing", page);
                        break RunOutcome::EndOfData;
                    }
                }
            }

            page = match page.checked_add(1) {
                Some(next) => next,
                None => break RunOutcome::Completed,
            };
        };

        summary.finish(outcome);
        tracing::info!(
            "Harvest {}: {} pages done, {} units stored in {:?}",
            outcome.describe(),
            summary.pages_done,
            summary.units_stored,
            start_time.elapsed()
        );

        Ok(summary)
    }

    /// Fetches and parses one listing page
    ///
    /// Errors are returned as a reason string; a failed page is never fatal
    /// on its own.
    async fn fetch_listing(&self, page: u32) -> Result<Listing, String> {
        let vars = TemplateVars {
            page,
            page_size: self.page_size,
            id: None,
        };
        let request = self.listing.build(&vars).map_err(|e| e.to_string())?;

        tracing::debug!("Fetching page {}: {} {}", page, request.method, request.url);

        let label = format!("Page {}", page);
        let payload = self
            .retry
            .run(&label, || self.fetcher.fetch(&request))
            .await
            .map_err(|e| e.to_string())?;

        self.parser
            .parse(page, &payload.text())
            .map_err(|e| format!("unreadable listing: {}", e))
    }
}
