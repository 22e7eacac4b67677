//! Concurrent work dispatcher
//!
//! Fetches the documents of one listing page with at most `K` requests in
//! flight and appends a row per finished unit to the result sink. The
//! dispatcher returns only after every unit it was handed has settled, either
//! completed or abandoned.

use crate::config::DocumentConfig;
use crate::fetch::{FetchError, Fetcher, RawPayload};
use crate::harvest::{RetryPolicy, TemplateVars, WorkUnit};
use crate::progress::ProgressState;
use crate::sink::{DocumentFiles, ResultRecord, ResultSink};
use crate::HarvestError;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// How the units of one page settled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageOutcome {
    /// Units whose row was appended
    pub completed: Vec<String>,
    /// Units that failed permanently
    pub abandoned: Vec<String>,
    /// Units completed or abandoned in an earlier run, or listed twice
    pub skipped: usize,
}

/// Runs the per-unit fetches of a page with bounded concurrency
pub struct Dispatcher {
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn ResultSink>,
    document: Option<DocumentConfig>,
    files: Option<DocumentFiles>,
    retry: RetryPolicy,
    concurrency: usize,
    page_size: u32,
}

impl Dispatcher {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn ResultSink>,
        document: Option<DocumentConfig>,
        retry: RetryPolicy,
        concurrency: usize,
        page_size: u32,
    ) -> Self {
        let files = document.as_ref().and_then(|document| {
            document
                .save_dir
                .as_ref()
                .map(|dir| DocumentFiles::new(dir, document.file_extension.clone()))
        });

        Self {
            fetcher,
            sink,
            document,
            files,
            retry,
            concurrency: concurrency.max(1),
            page_size,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Settles every unit of `page`
    ///
    /// Units already completed or abandoned in `state` are not fetched again;
    /// abandoned ones wait for `--requeue-failed`. An error is returned only
    /// for failures that concern the whole run, such as a sink that can no
    /// longer be written; per-unit failures end up in `PageOutcome::abandoned`.
    pub async fn dispatch(
        &self,
        page: u32,
        units: Vec<WorkUnit>,
        state: &ProgressState,
    ) -> Result<PageOutcome, HarvestError> {
        let mut outcome = PageOutcome::default();
        let mut seen = HashSet::new();
        let mut pending = Vec::with_capacity(units.len());

        for unit in units {
            if state.is_unit_abandoned(&unit.id) {
                tracing::debug!("Page {}: unit {} was abandoned earlier, skipping", page, unit.id);
                outcome.skipped += 1;
                continue;
            }
            if state.is_unit_done(&unit.id) || !seen.insert(unit.id.clone()) {
                tracing::debug!("Page {}: unit {} already done, skipping", page, unit.id);
                outcome.skipped += 1;
                continue;
            }
            pending.push(unit);
        }

        match &self.document {
            None => self.store_listing_rows(pending, &mut outcome)?,
            Some(document) => {
                self.fetch_documents(page, document, pending, &mut outcome)
                    .await?
            }
        }

        Ok(outcome)
    }

    /// Listing-only mode: every listed unit is a row
    fn store_listing_rows(
        &self,
        units: Vec<WorkUnit>,
        outcome: &mut PageOutcome,
    ) -> Result<(), HarvestError> {
        for unit in units {
            self.sink.append(&ResultRecord::from(unit.fields))?;
            outcome.completed.push(unit.id);
        }
        Ok(())
    }

    async fn fetch_documents(
        &self,
        page: u32,
        document: &DocumentConfig,
        units: Vec<WorkUnit>,
        outcome: &mut PageOutcome,
    ) -> Result<(), HarvestError> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(WorkUnit, Result<RawPayload, FetchError>)> = JoinSet::new();

        for unit in units {
            let vars = TemplateVars {
                page,
                page_size: self.page_size,
                id: Some(&unit.id),
            };
            let request = match document.request.build(&vars) {
                Ok(request) => request,
                Err(e) => {
                    tracing::error!("Abandoning unit {} (page {}): {}", unit.id, page, e);
                    outcome.abandoned.push(unit.id);
                    continue;
                }
            };

            let semaphore = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let retry = self.retry;

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (unit, Err(FetchError::fatal("dispatcher shut down")));
                    }
                };

                let label = format!("Unit {}", unit.id);
                let result = retry.run(&label, || fetcher.fetch(&request)).await;
                (unit, result)
            });
        }

        // Rows are appended from this task only; dropping `tasks` on an
        // early return aborts the fetches still running
        while let Some(joined) = tasks.join_next().await {
            let (unit, result) = joined?;

            match result {
                Ok(payload) => {
                    let value = match &self.files {
                        Some(files) => {
                            files.save(&unit.id, &payload.body)?.display().to_string()
                        }
                        None => payload.text(),
                    };
                    let mut record = ResultRecord::from(unit.fields);
                    record.insert(document.column.as_str(), value);
                    self.sink.append(&record)?;
                    tracing::debug!("Unit {} stored ({} bytes)", unit.id, payload.body.len());
                    outcome.completed.push(unit.id);
                }
                Err(e) => {
                    tracing::error!("Abandoning unit {} (page {}): {}", unit.id, page, e);
                    outcome.abandoned.push(unit.id);
                }
            }
        }

        Ok(())
    }
}
