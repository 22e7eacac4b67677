//! Harvest module - pagination, dispatch and retry
//!
//! This module contains:
//! - The pagination driver that walks listing pages and commits progress
//! - The concurrent dispatcher that fetches the documents of one page
//! - Listing parsers and request templates
//! - Retry with exponential backoff and run summaries

mod dispatcher;
mod driver;
mod parser;
mod request;
mod retry;
mod summary;

pub use dispatcher::{Dispatcher, PageOutcome};
pub use driver::Harvester;
pub use parser::{parse_json_with_fallback, Listing, PageParser, ParseError, WorkUnit};
pub use request::{render, TemplateError, TemplateVars};
pub use retry::RetryPolicy;
pub use summary::{print_status, print_summary, write_summary_json, HarvestSummary, RunOutcome};

use crate::config::Config;

/// Runs a full harvest with the backends selected by `config`
pub async fn run_harvest(
    config: &Config,
    config_hash: Option<String>,
) -> crate::Result<HarvestSummary> {
    let mut harvester = Harvester::new(config, config_hash)?;
    harvester.run().await
}
