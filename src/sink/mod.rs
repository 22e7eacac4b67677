//! Sink module for persisting harvested records
//!
//! This module handles:
//! - The `ResultSink` trait and `ResultRecord` row type
//! - CSV output with a fixed header row
//! - JSON-lines output
//! - Documents saved as individual files
//! - Recovering from a row cut short by a crash

mod csv_sink;
mod files;
mod jsonl;
mod traits;

pub use csv_sink::CsvSink;
pub use files::{file_name_for, DocumentFiles};
pub use jsonl::JsonLinesSink;
pub use traits::{ResultRecord, ResultSink, SinkError, SinkResult};

use crate::config::{OutputConfig, OutputFormat};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// Opens the sink selected by `[output] format`
pub fn open_sink(config: &OutputConfig) -> SinkResult<Arc<dyn ResultSink>> {
    let path = Path::new(&config.output_path);
    let schema = config.columns.clone();

    match config.format {
        OutputFormat::Csv => Ok(Arc::new(CsvSink::open(path, schema)?)),
        OutputFormat::Jsonl => Ok(Arc::new(JsonLinesSink::open(path, schema)?)),
    }
}

/// Cuts a final line left unfinished by a crash
///
/// Everything after the last `\n` belongs to a record whose write never
/// completed. Its page was not committed, so the record is fetched again.
pub(crate) fn drop_unterminated_line(path: &Path) -> SinkResult<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = file.metadata()?.len();

    let mut buf = vec![0u8; 8192];
    let mut end = len;
    let keep = loop {
        if end == 0 {
            break 0;
        }
        let start = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(i) = chunk.iter().rposition(|&b| b == b'\n') {
            break start + i as u64 + 1;
        }
        end = start;
    };

    if keep < len {
        tracing::warn!(
            "{} ends with an unterminated line (interrupted write); dropping its {} bytes",
            path.display(),
            len - keep
        );
        file.set_len(keep)?;
        file.sync_all()?;
    }
    Ok(())
}
