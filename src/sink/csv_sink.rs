//! CSV result sink

use crate::sink::{ResultRecord, ResultSink, SinkError, SinkResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Appends records as CSV rows under a header written once at creation
///
/// Every row is encoded in memory first and reaches the file in a single
/// write, so a crash leaves at most one incomplete record at the tail.
pub struct CsvSink {
    path: PathBuf,
    schema: Vec<String>,
    file: Mutex<File>,
}

impl CsvSink {
    /// Opens or creates the CSV file at `path`
    ///
    /// A new (or empty) file gets the schema as its header row. An existing
    /// file must carry exactly that header, otherwise rows would land under
    /// the wrong columns. An incomplete record left by a crash is cut off.
    pub fn open(path: &Path, schema: Vec<String>) -> SinkResult<Self> {
        if schema.is_empty() {
            return Err(SinkError::EmptySchema);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let has_content = match std::fs::metadata(path) {
            Ok(meta) => meta.len() > 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if has_content {
            check_header(path, &schema)?;
            drop_incomplete_record(path)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if !has_content {
            file.write_all(&encode_row(&schema)?)?;
            file.flush()?;
        }

        tracing::debug!(
            "Opened CSV output {} ({} columns)",
            path.display(),
            schema.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            schema,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn encode_row<I, T>(fields: I) -> SinkResult<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|e| SinkError::Io(e.into_error()))
}

fn check_header(path: &Path, schema: &[String]) -> SinkResult<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let found: Vec<String> = match reader.records().next() {
        Some(record) => record?.iter().map(str::to_string).collect(),
        None => Vec::new(),
    };

    if found != schema {
        return Err(SinkError::SchemaMismatch {
            path: path.display().to_string(),
            expected: schema.to_vec(),
            found,
        });
    }
    Ok(())
}

/// Truncates the file to the end of its last complete record
///
/// The CSV reader locates where the final record starts. That record is
/// complete only if it ends with a newline outside any quoted field, which
/// holds exactly when its raw bytes end in `\n` and carry an even number of
/// quote characters.
fn drop_incomplete_record(path: &Path) -> SinkResult<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut record = csv::ByteRecord::new();
    let mut last_start = 0u64;
    while reader.read_byte_record(&mut record)? {
        if let Some(position) = record.position() {
            last_start = position.byte();
        }
    }
    drop(reader);

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut tail = Vec::new();
    file.seek(SeekFrom::Start(last_start))?;
    file.read_to_end(&mut tail)?;

    let quotes = tail.iter().filter(|&&b| b == b'"').count();
    if tail.is_empty() || (tail.ends_with(b"\n") && quotes % 2 == 0) {
        return Ok(());
    }

    tracing::warn!(
        "{} ends with an incomplete row (interrupted write); dropping its {} bytes",
        path.display(),
        tail.len()
    );
    file.set_len(last_start)?;
    file.sync_all()?;
    Ok(())
}

impl ResultSink for CsvSink {
    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn append(&self, record: &ResultRecord) -> SinkResult<()> {
        let row = encode_row(record.project(&self.schema))?;
        let mut file = self.file.lock().map_err(|_| SinkError::Poisoned)?;
        file.write_all(&row)?;
        file.flush()?;
        Ok(())
    }
}
