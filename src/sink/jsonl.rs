//! JSON-lines result sink

use crate::sink::{drop_unterminated_line, ResultRecord, ResultSink, SinkError, SinkResult};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Appends one JSON object per line, keys in schema order
pub struct JsonLinesSink {
    schema: Vec<String>,
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: &Path, schema: Vec<String>) -> SinkResult<Self> {
        if schema.is_empty() {
            return Err(SinkError::EmptySchema);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() {
            drop_unterminated_line(path)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            schema,
            file: Mutex::new(file),
        })
    }

    fn encode(&self, record: &ResultRecord) -> SinkResult<Vec<u8>> {
        let mut line = serde_json::to_vec(&SchemaRow {
            schema: &self.schema,
            record,
        })?;
        line.push(b'\n');
        Ok(line)
    }
}

/// A record viewed as a JSON object whose keys follow the schema
struct SchemaRow<'a> {
    schema: &'a [String],
    record: &'a ResultRecord,
}

impl Serialize for SchemaRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.schema.len()))?;
        for column in self.schema {
            map.serialize_entry(column, self.record.get(column).unwrap_or(""))?;
        }
        map.end()
    }
}

impl ResultSink for JsonLinesSink {
    fn schema(&self) -> &[String] {
        &self.schema
    }

    fn append(&self, record: &ResultRecord) -> SinkResult<()> {
        let line = self.encode(record)?;
        let mut file = self.file.lock().map_err(|_| SinkError::Poisoned)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}
