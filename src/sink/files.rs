//! Documents stored as individual files
//!
//! Binary payloads such as PDFs do not fit in a dataset cell. Each one is
//! written to `<save-dir>/<file name>` and the row records the path instead.

use crate::sink::SinkResult;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// Writes one file per unit into a directory
#[derive(Debug, Clone)]
pub struct DocumentFiles {
    dir: PathBuf,
    extension: Option<String>,
}

impl DocumentFiles {
    pub fn new(dir: impl Into<PathBuf>, extension: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            extension,
        }
    }

    /// Path the document of unit `id` is stored at
    pub fn path_for(&self, id: &str) -> PathBuf {
        let mut name = file_name_for(id);
        if let Some(extension) = &self.extension {
            name.push('.');
            name.push_str(extension);
        }
        self.dir.join(name)
    }

    /// Stores `body` for unit `id`, replacing any earlier copy
    ///
    /// The bytes go to a temporary file in the same directory first, so the
    /// final name never holds a partial document.
    pub fn save(&self, id: &str, body: &[u8]) -> SinkResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(id);

        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(body)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| e.error)?;

        tracing::trace!("Saved {} ({} bytes)", path.display(), body.len());
        Ok(path)
    }
}

/// Maps a unit id to a safe file name
///
/// ASCII letters, digits, `.`, `-` and `_` are kept and anything else becomes
/// `_`. When that changes the id, a short hash of the original is appended so
/// distinct ids cannot collide.
pub fn file_name_for(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned == id && !id.chars().all(|c| c == '.') {
        return cleaned;
    }

    let digest = Sha256::digest(id.as_bytes());
    let suffix = &hex::encode(digest)[..8];
    if cleaned.chars().all(|c| c == '.') {
        format!("unit-{}", suffix)
    } else {
        format!("{}-{}", cleaned, suffix)
    }
}
