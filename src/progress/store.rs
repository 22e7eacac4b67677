//! File-backed progress store
//!
//! The whole state is rewritten on every commit through a temporary file in
//! the same directory that is then renamed over the checkpoint, so a crash
//! leaves either the old or the new state on disk, never a truncated one.

use crate::progress::{ProgressError, ProgressResult, ProgressState};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Durable record of completed pages and units
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    state: ProgressState,
}

impl ProgressStore {
    /// Loads the checkpoint at `path`
    ///
    /// A missing file yields an empty state. A file that exists but cannot be
    /// parsed is an error: resetting would silently re-download everything.
    pub fn load(path: &Path) -> ProgressResult<Self> {
        let state = match std::fs::read_to_string(path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|source| ProgressError::Corrupt {
                    path: path.display().to_string(),
                    source,
                })?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No progress file at {}, starting empty", path.display());
                ProgressState::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn is_page_done(&self, page: u32) -> bool {
        self.state.is_page_done(page)
    }

    pub fn is_unit_done(&self, id: &str) -> bool {
        self.state.is_unit_done(id)
    }

    /// Hash of the configuration recorded with this state, if any
    pub fn config_hash(&self) -> Option<&str> {
        self.state.config_hash.as_deref()
    }

    /// Sets the configuration hash; it is written with the next commit
    pub fn set_config_hash(&mut self, hash: String) {
        self.state.config_hash = Some(hash);
    }

    /// Marks `page` done together with its settled units and persists the state
    ///
    /// Calling this twice with the same arguments leaves the same bytes on disk
    /// as calling it once.
    pub fn commit(
        &mut self,
        page: u32,
        completed: &[String],
        abandoned: &[String],
    ) -> ProgressResult<()> {
        self.state.record_page(page, completed, abandoned);
        self.persist()
    }

    /// Reopens pages with abandoned units and persists the state
    pub fn requeue_abandoned(&mut self) -> ProgressResult<Vec<u32>> {
        let pages = self.state.requeue_abandoned();
        self.persist()?;
        Ok(pages)
    }

    /// Writes the full state with write-to-temp-then-rename
    pub fn persist(&self) -> ProgressResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut temp, &self.state).map_err(ProgressError::Serialize)?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| ProgressError::Io(e.error))?;

        tracing::trace!(
            "Saved progress to {} ({} pages, {} units)",
            self.path.display(),
            self.state.completed_pages.len(),
            self.state.completed_units.len()
        );
        Ok(())
    }
}
