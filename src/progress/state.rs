/// Progress state definitions for resumable harvesting
///
/// This module defines the checkpoint value that records which pages and
/// units a harvest has already finished.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which pages and units are already processed
///
/// A page number is only ever in `completed_pages` when every unit it
/// contained is in `completed_units` or in `abandoned_units`. Sets are kept
/// ordered so identical states serialize to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    #[serde(default)]
    pub completed_pages: BTreeSet<u32>,

    #[serde(default)]
    pub completed_units: BTreeSet<String>,

    /// Units that failed permanently, with the page they were listed on
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub abandoned_units: BTreeMap<String, u32>,

    /// Hash of the configuration that produced this state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

impl ProgressState {
    /// Creates an empty state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_page_done(&self, page: u32) -> bool {
        self.completed_pages.contains(&page)
    }

    pub fn is_unit_done(&self, id: &str) -> bool {
        self.completed_units.contains(id)
    }

    pub fn is_unit_abandoned(&self, id: &str) -> bool {
        self.abandoned_units.contains_key(id)
    }

    /// Records a settled page
    ///
    /// Re-adding identifiers that are already present is a no-op. A unit that
    /// completes after having been abandoned stops being abandoned.
    pub fn record_page(&mut self, page: u32, completed: &[String], abandoned: &[String]) {
        for id in completed {
            self.abandoned_units.remove(id);
            self.completed_units.insert(id.clone());
        }
        for id in abandoned {
            if !self.completed_units.contains(id) {
                self.abandoned_units.insert(id.clone(), page);
            }
        }
        self.completed_pages.insert(page);
    }

    /// Reopens every page that holds an abandoned unit
    ///
    /// Returns the reopened page numbers in ascending order. The next run
    /// fetches those pages again and, since completed units are skipped, only
    /// the previously abandoned units are downloaded.
    pub fn requeue_abandoned(&mut self) -> Vec<u32> {
        let pages: BTreeSet<u32> = self.abandoned_units.values().copied().collect();
        for page in &pages {
            self.completed_pages.remove(page);
        }
        self.abandoned_units.clear();
        pages.into_iter().collect()
    }
}
