//! Corruption injection and the consistency check.
//!
//! `bug` breaks the first link of a file's chain, `check` looks for broken
//! chains. Both drive the sticky `corrupted` flag of the image; nothing is
//! ever repaired, only reformatting gets rid of the damage.

use crate::config::*;
use crate::{BlockDevice, Error, FileSystem, Result};

/// Outcome of a consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Absolute paths of files whose chain hits a bad cluster or never ends.
    pub corrupted_files: Vec<String>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.corrupted_files.is_empty()
    }
}

impl<D: BlockDevice> FileSystem<D> {
    /// Marks the first cluster of a file as bad.
    pub fn bug(&mut self, path: &str) -> Result<()> {
        let node = self.locate_file(path)?;
        let start = node.start_cluster;
        if start == NO_CLUSTER || self.fat1.chain(start)?.is_empty() {
            return Err(Error::NothingToCorrupt(path.to_string()));
        }
        self.fat1.mark_bad(start)?;
        self.corrupted = true;
        self.save()?;
        log::warn!("bug: cluster {} of {} marked bad", start, path);
        Ok(())
    }

    /// Walks every file of the tree and checks its chain.
    /// Sets the corrupted flag when anything is found and clears it otherwise.
    pub fn check(&mut self) -> CheckReport {
        let mut report = CheckReport::default();
        let fat = &self.fat1;
        self.root.walk_files("", &mut |path, item| {
            // a chain that never ends counts as broken too
            if fat.chain_has_bad(item.start_cluster).unwrap_or(true) {
                report.corrupted_files.push(path.to_string());
            }
        });

        self.corrupted = !report.is_clean();
        for path in &report.corrupted_files {
            log::warn!("check: {} is corrupted", path);
        }
        log::debug!("check: {} corrupted files", report.corrupted_files.len());
        report
    }
}
