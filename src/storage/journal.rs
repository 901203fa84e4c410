//! Settlement journal.
//!
//! A computed settlement is written here before any record is persisted
//! and deleted once the round's completion record is written. Entries left
//! behind (crash, store outage) are replayed at startup, so persistence is
//! retried over the same figures instead of recomputing against balances
//! that may already have been updated.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::engine::settlement::Settlement;

/// One JSON file per unpersisted round, inside `dir`.
#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    /// Open (creating if needed) a journal directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create journal directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a settlement, replacing any previous entry for the round.
    pub fn record(&self, settlement: &Settlement) -> Result<()> {
        let path = self.path_for(&settlement.round_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(settlement)
            .context("Failed to serialise settlement")?;

        std::fs::write(&tmp, &json)
            .with_context(|| format!("Failed to write journal entry {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to commit journal entry {}", path.display()))?;

        debug!(round_id = %settlement.round_id, path = %path.display(), "Settlement journaled");
        Ok(())
    }

    /// Load every journaled settlement, ordered by file name.
    pub fn load_all(&self) -> Result<Vec<Settlement>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read journal directory {}", self.dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut settlements = Vec::with_capacity(paths.len());
        for path in paths {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read journal entry {}", path.display()))?;
            let settlement: Settlement = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse journal entry {}", path.display()))?;
            settlements.push(settlement);
        }

        if !settlements.is_empty() {
            info!(count = settlements.len(), dir = %self.dir.display(), "Journaled settlements found");
        }
        Ok(settlements)
    }

    /// Delete the entry for a round. Missing entries are fine.
    pub fn remove(&self, round_id: &str) -> Result<()> {
        let path = self.path_for(round_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete journal entry {}", path.display()))?;
        } else {
            warn!(round_id, "No journal entry to remove");
        }
        Ok(())
    }

    fn path_for(&self, round_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(round_id)))
    }
}

/// Escape a round id into a file-name-safe stem.
fn file_stem(round_id: &str) -> String {
    let mut stem = String::with_capacity(round_id.len());
    for b in round_id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            stem.push(b as char);
        } else {
            stem.push_str(&format!("%{b:02X}"));
        }
    }
    stem
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
