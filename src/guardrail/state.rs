//! Persisted guardrail state
//!
//! Three plain JSON records under the state directory: a halt marker, a
//! daily transaction counter, and a portfolio-value time series. Files are
//! written via temp-file-then-rename so an overlapping invocation (a cron
//! heartbeat racing a manual rebalance) never observes a torn write.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Halt marker contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaltMarker {
    pub halted_at: String,
    pub reason: String,
}

/// Daily transaction counter, keyed by UTC date
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxCounter {
    pub date: String,
    pub count: u32,
}

/// One recorded portfolio-value sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSnapshot {
    pub value_usd: f64,
    pub timestamp: String,
}

/// Portfolio-value time series with the all-time starting baseline.
///
/// The BTreeMap keys are `%Y-%m-%d` UTC dates, which sort
/// chronologically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueHistory {
    pub start_value_usd: f64,
    pub daily: BTreeMap<String, ValueSnapshot>,
}

/// Today's UTC date in the state-file key format
pub fn utc_today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Disk-backed guardrail state
pub struct StateStore {
    dir: PathBuf,
    halt_file: String,
}

impl StateStore {
    /// Open the state directory, creating it on first use
    pub fn open(dir: &Path, halt_file: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| Error::StatePersistence(format!("Cannot create {}: {}", dir.display(), e)))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            halt_file: halt_file.to_string(),
        })
    }

    pub fn halt_path(&self) -> PathBuf {
        self.dir.join(&self.halt_file)
    }

    fn tx_count_path(&self) -> PathBuf {
        self.dir.join("tx_count.json")
    }

    fn history_path(&self) -> PathBuf {
        self.dir.join("value_history.json")
    }

    // ------------------------------------------------------------------
    // Halt marker
    // ------------------------------------------------------------------

    pub fn is_halted(&self) -> bool {
        self.halt_path().exists()
    }

    pub fn halt_marker(&self) -> Option<HaltMarker> {
        let content = fs::read_to_string(self.halt_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn write_halt(&self, reason: &str) -> Result<()> {
        let marker = HaltMarker {
            halted_at: Utc::now().to_rfc3339(),
            reason: reason.to_string(),
        };
        self.write_atomic(&self.halt_path(), &serde_json::to_vec(&marker)?)
    }

    pub fn clear_halt(&self) -> Result<()> {
        let path = self.halt_path();
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| Error::StatePersistence(format!("Cannot remove halt marker: {}", e)))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Daily transaction counter
    // ------------------------------------------------------------------

    pub fn load_tx_counter(&self) -> Result<TxCounter> {
        load_json_or_default(&self.tx_count_path())
    }

    pub fn save_tx_counter(&self, counter: &TxCounter) -> Result<()> {
        self.write_atomic(&self.tx_count_path(), &serde_json::to_vec(counter)?)
    }

    // ------------------------------------------------------------------
    // Portfolio-value history
    // ------------------------------------------------------------------

    pub fn load_history(&self) -> Result<ValueHistory> {
        load_json_or_default(&self.history_path())
    }

    pub fn save_history(&self, history: &ValueHistory) -> Result<()> {
        self.write_atomic(&self.history_path(), &serde_json::to_vec_pretty(history)?)
    }

    // ------------------------------------------------------------------

    /// Write a file through a temp sibling + rename
    pub fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)
            .map_err(|e| Error::StatePersistence(format!("Cannot write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, path)
            .map_err(|e| Error::StatePersistence(format!("Cannot rename into {}: {}", path.display(), e)))?;
        Ok(())
    }
}

fn load_json_or_default<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| Error::StatePersistence(format!("Cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::StatePersistence(format!("Corrupt state file {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_halt_marker_lifecycle() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path(), "halt.flag").unwrap();

        assert!(!store.is_halted());
        store.write_halt("testing").unwrap();
        assert!(store.is_halted());

        let marker = store.halt_marker().unwrap();
        assert_eq!(marker.reason, "testing");

        store.clear_halt().unwrap();
        assert!(!store.is_halted());
        // Clearing twice is fine
        store.clear_halt().unwrap();
    }

    #[test]
    fn test_counter_roundtrip() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path(), "halt.flag").unwrap();

        let empty = store.load_tx_counter().unwrap();
        assert_eq!(empty.count, 0);
        assert!(empty.date.is_empty());

        store
            .save_tx_counter(&TxCounter {
                date: "2026-08-05".into(),
                count: 3,
            })
            .unwrap();
        let loaded = store.load_tx_counter().unwrap();
        assert_eq!(loaded.count, 3);
        assert_eq!(loaded.date, "2026-08-05");
    }

    #[test]
    fn test_history_sorted_keys() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path(), "halt.flag").unwrap();

        let mut history = ValueHistory {
            start_value_usd: 100.0,
            daily: BTreeMap::new(),
        };
        for (date, value) in [("2026-01-03", 3.0), ("2026-01-01", 1.0), ("2026-01-02", 2.0)] {
            history.daily.insert(
                date.into(),
                ValueSnapshot {
                    value_usd: value,
                    timestamp: String::new(),
                },
            );
        }
        store.save_history(&history).unwrap();

        let loaded = store.load_history().unwrap();
        let keys: Vec<_> = loaded.daily.keys().cloned().collect();
        assert_eq!(keys, vec!["2026-01-01", "2026-01-02", "2026-01-03"]);
    }

    #[test]
    fn test_atomic_write_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path(), "halt.flag").unwrap();
        store.write_halt("x").unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
    }
}
