use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// 7 days of samples at a 5 minute cadence.
pub const DEFAULT_MAX_ENTRIES: usize = 7 * 24 * 12;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("failed to serialize obstruction log: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ObstructionSample {
    pub timestamp: String,
    pub obstruction_fraction: f64,
    pub obstruction_percent: f64,
}

impl ObstructionSample {
    pub fn new(obstruction_fraction: f64, at: DateTime<Utc>) -> Self {
        Self {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Secs, true),
            obstruction_fraction,
            obstruction_percent: percent(obstruction_fraction),
        }
    }
}

/// Fraction as a percentage rounded to 3 decimals, half away from zero on
/// the f64 product (`f64::round`), not banker's rounding.
pub fn percent(fraction: f64) -> f64 {
    (fraction * 100.0 * 1000.0).round() / 1000.0
}

/// Rolling obstruction history kept as one JSON array on disk.
///
/// Every append rewrites the whole file through a temp file and a rename, so
/// a reader sees either the old array or the new one. A missing file or one
/// that is not a JSON array is treated as an empty history. Elements of the
/// array that are not samples are carried along untouched.
pub struct ObstructionLog {
    path: PathBuf,
    max_entries: usize,
    write_lock: Mutex<()>,
}

impl ObstructionLog {
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries: max_entries.max(1),
            write_lock: Mutex::new(()),
        }
    }

    /// Decodable samples, oldest first. Foreign elements are skipped.
    pub fn load(&self) -> Vec<ObstructionSample> {
        self.read_entries()
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect()
    }

    fn read_entries(&self) -> Vec<Value> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                log::warn!("[LOG] {} unreadable, starting empty: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                log::warn!("[LOG] {} is not an array, starting empty", self.path.display());
                Vec::new()
            }
            Err(e) => {
                log::warn!("[LOG] {} is not valid JSON, starting empty: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Append one sample, dropping the oldest entries beyond the bound.
    /// Returns the number of entries retained.
    pub fn append(&self, sample: ObstructionSample) -> Result<usize, LogError> {
        // Serializes read-modify-write between writers sharing this store.
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut entries = self.read_entries();
        entries.push(serde_json::to_value(&sample)?);
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }

        self.save(&entries)?;
        Ok(entries.len())
    }

    fn save(&self, entries: &[Value]) -> Result<(), LogError> {
        let json = serde_json::to_string_pretty(entries)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LogError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(|source| LogError::Write {
            path: temp_path.clone(),
            source,
        })?;
        fs::rename(&temp_path, &self.path).map_err(|source| LogError::Write {
            path: self.path.clone(),
            source,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn timestamps(samples: &[ObstructionSample]) -> Vec<&str> {
        samples.iter().map(|s| s.timestamp.as_str()).collect()
    }

    fn sample(n: usize) -> ObstructionSample {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(5 * n as i64);
        ObstructionSample::new(n as f64 / 10_000.0, at)
    }

    #[test]
    fn test_sample_fields() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 12, 5, 0).unwrap();
        let s = ObstructionSample::new(0.123456, at);
        assert_eq!(s.timestamp, "2026-03-04T12:05:00Z");
        assert_relative_eq!(s.obstruction_percent, 12.346);
    }

    #[test]
    fn test_append_creates_file() {
        let dir = TempDir::new().unwrap();
        let log = ObstructionLog::new(dir.path().join("nested/obstruction.json"), DEFAULT_MAX_ENTRIES);

        assert!(log.load().is_empty());
        assert_eq!(log.append(sample(1)).unwrap(), 1);
        assert_eq!(log.append(sample(2)).unwrap(), 2);

        let loaded = log.load();
        assert_eq!(timestamps(&loaded), timestamps(&[sample(1), sample(2)]));
        assert!(!dir.path().join("nested/obstruction.json.tmp").exists());
    }

    #[test]
    fn test_bound_keeps_most_recent_in_order() {
        let dir = TempDir::new().unwrap();
        let log = ObstructionLog::new(dir.path().join("obstruction.json"), DEFAULT_MAX_ENTRIES);

        for n in 0..2020 {
            log.append(sample(n)).unwrap();
        }

        let loaded = log.load();
        assert_eq!(loaded.len(), 2016);
        assert_eq!(loaded[0].timestamp, sample(4).timestamp);
        assert_eq!(loaded[2015].timestamp, sample(2019).timestamp);
        assert!(loaded.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("obstruction.json");

        for content in ["{\"not\": \"an array\"}", "\"text\"", "garbage {"] {
            fs::write(&path, content).unwrap();
            let log = ObstructionLog::new(&path, DEFAULT_MAX_ENTRIES);
            assert_eq!(log.append(sample(7)).unwrap(), 1);
            assert_eq!(timestamps(&log.load()), vec![sample(7).timestamp.as_str()]);
        }
    }

    #[test]
    fn test_foreign_entries_survive_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("obstruction.json");
        let log = ObstructionLog::new(&path, DEFAULT_MAX_ENTRIES);
        for n in 0..100 {
            log.append(sample(n)).unwrap();
        }

        let mut entries: Vec<Value> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let partial = serde_json::json!({"timestamp": "2026-02-01T00:00:00Z", "obstruction_fraction": 0.02});
        entries.push(partial.clone());
        fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();

        assert_eq!(log.append(sample(200)).unwrap(), 102);

        let on_disk: Vec<Value> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 102);
        assert_eq!(on_disk[100], partial);

        let loaded = log.load();
        assert_eq!(loaded.len(), 101);
        assert_eq!(loaded[0].timestamp, sample(0).timestamp);
        assert_eq!(loaded[100].timestamp, sample(200).timestamp);
    }

    #[test]
    fn test_non_sample_array_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("obstruction.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        let log = ObstructionLog::new(&path, 3);
        assert_eq!(log.append(sample(7)).unwrap(), 3);

        let on_disk: Vec<Value> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk[0], serde_json::json!(2));
        assert_eq!(on_disk[1], serde_json::json!(3));
        assert_eq!(timestamps(&log.load()), vec![sample(7).timestamp.as_str()]);
    }

    #[test]
    fn test_percent_rounding() {
        assert_relative_eq!(percent(0.0001234), 0.012);
        assert_relative_eq!(percent(0.0001251), 0.013);
        assert_relative_eq!(percent(0.0001264), 0.013);
        assert_relative_eq!(percent(-0.123456), -12.346);
        assert_eq!(percent(0.0), 0.0);
    }

    #[test]
    fn test_reopen_after_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("obstruction.json");

        ObstructionLog::new(&path, 3).append(sample(1)).unwrap();
        let reopened = ObstructionLog::new(&path, 3);
        reopened.append(sample(2)).unwrap();
        reopened.append(sample(3)).unwrap();
        reopened.append(sample(4)).unwrap();

        assert_eq!(
            timestamps(&reopened.load()),
            timestamps(&[sample(2), sample(3), sample(4)])
        );
    }

    #[test]
    fn test_percent_survives_round_trip() {
        let dir = TempDir::new().unwrap();
        let log = ObstructionLog::new(dir.path().join("obstruction.json"), 10);
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 8, 30, 0).unwrap();

        log.append(ObstructionSample::new(0.0345678, at)).unwrap();

        let loaded = &log.load()[0];
        assert_relative_eq!(loaded.obstruction_percent, percent(loaded.obstruction_fraction));
        assert_relative_eq!(loaded.obstruction_percent, 3.457);
    }

    #[test]
    fn test_unwritable_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let log = ObstructionLog::new(blocker.join("obstruction.json"), 10);
        assert!(matches!(log.append(sample(1)), Err(LogError::Write { .. })));
    }
}
