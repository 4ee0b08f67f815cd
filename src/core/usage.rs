use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::{ChatError, Tool};

const SECS_PER_DAY: u64 = 86_400;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct DailyCount {
    day: u64,
    count: u32,
}

/// Per-tool daily message counters kept in a small JSON file.
///
/// Counts reset when the UTC day changes. A limit of `0` means unlimited.
#[derive(Debug)]
pub struct UsageTracker {
    path: PathBuf,
    counts: BTreeMap<String, DailyCount>,
}

impl UsageTracker {
    /// Reads the counters at `path`. A missing file starts from zero.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ChatError> {
        let path = path.into();
        let counts = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                ChatError::ConfigError(format!(
                    "Failed to parse usage file {}: {e}",
                    path.display()
                ))
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, counts })
    }

    /// Messages sent with `tool` today.
    pub fn used_today(&self, tool: Tool) -> u32 {
        self.used_on(tool, today())
    }

    pub fn check(&self, tool: Tool, limit: u32) -> Result<(), ChatError> {
        self.check_on(tool, limit, today())
    }

    /// Counts one message against today's quota and saves the file.
    /// Returns the new count.
    pub fn record(&mut self, tool: Tool) -> Result<u32, ChatError> {
        self.record_on(tool, today())
    }

    fn used_on(&self, tool: Tool, day: u64) -> u32 {
        self.counts
            .get(tool.as_str())
            .filter(|entry| entry.day == day)
            .map_or(0, |entry| entry.count)
    }

    fn check_on(&self, tool: Tool, limit: u32, day: u64) -> Result<(), ChatError> {
        if limit > 0 && self.used_on(tool, day) >= limit {
            return Err(ChatError::UsageLimit {
                tool: tool.to_string(),
                limit,
            });
        }
        Ok(())
    }

    fn record_on(&mut self, tool: Tool, day: u64) -> Result<u32, ChatError> {
        let entry = self.counts.entry(tool.as_str().to_string()).or_default();
        if entry.day != day {
            *entry = DailyCount { day, count: 0 };
        }
        entry.count += 1;
        let count = entry.count;

        self.save()?;
        debug!("[Usage] {tool}: {count} today");
        Ok(count)
    }

    /// Writes to a sibling temp file first so a crash never leaves a
    /// truncated file behind.
    fn save(&self) -> Result<(), ChatError> {
        let contents = serde_json::to_string_pretty(&self.counts)
            .map_err(|e| ChatError::IOError(format!("Failed to serialize usage: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn today() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() / SECS_PER_DAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tracker() -> (TempDir, UsageTracker) {
        let dir = tempfile::tempdir().unwrap();
        let tracker = UsageTracker::load(dir.path().join("usage.json")).unwrap();
        (dir, tracker)
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let (_dir, tracker) = tracker();
        assert_eq!(tracker.used_today(Tool::Chat), 0);
        assert!(tracker.check(Tool::Chat, 1).is_ok());
    }

    #[test]
    fn test_limit_reached() {
        let (_dir, mut tracker) = tracker();
        assert_eq!(tracker.record_on(Tool::Chat, 10).unwrap(), 1);
        assert_eq!(tracker.record_on(Tool::Chat, 10).unwrap(), 2);

        assert!(tracker.check_on(Tool::Chat, 3, 10).is_ok());
        assert!(matches!(
            tracker.check_on(Tool::Chat, 2, 10),
            Err(ChatError::UsageLimit { limit: 2, .. })
        ));
        // other tools keep their own quota
        assert!(tracker.check_on(Tool::Interview, 2, 10).is_ok());
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let (_dir, mut tracker) = tracker();
        for _ in 0..5 {
            tracker.record_on(Tool::Interview, 3).unwrap();
        }
        assert!(tracker.check_on(Tool::Interview, 0, 3).is_ok());
    }

    #[test]
    fn test_count_resets_on_new_day() {
        let (_dir, mut tracker) = tracker();
        tracker.record_on(Tool::Chat, 10).unwrap();
        tracker.record_on(Tool::Chat, 10).unwrap();

        assert_eq!(tracker.used_on(Tool::Chat, 11), 0);
        assert_eq!(tracker.record_on(Tool::Chat, 11).unwrap(), 1);
    }

    #[test]
    fn test_counts_survive_reload() {
        let (dir, mut tracker) = tracker();
        tracker.record_on(Tool::Chat, 42).unwrap();
        tracker.record_on(Tool::Chat, 42).unwrap();

        let reloaded = UsageTracker::load(dir.path().join("usage.json")).unwrap();
        assert_eq!(reloaded.used_on(Tool::Chat, 42), 2);
        assert!(!dir.path().join("usage.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            UsageTracker::load(&path),
            Err(ChatError::ConfigError(_))
        ));
    }
}
