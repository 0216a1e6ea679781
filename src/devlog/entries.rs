use crate::devlog::parse::salvage_entry;
use crate::devlog::util::write_atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    Success,
    Failed,
    Warning,
}

impl EntryStatus {
    pub const ALL: [EntryStatus; 3] = [Self::Success, Self::Failed, Self::Warning];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Warning => "WARNING",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub date: String,
    pub status: EntryStatus,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedEntries {
    pub entries: Vec<LogEntry>,
    /// Why the store, or some of its entries, could not be read as history.
    /// `entries` still holds whatever was salvaged.
    pub corrupt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EntryStore {
    path: PathBuf,
}

impl EntryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing store is empty history. Entries are salvaged
    /// one by one; whatever cannot be read is reported through `corrupt`.
    pub fn load(&self) -> LoadedEntries {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return LoadedEntries::default(),
            Err(err) => {
                return LoadedEntries {
                    entries: Vec::new(),
                    corrupt: Some(err.to_string()),
                };
            }
        };
        if raw.trim().is_empty() {
            return LoadedEntries::default();
        }
        let items = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                return LoadedEntries {
                    entries: Vec::new(),
                    corrupt: Some("store is not a JSON list".to_string()),
                };
            }
            Err(err) => {
                return LoadedEntries {
                    entries: Vec::new(),
                    corrupt: Some(err.to_string()),
                };
            }
        };

        let total = items.len();
        let mut entries = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            match salvage_entry(item, idx) {
                Ok(entry) => entries.push(entry),
                Err(err) => failures.push(err.to_string()),
            }
        }
        let corrupt = failures.first().map(|first| {
            format!(
                "{} of {total} entries unreadable ({first})",
                failures.len()
            )
        });
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        LoadedEntries { entries, corrupt }
    }

    pub fn save(&self, entries: &[LogEntry]) -> Result<()> {
        let data = serde_json::to_string_pretty(entries)?;
        write_atomic(&self.path, format!("{data}\n").as_bytes())
    }

    /// Copy a damaged store aside so the next save does not lose what could
    /// not be salvaged.
    pub fn quarantine(&self, epoch_secs: u64) -> Result<PathBuf> {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "entries".to_string());
        let target = self
            .path
            .with_file_name(format!("{file_name}.corrupt-{epoch_secs}"));
        fs::copy(&self.path, &target).with_context(|| {
            format!(
                "failed to copy {} to {}",
                self.path.display(),
                target.display()
            )
        })?;
        Ok(target)
    }
}

/// Newest-first by date. On equal dates new entries come before existing
/// ones, and each side keeps its own order.
pub fn merge(existing: Vec<LogEntry>, new_entries: Vec<LogEntry>) -> Vec<LogEntry> {
    let mut merged = new_entries;
    merged.extend(existing);
    merged.sort_by(|a, b| b.date.cmp(&a.date));
    merged
}

#[cfg(test)]
pub(crate) fn entry(date: &str, title: &str) -> LogEntry {
    LogEntry {
        date: date.to_string(),
        status: EntryStatus::Success,
        title: title.to_string(),
        content: format!("{title} happened"),
        tags: vec!["#Homelab".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::{EntryStatus, EntryStore, entry, merge};
    use std::fs;
    use tempfile::tempdir;

    fn titles(entries: &[super::LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn merge_interleaves_by_date_descending() {
        let existing = vec![
            entry("2024-01-03 09:00:00", "THIRD"),
            entry("2024-01-01 09:00:00", "FIRST"),
        ];
        let new_entries = vec![entry("2024-01-02 09:00:00", "SECOND")];

        let merged = merge(existing, new_entries);
        assert_eq!(titles(&merged), vec!["THIRD", "SECOND", "FIRST"]);
    }

    #[test]
    fn merge_puts_new_entries_first_on_ties() {
        let existing = vec![entry("2024-05-05 10:00:00", "OLD")];
        let new_entries = vec![
            entry("2024-05-05 10:00:00", "NEW_A"),
            entry("2024-05-05 10:00:00", "NEW_B"),
        ];

        let merged = merge(existing, new_entries);
        assert_eq!(titles(&merged), vec!["NEW_A", "NEW_B", "OLD"]);
    }

    #[test]
    fn load_treats_missing_store_as_empty_history() {
        let tmp = tempdir().expect("tempdir");
        let loaded = EntryStore::new(tmp.path().join("logs.json")).load();
        assert!(loaded.entries.is_empty());
        assert!(loaded.corrupt.is_none());
    }

    #[test]
    fn load_degrades_corrupt_store_to_empty() {
        let tmp = tempdir().expect("tempdir");
        let store = EntryStore::new(tmp.path().join("logs.json"));
        fs::write(store.path(), "[{\"date\": ").expect("write corrupt");

        let loaded = store.load();
        assert!(loaded.entries.is_empty());
        assert!(loaded.corrupt.is_some());
    }

    #[test]
    fn load_salvages_readable_entries_from_a_damaged_store() {
        let tmp = tempdir().expect("tempdir");
        let store = EntryStore::new(tmp.path().join("logs.json"));
        let raw = r##"[
  {"date": "2024-01-02 08:30:00", "status": "SUCCESS", "title": "NEWEST", "content": "a", "tags": ["#x"]},
  {"date": "2024-01-01 08:30:00", "status": "Success", "title": "legacy case", "content": "b"},
  {"date": "2023-12-31 08:30:00", "status": "MYSTERY", "title": "UNKNOWN", "content": "c", "tags": []}
]"##;
        fs::write(store.path(), raw).expect("write store");

        let loaded = store.load();
        assert_eq!(titles(&loaded.entries), vec!["NEWEST", "LEGACY_CASE"]);
        assert!(loaded.entries[1].tags.is_empty());
        let reason = loaded.corrupt.expect("unreadable entry reported");
        assert!(reason.starts_with("1 of 3 entries unreadable"));
    }

    #[test]
    fn save_writes_pretty_json_that_loads_back() {
        let tmp = tempdir().expect("tempdir");
        let store = EntryStore::new(tmp.path().join("logs.json"));
        let entries = vec![entry("2024-02-01 08:30:00", "SYSTEM_REBOOT_INITIATED")];
        store.save(&entries).expect("save");

        let raw = fs::read_to_string(store.path()).expect("read");
        assert!(raw.contains("\n  {\n"));
        assert!(raw.contains("\"status\": \"SUCCESS\""));
        assert_eq!(store.load().entries, entries);
    }

    #[test]
    fn quarantine_keeps_a_copy_of_the_bad_store() {
        let tmp = tempdir().expect("tempdir");
        let store = EntryStore::new(tmp.path().join("logs.json"));
        fs::write(store.path(), "garbage").expect("write corrupt");

        let copy = store.quarantine(1_700_000_000).expect("quarantine");
        assert_eq!(
            copy.file_name().and_then(|n| n.to_str()),
            Some("logs.json.corrupt-1700000000")
        );
        assert_eq!(fs::read_to_string(copy).expect("read copy"), "garbage");
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(EntryStatus::parse(" warning "), Some(EntryStatus::Warning));
        assert_eq!(EntryStatus::parse("FAILED"), Some(EntryStatus::Failed));
        assert_eq!(EntryStatus::parse("PANIC"), None);
    }
}
