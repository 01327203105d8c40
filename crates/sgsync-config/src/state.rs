use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sgsync_models::CursorKind;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::debug;

/// Keys of the one-time merge flags. Once set, the matching data kind is
/// mirrored instead of merged.
pub mod merge_keys {
    pub const TRAKT_EPISODES_WATCHED: &str = "trakt.episodes.watched";
    pub const TRAKT_EPISODES_COLLECTED: &str = "trakt.episodes.collected";
    pub const TRAKT_MOVIES: &str = "trakt.movies";
    pub const CLOUD_EPISODES_WATCHED: &str = "cloud.episodes.watched";
    pub const CLOUD_EPISODES_COLLECTED: &str = "cloud.episodes.collected";
    pub const CLOUD_LISTS: &str = "cloud.lists";
}

// Scalars first so the TOML output never puts a value after a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SyncStateData {
    #[serde(default)]
    consecutive_failures: u32,
    #[serde(default)]
    last_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    last_success: Option<DateTime<Utc>>,
    #[serde(default)]
    merged: BTreeSet<String>,
    #[serde(default)]
    cursors: BTreeMap<String, DateTime<Utc>>,
}

/// Persisted sync bookkeeping: per-source cursors, merge flags and the
/// consecutive failure counter.
pub struct SyncStateStore {
    path: Option<PathBuf>,
    data: SyncStateData,
}

fn cursor_key(source: &str, kind: CursorKind) -> String {
    format!("{}.{}", source, kind.as_str())
}

impl SyncStateStore {
    /// Load from `path`, starting empty when the file does not exist yet.
    pub fn open(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            SyncStateData::default()
        };
        Ok(Self { path: Some(path), data })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: SyncStateData::default(),
        }
    }

    pub fn save(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&self.data)?;
        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;
        debug!(path = %path.display(), "saved sync state");
        Ok(())
    }

    pub fn cursor(&self, source: &str, kind: CursorKind) -> Option<DateTime<Utc>> {
        self.data.cursors.get(&cursor_key(source, kind)).copied()
    }

    pub fn set_cursor(&mut self, source: &str, kind: CursorKind, at: DateTime<Utc>) {
        self.data.cursors.insert(cursor_key(source, kind), at);
    }

    /// Forget one cursor so the next pass reconciles unconditionally.
    pub fn reset_cursor(&mut self, source: &str, kind: CursorKind) {
        self.data.cursors.remove(&cursor_key(source, kind));
    }

    /// True when the remote reports a change newer than the stored cursor,
    /// or when either side is unknown.
    pub fn has_changed_since_cursor(&self, source: &str, kind: CursorKind, remote_at: Option<DateTime<Utc>>) -> bool {
        match (self.cursor(source, kind), remote_at) {
            (Some(cursor), Some(remote_at)) => remote_at > cursor,
            _ => true,
        }
    }

    pub fn cursors(&self) -> impl Iterator<Item = (&str, &DateTime<Utc>)> {
        self.data.cursors.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn clear_cursors(&mut self) {
        self.data.cursors.clear();
    }

    pub fn is_merged(&self, key: &str) -> bool {
        self.data.merged.contains(key)
    }

    pub fn set_merged(&mut self, key: &str) {
        self.data.merged.insert(key.to_string());
    }

    pub fn merged_keys(&self) -> impl Iterator<Item = &str> {
        self.data.merged.iter().map(String::as_str)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.data.consecutive_failures
    }

    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.data.last_attempt
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.data.last_success
    }

    pub fn record_attempt(&mut self, at: DateTime<Utc>) {
        self.data.last_attempt = Some(at);
    }

    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.data.consecutive_failures = 0;
        self.data.last_success = Some(at);
    }

    /// Returns the new consecutive failure count.
    pub fn record_failure(&mut self) -> u32 {
        self.data.consecutive_failures = self.data.consecutive_failures.saturating_add(1);
        self.data.consecutive_failures
    }

    /// Forget everything, as if no sync had ever run.
    pub fn clear_all(&mut self) {
        self.data = SyncStateData::default();
    }
}
