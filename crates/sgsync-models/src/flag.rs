use serde::{Deserialize, Serialize};
use crate::show::WatchedState;

/// Episode flags that are reconciled with remotes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FlagKind {
    Watched,
    Collected,
}

impl FlagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagKind::Watched => "watched",
            FlagKind::Collected => "collected",
        }
    }
}

impl std::fmt::Display for FlagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// New value of an episode flag, carried by jobs and uploads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EpisodeFlagValue {
    Watched(WatchedState),
    Collected(bool),
}

impl EpisodeFlagValue {
    pub fn kind(self) -> FlagKind {
        match self {
            EpisodeFlagValue::Watched(_) => FlagKind::Watched,
            EpisodeFlagValue::Collected(_) => FlagKind::Collected,
        }
    }

    /// Whether the flag ends up set, as a remote without a skipped state sees it.
    pub fn is_set(self) -> bool {
        match self {
            EpisodeFlagValue::Watched(state) => state.is_watched(),
            EpisodeFlagValue::Collected(collected) => collected,
        }
    }
}
