use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ShowId = u32;
pub type SeasonId = u32;
pub type EpisodeId = u32;

/// Season number used for specials; they never count towards the next episode.
pub const SPECIALS_SEASON: u32 = 0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ShowStatus {
    Continuing,
    Ended,
    Upcoming,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Show {
    pub id: ShowId,
    pub title: String,
    pub status: ShowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_weekday: Option<u8>, // 1 = Monday .. 7 = Sunday
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_time: Option<String>, // "HH:MM" in release_timezone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Resolved lazily; shows only known to the metadata provider have none.
    #[serde(default)]
    pub trakt_id: Option<u64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_edited: Option<DateTime<Utc>>,
    /// Milliseconds since the epoch of the most recent watch, as reported by a remote.
    #[serde(default)]
    pub last_watched_ms: Option<i64>,
    // Derived values, recomputed when the store is notified of changes
    #[serde(default)]
    pub unwatched_count: u32,
    #[serde(default)]
    pub next_episode: Option<EpisodeId>,
}

impl Show {
    pub fn new(id: ShowId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            status: ShowStatus::Unknown,
            release_weekday: None,
            release_time: None,
            release_timezone: None,
            language: None,
            trakt_id: None,
            last_updated: None,
            last_edited: None,
            last_watched_ms: None,
            unwatched_count: 0,
            next_episode: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Season {
    pub id: SeasonId,
    pub show_id: ShowId,
    pub number: u32,
}

/// Tri-state watched flag, stored as a single integer.
///
/// Skipped is a local-only state: remotes only know watched or not watched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum WatchedState {
    #[default]
    Unwatched,
    Watched,
    Skipped,
}

impl WatchedState {
    pub fn as_i32(self) -> i32 {
        match self {
            WatchedState::Unwatched => 0,
            WatchedState::Watched => 1,
            WatchedState::Skipped => 2,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(WatchedState::Unwatched),
            1 => Some(WatchedState::Watched),
            2 => Some(WatchedState::Skipped),
            _ => None,
        }
    }

    pub fn is_watched(self) -> bool {
        self == WatchedState::Watched
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Episode {
    pub id: EpisodeId,
    pub show_id: ShowId,
    pub season_id: SeasonId,
    pub season: u32,
    pub number: u32,
    #[serde(default)]
    pub absolute_number: Option<u32>,
    #[serde(default)]
    pub dvd_number: Option<f64>,
    pub title: String,
    #[serde(default)]
    pub first_aired: Option<DateTime<Utc>>,
    #[serde(default)]
    pub watched: WatchedState,
    #[serde(default)]
    pub collected: bool,
    #[serde(default)]
    pub last_edited: Option<DateTime<Utc>>,
}

impl Episode {
    pub fn flags(&self) -> EpisodeFlags {
        EpisodeFlags {
            id: self.id,
            number: self.number,
            watched: self.watched,
            collected: self.collected,
        }
    }
}

/// Flag columns of one episode, as returned by per-season queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeFlags {
    pub id: EpisodeId,
    pub number: u32,
    pub watched: WatchedState,
    pub collected: bool,
}

/// Season/episode number pair identifying an episode within a show.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpisodeNumber {
    pub season: u32,
    pub number: u32,
}

impl EpisodeNumber {
    pub fn new(season: u32, number: u32) -> Self {
        Self { season, number }
    }
}

impl std::fmt::Display for EpisodeNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{:02}E{:02}", self.season, self.number)
    }
}
