use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::flag::EpisodeFlagValue;
use crate::list::{ListEntity, ListItem, ListItemType};
use crate::movie::{MovieFlag, MovieId};
use crate::show::{EpisodeId, EpisodeNumber, SeasonId, ShowId, ShowStatus};

/// One show as a remote reports its flagged episodes.
///
/// `show_id` is optional because remotes key shows by their own ids; records
/// that cannot be mapped to a local show id are malformed and skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteShowFlags {
    pub show_id: Option<ShowId>,
    #[serde(default)]
    pub trakt_id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub last_watched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seasons: Vec<RemoteSeasonFlags>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteSeasonFlags {
    pub number: u32,
    pub episodes: Vec<u32>,
}

/// A flag change to send to a remote, either from the job queue or from a
/// first-sync upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeFlagChange {
    pub show_id: ShowId,
    pub trakt_id: Option<u64>,
    pub value: EpisodeFlagValue,
    pub episodes: Vec<EpisodeNumber>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieFlagChange {
    pub movie_id: MovieId,
    pub flag: MovieFlag,
    pub value: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteMovie {
    pub tmdb_id: Option<MovieId>,
    #[serde(default)]
    pub trakt_id: Option<u64>,
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Per-kind timestamps of the last change a remote has recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LastActivity {
    pub episodes_watched_at: Option<DateTime<Utc>>,
    pub episodes_collected_at: Option<DateTime<Utc>>,
    pub movies_watched_at: Option<DateTime<Utc>>,
    pub movies_collected_at: Option<DateTime<Utc>>,
    pub movies_watchlisted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteList {
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order: Option<i32>,
    #[serde(default)]
    pub items: Vec<RemoteListItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteListItem {
    pub ref_id: Option<u32>,
    pub item_type: Option<ListItemType>,
}

/// A local list with its items, as uploaded to the cloud.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListUpload {
    pub list: ListEntity,
    pub items: Vec<ListItem>,
}

/// Full show metadata as returned by the metadata provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShowDetails {
    pub id: ShowId,
    pub title: String,
    #[serde(default)]
    pub status: ShowStatus,
    #[serde(default)]
    pub release_weekday: Option<u8>,
    #[serde(default)]
    pub release_time: Option<String>,
    #[serde(default)]
    pub release_timezone: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub seasons: Vec<SeasonDetails>,
    #[serde(default)]
    pub episodes: Vec<EpisodeDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeasonDetails {
    pub id: SeasonId,
    pub number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeDetails {
    pub id: EpisodeId,
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
}
