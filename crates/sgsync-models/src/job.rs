use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use crate::flag::EpisodeFlagValue;
use crate::list::ListItemRef;
use crate::movie::{MovieFlag, MovieId};
use crate::show::{EpisodeNumber, ShowId};

/// Local, monotonically increasing job id. Creation order equals id order.
pub type JobId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobAction {
    EpisodeWatched,
    EpisodeCollected,
    MovieCollection,
    MovieWatchlist,
    MovieWatched,
    ListItemsAdd,
    ListItemsRemove,
    ListDelete,
}

impl std::fmt::Display for JobAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobAction::EpisodeWatched => "episode_watched",
            JobAction::EpisodeCollected => "episode_collected",
            JobAction::MovieCollection => "movie_collection",
            JobAction::MovieWatchlist => "movie_watchlist",
            JobAction::MovieWatched => "movie_watched",
            JobAction::ListItemsAdd => "list_items_add",
            JobAction::ListItemsRemove => "list_items_remove",
            JobAction::ListDelete => "list_delete",
        };
        f.write_str(name)
    }
}

/// A queued local change waiting to be sent to every configured remote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingJob {
    pub id: JobId,
    pub action: JobAction,
    pub created_at: DateTime<Utc>,
    pub payload: Vec<u8>, // serde_json encoded, shape depends on action
}

impl PendingJob {
    pub fn decode<P: DeserializeOwned>(&self) -> serde_json::Result<P> {
        serde_json::from_slice(&self.payload)
    }
}

/// A job before the store has assigned its id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewJob {
    pub action: JobAction,
    pub created_at: DateTime<Utc>,
    pub payload: Vec<u8>,
}

impl NewJob {
    pub fn encode<P: Serialize>(action: JobAction, payload: &P) -> serde_json::Result<Self> {
        Ok(Self {
            action,
            created_at: Utc::now(),
            payload: serde_json::to_vec(payload)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeFlagPayload {
    pub show_id: ShowId,
    pub value: EpisodeFlagValue,
    pub episodes: Vec<EpisodeNumber>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieFlagPayload {
    pub movie_id: MovieId,
    pub flag: MovieFlag,
    pub value: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListItemsPayload {
    pub list_id: String,
    pub items: Vec<ListItemRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListDeletePayload {
    pub list_id: String,
}
