use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// TMDb movie id, the primary movie identity.
pub type MovieId = u32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: MovieId,
    #[serde(default)]
    pub trakt_id: Option<u64>,
    #[serde(default)]
    pub imdb_id: Option<String>,
    /// `None` for shell rows that only carry flags.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub runtime_minutes: Option<u32>,
    #[serde(default)]
    pub watched: bool,
    #[serde(default)]
    pub in_collection: bool,
    #[serde(default)]
    pub in_watchlist: bool,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Movie {
    /// A row holding only flags, for a movie known remotely but not yet fetched.
    pub fn shell(id: MovieId) -> Self {
        Self {
            id,
            trakt_id: None,
            imdb_id: None,
            title: None,
            release_date: None,
            runtime_minutes: None,
            watched: false,
            in_collection: false,
            in_watchlist: false,
            last_updated: None,
        }
    }

    pub fn is_shell(&self) -> bool {
        self.title.is_none()
    }

    pub fn flag(&self, flag: MovieFlag) -> bool {
        match flag {
            MovieFlag::Collection => self.in_collection,
            MovieFlag::Watchlist => self.in_watchlist,
            MovieFlag::Watched => self.watched,
        }
    }

    pub fn set_flag(&mut self, flag: MovieFlag, value: bool) {
        match flag {
            MovieFlag::Collection => self.in_collection = value,
            MovieFlag::Watchlist => self.in_watchlist = value,
            MovieFlag::Watched => self.watched = value,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MovieFlag {
    Collection,
    Watchlist,
    Watched,
}

impl std::fmt::Display for MovieFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MovieFlag::Collection => "collection",
            MovieFlag::Watchlist => "watchlist",
            MovieFlag::Watched => "watched",
        };
        f.write_str(name)
    }
}
