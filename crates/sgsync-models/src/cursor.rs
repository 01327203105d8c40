use serde::{Deserialize, Serialize};

/// Data kinds that carry their own last-synchronized timestamp.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CursorKind {
    EpisodesWatched,
    EpisodesCollected,
    MoviesWatched,
    MoviesCollected,
    MoviesWatchlisted,
    ListsChanged,
}

impl CursorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CursorKind::EpisodesWatched => "episodes_watched",
            CursorKind::EpisodesCollected => "episodes_collected",
            CursorKind::MoviesWatched => "movies_watched",
            CursorKind::MoviesCollected => "movies_collected",
            CursorKind::MoviesWatchlisted => "movies_watchlisted",
            CursorKind::ListsChanged => "lists_changed",
        }
    }

    pub fn all() -> [CursorKind; 6] {
        [
            CursorKind::EpisodesWatched,
            CursorKind::EpisodesCollected,
            CursorKind::MoviesWatched,
            CursorKind::MoviesCollected,
            CursorKind::MoviesWatchlisted,
            CursorKind::ListsChanged,
        ]
    }
}

impl std::fmt::Display for CursorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
