use sgsync_models::{
    Episode, EpisodeFlags, EpisodeId, JobId, ListEntity, ListItem, Movie, MovieFlag, MovieId, NewJob, PendingJob,
    Season, SeasonId, Show, ShowId, WatchedState,
};
use crate::error::StoreResult;

/// One write in a batch. Batches are applied in order and all-or-nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// With `only_if_watched`, episodes that are not currently watched keep
    /// their state, so a clear never touches skipped episodes.
    SetEpisodeWatched {
        episode_id: EpisodeId,
        state: WatchedState,
        only_if_watched: bool,
    },
    SetSeasonWatched {
        season_id: SeasonId,
        state: WatchedState,
        only_if_watched: bool,
    },
    /// Specials included.
    SetShowWatched {
        show_id: ShowId,
        state: WatchedState,
        only_if_watched: bool,
    },
    SetEpisodeCollected {
        episode_id: EpisodeId,
        collected: bool,
    },
    SetSeasonCollected {
        season_id: SeasonId,
        collected: bool,
    },
    SetShowCollected {
        show_id: ShowId,
        collected: bool,
    },
    SetShowLastWatched {
        show_id: ShowId,
        last_watched_ms: i64,
    },
    SetShowTraktId {
        show_id: ShowId,
        trakt_id: u64,
    },
    /// Insert, or update the metadata columns of an existing show.
    UpsertShowMetadata(Show),
    UpsertSeason(Season),
    /// Insert, or update an existing episode keeping its flags.
    UpsertEpisodeMetadata(Episode),
    DeleteSeason(SeasonId),
    DeleteEpisode(EpisodeId),
    SetMovieFlag {
        movie_id: MovieId,
        flag: MovieFlag,
        value: bool,
    },
    /// Inserted only if no row with the same id exists.
    InsertMovieShell(Movie),
    UpsertList(ListEntity),
    /// Also removes the list's items.
    DeleteList(String),
    InsertListItem(ListItem),
    DeleteListItem(String),
    InsertJob(NewJob),
    DeleteJobs(Vec<JobId>),
}

/// The local library: shows, seasons, episodes, movies, lists and the
/// pending job queue.
///
/// Reads never block on remote services. Writes go through [`LocalStore::apply_batch`]
/// only, which must apply every operation or none.
pub trait LocalStore: Send + Sync {
    fn show_ids(&self) -> StoreResult<Vec<ShowId>>;
    fn shows(&self) -> StoreResult<Vec<Show>>;
    fn show(&self, show_id: ShowId) -> StoreResult<Option<Show>>;
    fn show_trakt_id(&self, show_id: ShowId) -> StoreResult<Option<u64>>;
    fn last_watched_ms(&self, show_id: ShowId) -> StoreResult<Option<i64>>;

    /// Ordered by season number.
    fn seasons_of_show(&self, show_id: ShowId) -> StoreResult<Vec<Season>>;
    fn season(&self, season_id: SeasonId) -> StoreResult<Option<Season>>;

    /// Ordered by episode number.
    fn episodes_of_season(&self, season_id: SeasonId) -> StoreResult<Vec<EpisodeFlags>>;
    /// Ordered by season, then episode number.
    fn episodes_of_show(&self, show_id: ShowId) -> StoreResult<Vec<Episode>>;
    fn episode(&self, episode_id: EpisodeId) -> StoreResult<Option<Episode>>;

    fn movies(&self) -> StoreResult<Vec<Movie>>;
    fn movie(&self, movie_id: MovieId) -> StoreResult<Option<Movie>>;

    fn lists(&self) -> StoreResult<Vec<ListEntity>>;
    fn list_items(&self, list_id: &str) -> StoreResult<Vec<ListItem>>;

    /// Oldest first.
    fn pending_jobs(&self) -> StoreResult<Vec<PendingJob>>;

    fn apply_batch(&self, ops: Vec<StoreOp>) -> StoreResult<()>;

    /// Recompute derived show values after flags changed.
    fn notify_changed(&self, show_ids: &[ShowId]) -> StoreResult<()>;
}
