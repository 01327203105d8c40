use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sgsync_models::{
    Episode, EpisodeFlagChange, EpisodeId, EpisodeNumber, FlagKind, LastActivity, ListItemRef, ListUpload,
    MovieFlag, MovieFlagChange, MovieId, RemoteList, RemoteMovie, RemoteSeasonFlags, RemoteShowFlags, Season,
    SeasonId, Show, ShowDetails, ShowId, WatchedState,
};
use sgsync_sources::{
    CloudService, EpisodeFlagRemote, MetadataService, MovieFlagRemote, RemoteError, RemoteResult, RemoteService,
    TraktService,
};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use crate::error::{StoreError, StoreResult};
use crate::gate::Connectivity;
use crate::memory::MemoryStore;
use crate::store::{LocalStore, StoreOp};

pub fn season_id(show_id: ShowId, season: u32) -> SeasonId {
    show_id * 100 + season
}

pub fn episode_id(show_id: ShowId, season: u32, number: u32) -> EpisodeId {
    show_id * 10_000 + season * 100 + number
}

pub fn aired() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 20, 0, 0).unwrap()
}

/// Insert a show with `(season number, episode count)` seasons, all unflagged.
pub fn seed_show(store: &dyn LocalStore, show_id: ShowId, seasons: &[(u32, u32)]) -> Vec<SeasonId> {
    let mut ops = vec![StoreOp::UpsertShowMetadata(Show::new(show_id, format!("Show {}", show_id)))];
    let mut ids = Vec::new();
    for &(number, count) in seasons {
        let id = season_id(show_id, number);
        ids.push(id);
        ops.push(StoreOp::UpsertSeason(Season { id, show_id, number }));
        for episode in 1..=count {
            ops.push(StoreOp::UpsertEpisodeMetadata(Episode {
                id: episode_id(show_id, number, episode),
                show_id,
                season_id: id,
                season: number,
                number: episode,
                absolute_number: None,
                dvd_number: None,
                title: format!("Episode {}", episode),
                first_aired: Some(aired()),
                watched: WatchedState::Unwatched,
                collected: false,
                last_edited: None,
            }));
        }
    }
    store.apply_batch(ops).unwrap();
    ids
}

pub fn set_watched(store: &dyn LocalStore, show_id: ShowId, episodes: &[(u32, u32)], state: WatchedState) {
    let ops = episodes
        .iter()
        .map(|&(season, number)| StoreOp::SetEpisodeWatched {
            episode_id: episode_id(show_id, season, number),
            state,
            only_if_watched: false,
        })
        .collect();
    store.apply_batch(ops).unwrap();
}

pub fn set_collected(store: &dyn LocalStore, show_id: ShowId, episodes: &[(u32, u32)]) {
    let ops = episodes
        .iter()
        .map(|&(season, number)| StoreOp::SetEpisodeCollected {
            episode_id: episode_id(show_id, season, number),
            collected: true,
        })
        .collect();
    store.apply_batch(ops).unwrap();
}

pub fn watched_state(store: &dyn LocalStore, show_id: ShowId, season: u32, number: u32) -> WatchedState {
    store
        .episode(episode_id(show_id, season, number))
        .unwrap()
        .unwrap()
        .watched
}

/// Remote record for a show; `seasons` lists `(season, flagged episode numbers)`.
pub fn remote_show(show_id: ShowId, trakt_id: Option<u64>, seasons: &[(u32, &[u32])]) -> RemoteShowFlags {
    RemoteShowFlags {
        show_id: Some(show_id),
        trakt_id,
        title: None,
        last_watched_at: None,
        seasons: seasons
            .iter()
            .map(|(number, episodes)| RemoteSeasonFlags {
                number: *number,
                episodes: episodes.to_vec(),
            })
            .collect(),
    }
}

pub fn remote_movie(tmdb_id: MovieId) -> RemoteMovie {
    RemoteMovie {
        tmdb_id: Some(tmdb_id),
        trakt_id: None,
        imdb_id: None,
        title: None,
    }
}

/// Wraps a [`MemoryStore`] and rejects every batch touching one show.
pub struct FailingStore {
    pub inner: MemoryStore,
    pub fail_show: ShowId,
}

impl FailingStore {
    fn touches_failing_show(&self, op: &StoreOp) -> bool {
        let episode_show = |id: EpisodeId| {
            self.inner
                .episode(id)
                .ok()
                .flatten()
                .map(|e| e.show_id == self.fail_show)
                .unwrap_or(false)
        };
        let season_show = |id: SeasonId| {
            self.inner
                .season(id)
                .ok()
                .flatten()
                .map(|s| s.show_id == self.fail_show)
                .unwrap_or(false)
        };
        match op {
            StoreOp::SetEpisodeWatched { episode_id, .. } | StoreOp::SetEpisodeCollected { episode_id, .. } => {
                episode_show(*episode_id)
            }
            StoreOp::SetSeasonWatched { season_id, .. } | StoreOp::SetSeasonCollected { season_id, .. } => {
                season_show(*season_id)
            }
            StoreOp::SetShowWatched { show_id, .. }
            | StoreOp::SetShowCollected { show_id, .. }
            | StoreOp::SetShowLastWatched { show_id, .. }
            | StoreOp::SetShowTraktId { show_id, .. } => *show_id == self.fail_show,
            _ => false,
        }
    }
}

impl LocalStore for FailingStore {
    fn show_ids(&self) -> StoreResult<Vec<ShowId>> {
        self.inner.show_ids()
    }
    fn shows(&self) -> StoreResult<Vec<Show>> {
        self.inner.shows()
    }
    fn show(&self, show_id: ShowId) -> StoreResult<Option<Show>> {
        self.inner.show(show_id)
    }
    fn show_trakt_id(&self, show_id: ShowId) -> StoreResult<Option<u64>> {
        self.inner.show_trakt_id(show_id)
    }
    fn last_watched_ms(&self, show_id: ShowId) -> StoreResult<Option<i64>> {
        self.inner.last_watched_ms(show_id)
    }
    fn seasons_of_show(&self, show_id: ShowId) -> StoreResult<Vec<Season>> {
        self.inner.seasons_of_show(show_id)
    }
    fn season(&self, season_id: SeasonId) -> StoreResult<Option<Season>> {
        self.inner.season(season_id)
    }
    fn episodes_of_season(&self, season_id: SeasonId) -> StoreResult<Vec<sgsync_models::EpisodeFlags>> {
        self.inner.episodes_of_season(season_id)
    }
    fn episodes_of_show(&self, show_id: ShowId) -> StoreResult<Vec<Episode>> {
        self.inner.episodes_of_show(show_id)
    }
    fn episode(&self, episode_id: EpisodeId) -> StoreResult<Option<Episode>> {
        self.inner.episode(episode_id)
    }
    fn movies(&self) -> StoreResult<Vec<sgsync_models::Movie>> {
        self.inner.movies()
    }
    fn movie(&self, movie_id: MovieId) -> StoreResult<Option<sgsync_models::Movie>> {
        self.inner.movie(movie_id)
    }
    fn lists(&self) -> StoreResult<Vec<sgsync_models::ListEntity>> {
        self.inner.lists()
    }
    fn list_items(&self, list_id: &str) -> StoreResult<Vec<sgsync_models::ListItem>> {
        self.inner.list_items(list_id)
    }
    fn pending_jobs(&self) -> StoreResult<Vec<sgsync_models::PendingJob>> {
        self.inner.pending_jobs()
    }
    fn apply_batch(&self, ops: Vec<StoreOp>) -> StoreResult<()> {
        if ops.iter().any(|op| self.touches_failing_show(op)) {
            return Err(StoreError::Write("disk full".to_string()));
        }
        self.inner.apply_batch(ops)
    }
    fn notify_changed(&self, show_ids: &[ShowId]) -> StoreResult<()> {
        self.inner.notify_changed(show_ids)
    }
}

fn fail_with(slot: &Mutex<Option<RemoteError>>) -> RemoteResult<()> {
    match slot.lock().unwrap().clone() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Scriptable trakt. Movie sends update the remote movie sets like the real
/// service would.
#[derive(Default)]
pub struct FakeTrakt {
    pub watched: Mutex<Vec<RemoteShowFlags>>,
    pub collected: Mutex<Vec<RemoteShowFlags>>,
    pub activity: Mutex<LastActivity>,
    pub collection_movies: Mutex<BTreeSet<MovieId>>,
    pub watchlist_movies: Mutex<BTreeSet<MovieId>>,
    pub watched_movies: Mutex<BTreeSet<MovieId>>,
    pub trakt_ids: Mutex<HashMap<ShowId, u64>>,
    pub sent_episodes: Mutex<Vec<EpisodeFlagChange>>,
    pub sent_movies: Mutex<Vec<MovieFlagChange>>,
    pub fail_sends: Mutex<Option<RemoteError>>,
    pub fail_downloads: Mutex<Option<RemoteError>>,
    pub downloads: Mutex<u32>,
}

impl FakeTrakt {
    pub fn new() -> Self {
        Self::default()
    }

    fn movie_set(&self, flag: MovieFlag) -> &Mutex<BTreeSet<MovieId>> {
        match flag {
            MovieFlag::Collection => &self.collection_movies,
            MovieFlag::Watchlist => &self.watchlist_movies,
            MovieFlag::Watched => &self.watched_movies,
        }
    }

    fn download(&self) -> RemoteResult<()> {
        *self.downloads.lock().unwrap() += 1;
        fail_with(&self.fail_downloads)
    }

    fn movies(&self, flag: MovieFlag) -> RemoteResult<Vec<RemoteMovie>> {
        self.download()?;
        Ok(self.movie_set(flag).lock().unwrap().iter().map(|id| remote_movie(*id)).collect())
    }
}

impl RemoteService for FakeTrakt {
    fn service_name(&self) -> &str {
        "trakt"
    }
}

#[async_trait]
impl EpisodeFlagRemote for FakeTrakt {
    fn requires_trakt_id(&self) -> bool {
        true
    }

    async fn download_episode_flags(&self, kind: FlagKind) -> RemoteResult<Vec<RemoteShowFlags>> {
        self.download()?;
        Ok(match kind {
            FlagKind::Watched => self.watched.lock().unwrap().clone(),
            FlagKind::Collected => self.collected.lock().unwrap().clone(),
        })
    }

    async fn send_episode_flags(&self, changes: &[EpisodeFlagChange]) -> RemoteResult<()> {
        fail_with(&self.fail_sends)?;
        self.sent_episodes.lock().unwrap().extend_from_slice(changes);
        Ok(())
    }
}

#[async_trait]
impl MovieFlagRemote for FakeTrakt {
    async fn send_movie_flags(&self, changes: &[MovieFlagChange]) -> RemoteResult<()> {
        fail_with(&self.fail_sends)?;
        for change in changes {
            let mut set = self.movie_set(change.flag).lock().unwrap();
            if change.value {
                set.insert(change.movie_id);
            } else {
                set.remove(&change.movie_id);
            }
        }
        self.sent_movies.lock().unwrap().extend_from_slice(changes);
        Ok(())
    }
}

#[async_trait]
impl TraktService for FakeTrakt {
    async fn last_activity(&self) -> RemoteResult<LastActivity> {
        fail_with(&self.fail_downloads)?;
        Ok(self.activity.lock().unwrap().clone())
    }

    async fn movie_collection(&self) -> RemoteResult<Vec<RemoteMovie>> {
        self.movies(MovieFlag::Collection)
    }

    async fn movie_watchlist(&self) -> RemoteResult<Vec<RemoteMovie>> {
        self.movies(MovieFlag::Watchlist)
    }

    async fn watched_movies(&self) -> RemoteResult<Vec<RemoteMovie>> {
        self.movies(MovieFlag::Watched)
    }

    async fn lookup_show_trakt_id(&self, show_id: ShowId) -> RemoteResult<Option<u64>> {
        Ok(self.trakt_ids.lock().unwrap().get(&show_id).copied())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListCall {
    Add(String, Vec<ListItemRef>),
    Remove(String, Vec<ListItemRef>),
    Delete(String),
}

#[derive(Default)]
pub struct FakeCloud {
    pub watched: Mutex<Vec<RemoteShowFlags>>,
    pub collected: Mutex<Vec<RemoteShowFlags>>,
    pub lists: Mutex<Vec<RemoteList>>,
    pub uploaded_lists: Mutex<Vec<ListUpload>>,
    pub list_calls: Mutex<Vec<ListCall>>,
    pub sent_episodes: Mutex<Vec<EpisodeFlagChange>>,
    pub sent_movies: Mutex<Vec<MovieFlagChange>>,
    pub fail_sends: Mutex<Option<RemoteError>>,
    pub fail_downloads: Mutex<Option<RemoteError>>,
    /// Scripted outcome of the next sends, oldest first; `None` succeeds.
    pub next_sends: Mutex<VecDeque<Option<RemoteError>>>,
    /// Display name; "cloud" when unset.
    pub name: Option<&'static str>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: &'static str) -> Self {
        Self {
            name: Some(name),
            ..Self::default()
        }
    }

    fn send(&self) -> RemoteResult<()> {
        if let Some(Some(error)) = self.next_sends.lock().unwrap().pop_front() {
            return Err(error);
        }
        fail_with(&self.fail_sends)
    }
}

impl RemoteService for FakeCloud {
    fn service_name(&self) -> &str {
        self.name.unwrap_or("cloud")
    }
}

#[async_trait]
impl EpisodeFlagRemote for FakeCloud {
    async fn download_episode_flags(&self, kind: FlagKind) -> RemoteResult<Vec<RemoteShowFlags>> {
        fail_with(&self.fail_downloads)?;
        Ok(match kind {
            FlagKind::Watched => self.watched.lock().unwrap().clone(),
            FlagKind::Collected => self.collected.lock().unwrap().clone(),
        })
    }

    async fn send_episode_flags(&self, changes: &[EpisodeFlagChange]) -> RemoteResult<()> {
        self.send()?;
        self.sent_episodes.lock().unwrap().extend_from_slice(changes);
        Ok(())
    }
}

#[async_trait]
impl MovieFlagRemote for FakeCloud {
    async fn send_movie_flags(&self, changes: &[MovieFlagChange]) -> RemoteResult<()> {
        self.send()?;
        self.sent_movies.lock().unwrap().extend_from_slice(changes);
        Ok(())
    }
}

#[async_trait]
impl CloudService for FakeCloud {
    async fn download_lists(&self, _updated_since: Option<DateTime<Utc>>) -> RemoteResult<Vec<RemoteList>> {
        fail_with(&self.fail_downloads)?;
        Ok(self.lists.lock().unwrap().clone())
    }

    async fn upload_lists(&self, lists: &[ListUpload]) -> RemoteResult<()> {
        self.send()?;
        self.uploaded_lists.lock().unwrap().extend_from_slice(lists);
        Ok(())
    }

    async fn add_list_items(&self, list_id: &str, items: &[ListItemRef]) -> RemoteResult<()> {
        self.send()?;
        self.list_calls
            .lock()
            .unwrap()
            .push(ListCall::Add(list_id.to_string(), items.to_vec()));
        Ok(())
    }

    async fn remove_list_items(&self, list_id: &str, items: &[ListItemRef]) -> RemoteResult<()> {
        self.send()?;
        self.list_calls
            .lock()
            .unwrap()
            .push(ListCall::Remove(list_id.to_string(), items.to_vec()));
        Ok(())
    }

    async fn delete_list(&self, list_id: &str) -> RemoteResult<()> {
        self.send()?;
        self.list_calls.lock().unwrap().push(ListCall::Delete(list_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMetadata {
    pub shows: Mutex<HashMap<ShowId, ShowDetails>>,
    /// Each queued error fails one fetch, oldest first.
    pub failures: Mutex<VecDeque<RemoteError>>,
    pub fetched: Mutex<Vec<ShowId>>,
}

impl FakeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Details mirroring what [`seed_show`] inserts.
    pub fn details(show_id: ShowId, title: &str, seasons: &[(u32, u32)]) -> ShowDetails {
        let mut details = ShowDetails {
            id: show_id,
            title: title.to_string(),
            status: Default::default(),
            release_weekday: None,
            release_time: None,
            release_timezone: None,
            language: Some("en".to_string()),
            seasons: Vec::new(),
            episodes: Vec::new(),
        };
        for &(number, count) in seasons {
            let id = season_id(show_id, number);
            details.seasons.push(sgsync_models::SeasonDetails { id, number });
            for episode in 1..=count {
                details.episodes.push(sgsync_models::EpisodeDetails {
                    id: episode_id(show_id, number, episode),
                    season_id: id,
                    season: number,
                    number: episode,
                    absolute_number: None,
                    dvd_number: None,
                    title: format!("Episode {}", episode),
                    first_aired: Some(aired()),
                });
            }
        }
        details
    }

    pub fn add(&self, details: ShowDetails) {
        self.shows.lock().unwrap().insert(details.id, details);
    }
}

impl RemoteService for FakeMetadata {
    fn service_name(&self) -> &str {
        "metadata"
    }
}

#[async_trait]
impl MetadataService for FakeMetadata {
    async fn fetch_show(&self, show_id: ShowId) -> RemoteResult<ShowDetails> {
        self.fetched.lock().unwrap().push(show_id);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.shows
            .lock()
            .unwrap()
            .get(&show_id)
            .cloned()
            .ok_or_else(|| RemoteError::api(404, "show not found"))
    }
}

#[derive(Debug)]
pub struct SwitchableConnectivity(pub AtomicBool);

impl SwitchableConnectivity {
    pub fn online() -> Self {
        Self(AtomicBool::new(true))
    }

    pub fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }
}

impl Connectivity for SwitchableConnectivity {
    fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn numbers(changes: &[EpisodeFlagChange]) -> Vec<EpisodeNumber> {
    changes.iter().flat_map(|c| c.episodes.iter().copied()).collect()
}
