use chrono::Utc;
use serde::{Deserialize, Serialize};
use sgsync_models::{
    Episode, EpisodeFlags, EpisodeId, JobId, ListEntity, ListItem, Movie, MovieId, PendingJob, Season, SeasonId,
    Show, ShowId, WatchedState, SPECIALS_SEASON,
};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::trace;
use crate::error::{StoreError, StoreResult};
use crate::store::{LocalStore, StoreOp};

/// Everything the store holds, in a serializable form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub shows: BTreeMap<ShowId, Show>,
    #[serde(default)]
    pub seasons: BTreeMap<SeasonId, Season>,
    #[serde(default)]
    pub episodes: BTreeMap<EpisodeId, Episode>,
    #[serde(default)]
    pub movies: BTreeMap<MovieId, Movie>,
    #[serde(default)]
    pub lists: BTreeMap<String, ListEntity>,
    #[serde(default)]
    pub list_items: BTreeMap<String, ListItem>,
    #[serde(default)]
    pub jobs: BTreeMap<JobId, PendingJob>,
    #[serde(default)]
    pub last_job_id: JobId,
}

fn set_watched(episode: &mut Episode, state: WatchedState, only_if_watched: bool) {
    if only_if_watched && episode.watched != WatchedState::Watched {
        return;
    }
    if episode.watched != state {
        episode.watched = state;
        episode.last_edited = Some(Utc::now());
    }
}

fn set_collected(episode: &mut Episode, collected: bool) {
    if episode.collected != collected {
        episode.collected = collected;
        episode.last_edited = Some(Utc::now());
    }
}

impl StoreSnapshot {
    fn show_mut(&mut self, show_id: ShowId) -> StoreResult<&mut Show> {
        self.shows
            .get_mut(&show_id)
            .ok_or_else(|| StoreError::Write(format!("unknown show {}", show_id)))
    }

    fn episode_mut(&mut self, episode_id: EpisodeId) -> StoreResult<&mut Episode> {
        self.episodes
            .get_mut(&episode_id)
            .ok_or_else(|| StoreError::Write(format!("unknown episode {}", episode_id)))
    }

    fn require_season(&self, season_id: SeasonId) -> StoreResult<()> {
        if self.seasons.contains_key(&season_id) {
            Ok(())
        } else {
            Err(StoreError::Write(format!("unknown season {}", season_id)))
        }
    }

    fn apply(&mut self, op: StoreOp) -> StoreResult<()> {
        trace!(?op, "applying store operation");
        match op {
            StoreOp::SetEpisodeWatched {
                episode_id,
                state,
                only_if_watched,
            } => set_watched(self.episode_mut(episode_id)?, state, only_if_watched),
            StoreOp::SetSeasonWatched {
                season_id,
                state,
                only_if_watched,
            } => {
                self.require_season(season_id)?;
                self.episodes
                    .values_mut()
                    .filter(|e| e.season_id == season_id)
                    .for_each(|e| set_watched(e, state, only_if_watched));
            }
            StoreOp::SetShowWatched {
                show_id,
                state,
                only_if_watched,
            } => {
                self.show_mut(show_id)?;
                self.episodes
                    .values_mut()
                    .filter(|e| e.show_id == show_id)
                    .for_each(|e| set_watched(e, state, only_if_watched));
            }
            StoreOp::SetEpisodeCollected { episode_id, collected } => {
                set_collected(self.episode_mut(episode_id)?, collected)
            }
            StoreOp::SetSeasonCollected { season_id, collected } => {
                self.require_season(season_id)?;
                self.episodes
                    .values_mut()
                    .filter(|e| e.season_id == season_id)
                    .for_each(|e| set_collected(e, collected));
            }
            StoreOp::SetShowCollected { show_id, collected } => {
                self.show_mut(show_id)?;
                self.episodes
                    .values_mut()
                    .filter(|e| e.show_id == show_id)
                    .for_each(|e| set_collected(e, collected));
            }
            StoreOp::SetShowLastWatched {
                show_id,
                last_watched_ms,
            } => self.show_mut(show_id)?.last_watched_ms = Some(last_watched_ms),
            StoreOp::SetShowTraktId { show_id, trakt_id } => self.show_mut(show_id)?.trakt_id = Some(trakt_id),
            StoreOp::UpsertShowMetadata(show) => match self.shows.get_mut(&show.id) {
                Some(existing) => {
                    existing.title = show.title;
                    existing.status = show.status;
                    existing.release_weekday = show.release_weekday;
                    existing.release_time = show.release_time;
                    existing.release_timezone = show.release_timezone;
                    existing.language = show.language;
                    existing.last_updated = show.last_updated;
                }
                None => {
                    self.shows.insert(show.id, show);
                }
            },
            StoreOp::UpsertSeason(season) => {
                self.show_mut(season.show_id)?;
                self.seasons.insert(season.id, season);
            }
            StoreOp::UpsertEpisodeMetadata(mut episode) => {
                self.require_season(episode.season_id)?;
                if let Some(existing) = self.episodes.get(&episode.id) {
                    episode.watched = existing.watched;
                    episode.collected = existing.collected;
                    episode.last_edited = existing.last_edited;
                }
                self.episodes.insert(episode.id, episode);
            }
            StoreOp::DeleteSeason(season_id) => {
                self.seasons.remove(&season_id);
                self.episodes.retain(|_, e| e.season_id != season_id);
            }
            StoreOp::DeleteEpisode(episode_id) => {
                self.episodes.remove(&episode_id);
            }
            StoreOp::SetMovieFlag { movie_id, flag, value } => self
                .movies
                .get_mut(&movie_id)
                .ok_or_else(|| StoreError::Write(format!("unknown movie {}", movie_id)))?
                .set_flag(flag, value),
            StoreOp::InsertMovieShell(movie) => {
                self.movies.entry(movie.id).or_insert(movie);
            }
            StoreOp::UpsertList(list) => {
                self.lists.insert(list.id.clone(), list);
            }
            StoreOp::DeleteList(list_id) => {
                self.lists.remove(&list_id);
                self.list_items.retain(|_, item| item.list_id != list_id);
            }
            StoreOp::InsertListItem(item) => {
                if !self.lists.contains_key(&item.list_id) {
                    return Err(StoreError::Write(format!("unknown list {}", item.list_id)));
                }
                self.list_items.insert(item.id.clone(), item);
            }
            StoreOp::DeleteListItem(item_id) => {
                self.list_items.remove(&item_id);
            }
            StoreOp::InsertJob(job) => {
                self.last_job_id += 1;
                let id = self.last_job_id;
                self.jobs.insert(
                    id,
                    PendingJob {
                        id,
                        action: job.action,
                        created_at: job.created_at,
                        payload: job.payload,
                    },
                );
            }
            StoreOp::DeleteJobs(ids) => {
                for id in ids {
                    self.jobs.remove(&id);
                }
            }
        }
        Ok(())
    }

    fn recompute_show(&mut self, show_id: ShowId) {
        let now = Utc::now();
        let mut episodes: Vec<&Episode> = self
            .episodes
            .values()
            .filter(|e| e.show_id == show_id && e.season != SPECIALS_SEASON)
            .collect();
        episodes.sort_by_key(|e| (e.season, e.number));

        let unwatched_count = episodes
            .iter()
            .filter(|e| e.watched == WatchedState::Unwatched)
            .filter(|e| e.first_aired.map(|aired| aired <= now).unwrap_or(false))
            .count() as u32;
        let next_episode = episodes
            .iter()
            .find(|e| e.watched == WatchedState::Unwatched)
            .map(|e| e.id);

        if let Some(show) = self.shows.get_mut(&show_id) {
            show.unwatched_count = unwatched_count;
            show.next_episode = next_episode;
        }
    }
}

pub(crate) fn apply_ops(snapshot: &mut StoreSnapshot, ops: Vec<StoreOp>) -> StoreResult<()> {
    for op in ops {
        snapshot.apply(op)?;
    }
    Ok(())
}

pub(crate) fn recompute_shows(snapshot: &mut StoreSnapshot, show_ids: &[ShowId]) -> StoreResult<()> {
    for show_id in show_ids {
        snapshot.recompute_show(*show_id);
    }
    Ok(())
}

/// In-process store. Complete on its own and the working set of [`crate::FileStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        self.read(|s| Ok(s.clone()))
    }

    /// Build the next state from the current one and install it, all under
    /// the write lock. `persist` sees the new state before it replaces the old
    /// one; an error from either step leaves the store unchanged.
    pub(crate) fn transact(
        &self,
        change: impl FnOnce(&mut StoreSnapshot) -> StoreResult<()>,
        persist: impl FnOnce(&StoreSnapshot) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StoreError::Write("store lock poisoned".to_string()))?;
        let mut next = guard.clone();
        change(&mut next)?;
        persist(&next)?;
        *guard = next;
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&StoreSnapshot) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StoreError::Read("store lock poisoned".to_string()))?;
        f(&guard)
    }
}

impl LocalStore for MemoryStore {
    fn show_ids(&self) -> StoreResult<Vec<ShowId>> {
        self.read(|s| Ok(s.shows.keys().copied().collect()))
    }

    fn shows(&self) -> StoreResult<Vec<Show>> {
        self.read(|s| Ok(s.shows.values().cloned().collect()))
    }

    fn show(&self, show_id: ShowId) -> StoreResult<Option<Show>> {
        self.read(|s| Ok(s.shows.get(&show_id).cloned()))
    }

    fn show_trakt_id(&self, show_id: ShowId) -> StoreResult<Option<u64>> {
        self.read(|s| Ok(s.shows.get(&show_id).and_then(|show| show.trakt_id)))
    }

    fn last_watched_ms(&self, show_id: ShowId) -> StoreResult<Option<i64>> {
        self.read(|s| Ok(s.shows.get(&show_id).and_then(|show| show.last_watched_ms)))
    }

    fn seasons_of_show(&self, show_id: ShowId) -> StoreResult<Vec<Season>> {
        self.read(|s| {
            let mut seasons: Vec<Season> = s.seasons.values().filter(|x| x.show_id == show_id).cloned().collect();
            seasons.sort_by_key(|x| x.number);
            Ok(seasons)
        })
    }

    fn season(&self, season_id: SeasonId) -> StoreResult<Option<Season>> {
        self.read(|s| Ok(s.seasons.get(&season_id).cloned()))
    }

    fn episodes_of_season(&self, season_id: SeasonId) -> StoreResult<Vec<EpisodeFlags>> {
        self.read(|s| {
            let mut episodes: Vec<EpisodeFlags> = s
                .episodes
                .values()
                .filter(|e| e.season_id == season_id)
                .map(Episode::flags)
                .collect();
            episodes.sort_by_key(|e| e.number);
            Ok(episodes)
        })
    }

    fn episodes_of_show(&self, show_id: ShowId) -> StoreResult<Vec<Episode>> {
        self.read(|s| {
            let mut episodes: Vec<Episode> = s.episodes.values().filter(|e| e.show_id == show_id).cloned().collect();
            episodes.sort_by_key(|e| (e.season, e.number));
            Ok(episodes)
        })
    }

    fn episode(&self, episode_id: EpisodeId) -> StoreResult<Option<Episode>> {
        self.read(|s| Ok(s.episodes.get(&episode_id).cloned()))
    }

    fn movies(&self) -> StoreResult<Vec<Movie>> {
        self.read(|s| Ok(s.movies.values().cloned().collect()))
    }

    fn movie(&self, movie_id: MovieId) -> StoreResult<Option<Movie>> {
        self.read(|s| Ok(s.movies.get(&movie_id).cloned()))
    }

    fn lists(&self) -> StoreResult<Vec<ListEntity>> {
        self.read(|s| {
            let mut lists: Vec<ListEntity> = s.lists.values().cloned().collect();
            lists.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
            Ok(lists)
        })
    }

    fn list_items(&self, list_id: &str) -> StoreResult<Vec<ListItem>> {
        self.read(|s| Ok(s.list_items.values().filter(|i| i.list_id == list_id).cloned().collect()))
    }

    fn pending_jobs(&self) -> StoreResult<Vec<PendingJob>> {
        // Keyed by id, and ids are handed out in creation order
        self.read(|s| Ok(s.jobs.values().cloned().collect()))
    }

    fn apply_batch(&self, ops: Vec<StoreOp>) -> StoreResult<()> {
        self.transact(|next| apply_ops(next, ops), |_| Ok(()))
    }

    fn notify_changed(&self, show_ids: &[ShowId]) -> StoreResult<()> {
        self.transact(|next| recompute_shows(next, show_ids), |_| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{episode_id, seed_show};
    use sgsync_models::{JobAction, ListDeletePayload, ListItemType, MovieFlag, NewJob};

    #[test]
    fn test_batches_from_many_threads_are_all_kept() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let payload = ListDeletePayload {
            list_id: "favs".to_string(),
        };
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let job = NewJob::encode(JobAction::ListDelete, &payload).unwrap();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        store.apply_batch(vec![StoreOp::InsertJob(job.clone())]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let jobs = store.pending_jobs().unwrap();
        assert_eq!(jobs.len(), 1600);
        assert!(jobs.windows(2).all(|pair| pair[0].id < pair[1].id));
    }

    #[test]
    fn test_failed_batch_changes_nothing() {
        let store = MemoryStore::new();
        seed_show(&store, 10, &[(1, 3)]);

        let result = store.apply_batch(vec![
            StoreOp::SetEpisodeWatched {
                episode_id: episode_id(10, 1, 1),
                state: WatchedState::Watched,
                only_if_watched: false,
            },
            StoreOp::SetEpisodeWatched {
                episode_id: 999_999,
                state: WatchedState::Watched,
                only_if_watched: false,
            },
        ]);

        assert!(matches!(result, Err(StoreError::Write(_))));
        let episode = store.episode(episode_id(10, 1, 1)).unwrap().unwrap();
        assert_eq!(episode.watched, WatchedState::Unwatched);
    }

    #[test]
    fn test_only_if_watched_keeps_skipped() {
        let store = MemoryStore::new();
        let season_id = seed_show(&store, 10, &[(1, 2)])[0];
        store
            .apply_batch(vec![
                StoreOp::SetEpisodeWatched {
                    episode_id: episode_id(10, 1, 1),
                    state: WatchedState::Skipped,
                    only_if_watched: false,
                },
                StoreOp::SetEpisodeWatched {
                    episode_id: episode_id(10, 1, 2),
                    state: WatchedState::Watched,
                    only_if_watched: false,
                },
            ])
            .unwrap();

        store
            .apply_batch(vec![StoreOp::SetSeasonWatched {
                season_id,
                state: WatchedState::Unwatched,
                only_if_watched: true,
            }])
            .unwrap();

        let flags = store.episodes_of_season(season_id).unwrap();
        assert_eq!(flags[0].watched, WatchedState::Skipped);
        assert_eq!(flags[1].watched, WatchedState::Unwatched);
    }

    #[test]
    fn test_metadata_upsert_keeps_flags() {
        let store = MemoryStore::new();
        seed_show(&store, 10, &[(1, 1)]);
        let id = episode_id(10, 1, 1);
        store
            .apply_batch(vec![StoreOp::SetEpisodeCollected {
                episode_id: id,
                collected: true,
            }])
            .unwrap();

        let mut refreshed = store.episode(id).unwrap().unwrap();
        refreshed.title = "Renamed".to_string();
        refreshed.collected = false;
        store.apply_batch(vec![StoreOp::UpsertEpisodeMetadata(refreshed)]).unwrap();

        let episode = store.episode(id).unwrap().unwrap();
        assert_eq!(episode.title, "Renamed");
        assert!(episode.collected);
    }

    #[test]
    fn test_notify_recomputes_next_episode() {
        let store = MemoryStore::new();
        seed_show(&store, 10, &[(0, 1), (1, 3)]);
        store
            .apply_batch(vec![
                StoreOp::SetEpisodeWatched {
                    episode_id: episode_id(10, 1, 1),
                    state: WatchedState::Watched,
                    only_if_watched: false,
                },
                StoreOp::SetEpisodeWatched {
                    episode_id: episode_id(10, 1, 2),
                    state: WatchedState::Skipped,
                    only_if_watched: false,
                },
            ])
            .unwrap();

        store.notify_changed(&[10]).unwrap();

        let show = store.show(10).unwrap().unwrap();
        assert_eq!(show.next_episode, Some(episode_id(10, 1, 3)));
        assert_eq!(show.unwatched_count, 1);
    }

    #[test]
    fn test_jobs_keep_creation_order() {
        let store = MemoryStore::new();
        for movie_id in [3, 1, 2] {
            let payload = sgsync_models::MovieFlagPayload {
                movie_id,
                flag: MovieFlag::Watched,
                value: true,
            };
            let job = NewJob::encode(JobAction::MovieWatched, &payload).unwrap();
            store.apply_batch(vec![StoreOp::InsertJob(job)]).unwrap();
        }

        let jobs = store.pending_jobs().unwrap();
        let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        store.apply_batch(vec![StoreOp::DeleteJobs(vec![1, 3])]).unwrap();
        assert_eq!(store.pending_jobs().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_list_removes_items() {
        let store = MemoryStore::new();
        store
            .apply_batch(vec![
                StoreOp::UpsertList(ListEntity {
                    id: "favs".into(),
                    name: "Favourites".into(),
                    order: 0,
                }),
                StoreOp::InsertListItem(ListItem::new(10, ListItemType::Show, "favs")),
            ])
            .unwrap();
        assert_eq!(store.list_items("favs").unwrap().len(), 1);

        store.apply_batch(vec![StoreOp::DeleteList("favs".into())]).unwrap();
        assert!(store.lists().unwrap().is_empty());
        assert!(store.list_items("favs").unwrap().is_empty());
    }
}
