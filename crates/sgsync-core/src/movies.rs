use chrono::{DateTime, Utc};
use sgsync_config::{merge_keys, SyncStateStore};
use sgsync_models::{CursorKind, LastActivity, Movie, MovieFlag, MovieFlagChange, MovieId, RemoteMovie};
use sgsync_sources::TraktService;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, instrument, warn};
use crate::error::{ServiceKind, SyncError};
use crate::store::{LocalStore, StoreOp};

const SERVICE: ServiceKind = ServiceKind::Trakt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieReport {
    /// The remote reported nothing new since the last cursor.
    pub unchanged: bool,
    pub updated: usize,
    pub shells_added: usize,
    pub uploads: Vec<MovieFlagChange>,
    pub skipped_malformed: usize,
}

struct RemoteIds {
    ids: HashSet<MovieId>,
    malformed: usize,
}

fn remote_ids(movies: Vec<RemoteMovie>) -> RemoteIds {
    let mut result = RemoteIds {
        ids: HashSet::new(),
        malformed: 0,
    };
    for movie in movies {
        match movie.tmdb_id {
            Some(id) => {
                result.ids.insert(id);
            }
            None => {
                warn!(
                    trakt_id = movie.trakt_id,
                    title = movie.title.as_deref().unwrap_or("unknown"),
                    "skipping remote movie without tmdb id"
                );
                result.malformed += 1;
            }
        }
    }
    result
}

/// Reconciles movie collection, watchlist and watched flags with trakt.
pub struct MovieReconciler<'a> {
    store: &'a dyn LocalStore,
}

impl<'a> MovieReconciler<'a> {
    pub fn new(store: &'a dyn LocalStore) -> Self {
        Self { store }
    }

    /// Collection and watchlist.
    ///
    /// Until the movie merge flag is set, remote flags are only added locally
    /// and movies trakt knows nothing about are uploaded. Afterwards local
    /// flags mirror trakt. Remote-only movies are inserted as shells, which
    /// resets the watched cursor so their watched flag is downloaded too.
    #[instrument(skip(self, trakt, state, activity))]
    pub async fn sync_lists<T: TraktService + ?Sized>(
        &self,
        trakt: &T,
        state: &mut SyncStateStore,
        activity: &LastActivity,
        force: bool,
    ) -> Result<MovieReport, SyncError> {
        let merged = state.is_merged(merge_keys::TRAKT_MOVIES);
        let collection_changed =
            state.has_changed_since_cursor(SERVICE.as_str(), CursorKind::MoviesCollected, activity.movies_collected_at);
        let watchlist_changed =
            state.has_changed_since_cursor(SERVICE.as_str(), CursorKind::MoviesWatchlisted, activity.movies_watchlisted_at);
        if merged && !force && !collection_changed && !watchlist_changed {
            debug!("movie collection and watchlist unchanged");
            return Ok(MovieReport {
                unchanged: true,
                ..MovieReport::default()
            });
        }

        let started_at = Utc::now();
        let collection = remote_ids(
            trakt
                .movie_collection()
                .await
                .map_err(|e| SyncError::from_remote(SERVICE, e))?,
        );
        let watchlist = remote_ids(
            trakt
                .movie_watchlist()
                .await
                .map_err(|e| SyncError::from_remote(SERVICE, e))?,
        );

        let local = self.store.movies()?;
        let mut report = MovieReport {
            skipped_malformed: collection.malformed + watchlist.malformed,
            ..MovieReport::default()
        };
        let mut ops = Vec::new();

        for movie in &local {
            let in_collection = collection.ids.contains(&movie.id);
            let in_watchlist = watchlist.ids.contains(&movie.id);
            if merged {
                push_flag_change(&mut ops, movie, MovieFlag::Collection, in_collection);
                push_flag_change(&mut ops, movie, MovieFlag::Watchlist, in_watchlist);
                continue;
            }

            if in_collection {
                push_flag_change(&mut ops, movie, MovieFlag::Collection, true);
            }
            if in_watchlist {
                push_flag_change(&mut ops, movie, MovieFlag::Watchlist, true);
            }
            if !in_collection && !in_watchlist {
                for flag in [MovieFlag::Collection, MovieFlag::Watchlist] {
                    if movie.flag(flag) {
                        report.uploads.push(MovieFlagChange {
                            movie_id: movie.id,
                            flag,
                            value: true,
                        });
                    }
                }
            }
        }
        report.updated = ops.len();

        let local_ids: HashSet<MovieId> = local.iter().map(|m| m.id).collect();
        let remote_only: BTreeSet<MovieId> = collection
            .ids
            .union(&watchlist.ids)
            .copied()
            .filter(|id| !local_ids.contains(id))
            .collect();
        for id in &remote_only {
            let mut shell = Movie::shell(*id);
            shell.in_collection = collection.ids.contains(id);
            shell.in_watchlist = watchlist.ids.contains(id);
            ops.push(StoreOp::InsertMovieShell(shell));
        }
        report.shells_added = remote_only.len();

        if !ops.is_empty() {
            self.store.apply_batch(ops)?;
        }

        if !report.uploads.is_empty() {
            info!(movies = report.uploads.len(), "uploading local-only movies to trakt");
            trakt
                .send_movie_flags(&report.uploads)
                .await
                .map_err(|e| SyncError::from_remote(SERVICE, e))?;
        }

        if !merged {
            state.set_merged(merge_keys::TRAKT_MOVIES);
        }
        state.set_cursor(
            SERVICE.as_str(),
            CursorKind::MoviesCollected,
            activity.movies_collected_at.unwrap_or(started_at),
        );
        state.set_cursor(
            SERVICE.as_str(),
            CursorKind::MoviesWatchlisted,
            activity.movies_watchlisted_at.unwrap_or(started_at),
        );
        if report.shells_added > 0 {
            state.reset_cursor(SERVICE.as_str(), CursorKind::MoviesWatched);
        }

        info!(
            operation = "movie_lists_sync",
            status = "success",
            merged,
            updated = report.updated,
            shells_added = report.shells_added,
            uploads = report.uploads.len(),
            "movie collection and watchlist synced"
        );
        Ok(report)
    }

    /// Mirror trakt's watched movies onto every local movie. trakt is ground
    /// truth here, nothing is uploaded.
    #[instrument(skip(self, trakt, state))]
    pub async fn download_watched<T: TraktService + ?Sized>(
        &self,
        trakt: &T,
        state: &mut SyncStateStore,
        watched_at: Option<DateTime<Utc>>,
        force: bool,
    ) -> Result<MovieReport, SyncError> {
        if !force && !state.has_changed_since_cursor(SERVICE.as_str(), CursorKind::MoviesWatched, watched_at) {
            debug!("watched movies unchanged");
            return Ok(MovieReport {
                unchanged: true,
                ..MovieReport::default()
            });
        }

        let started_at = Utc::now();
        let watched = remote_ids(
            trakt
                .watched_movies()
                .await
                .map_err(|e| SyncError::from_remote(SERVICE, e))?,
        );

        let local = self.store.movies()?;
        let mut ops = Vec::new();
        for movie in &local {
            push_flag_change(&mut ops, movie, MovieFlag::Watched, watched.ids.contains(&movie.id));
        }
        let updated = ops.len();

        let local_ids: HashSet<MovieId> = local.iter().map(|m| m.id).collect();
        let mut remote_only: Vec<MovieId> = watched.ids.iter().copied().filter(|id| !local_ids.contains(id)).collect();
        remote_only.sort_unstable();
        for id in &remote_only {
            let mut shell = Movie::shell(*id);
            shell.watched = true;
            ops.push(StoreOp::InsertMovieShell(shell));
        }

        if !ops.is_empty() {
            self.store.apply_batch(ops)?;
        }
        state.set_cursor(SERVICE.as_str(), CursorKind::MoviesWatched, watched_at.unwrap_or(started_at));

        info!(
            operation = "movie_watched_sync",
            status = "success",
            updated,
            shells_added = remote_only.len(),
            "watched movies synced"
        );
        Ok(MovieReport {
            unchanged: false,
            updated,
            shells_added: remote_only.len(),
            uploads: Vec::new(),
            skipped_malformed: watched.malformed,
        })
    }
}

fn push_flag_change(ops: &mut Vec<StoreOp>, movie: &Movie, flag: MovieFlag, value: bool) {
    if movie.flag(flag) != value {
        ops.push(StoreOp::SetMovieFlag {
            movie_id: movie.id,
            flag,
            value,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::testing::{remote_movie, FakeTrakt};
    use chrono::TimeZone;

    fn local_movie(store: &MemoryStore, id: MovieId, collection: bool, watchlist: bool) {
        let mut movie = Movie::shell(id);
        movie.title = Some(format!("Movie {}", id));
        movie.in_collection = collection;
        movie.in_watchlist = watchlist;
        store.apply_batch(vec![StoreOp::InsertMovieShell(movie)]).unwrap();
    }

    fn flags(store: &MemoryStore, id: MovieId) -> (bool, bool, bool) {
        let movie = store.movie(id).unwrap().unwrap();
        (movie.in_collection, movie.in_watchlist, movie.watched)
    }

    #[tokio::test]
    async fn test_first_merge_adds_and_uploads_without_removing() {
        let store = MemoryStore::new();
        local_movie(&store, 1, false, true);
        local_movie(&store, 2, true, false);
        local_movie(&store, 3, false, false);
        let trakt = FakeTrakt::new();
        trakt.collection_movies.lock().unwrap().extend([1, 50]);
        let mut state = SyncStateStore::in_memory();

        let report = MovieReconciler::new(&store)
            .sync_lists(&trakt, &mut state, &LastActivity::default(), false)
            .await
            .unwrap();

        // Movie 1 gains the remote flag and keeps its local one
        assert_eq!(flags(&store, 1), (true, true, false));
        assert_eq!(flags(&store, 2), (true, false, false));
        assert_eq!(
            report.uploads,
            vec![MovieFlagChange {
                movie_id: 2,
                flag: MovieFlag::Collection,
                value: true,
            }]
        );
        assert_eq!(report.shells_added, 1);
        assert!(store.movie(50).unwrap().unwrap().is_shell());
        assert!(state.is_merged(merge_keys::TRAKT_MOVIES));
    }

    #[tokio::test]
    async fn test_repeated_first_merge_does_not_upload_twice() {
        let store = MemoryStore::new();
        local_movie(&store, 2, true, true);
        let trakt = FakeTrakt::new();
        let reconciler = MovieReconciler::new(&store);

        // Crash after the upload, before the merge flag was persisted
        let mut crashed = SyncStateStore::in_memory();
        let first = reconciler
            .sync_lists(&trakt, &mut crashed, &LastActivity::default(), false)
            .await
            .unwrap();
        assert_eq!(first.uploads.len(), 2);

        let mut fresh = SyncStateStore::in_memory();
        let retried = reconciler
            .sync_lists(&trakt, &mut fresh, &LastActivity::default(), false)
            .await
            .unwrap();
        assert!(retried.uploads.is_empty());

        // With the flag set the mirror path runs and uploads nothing
        let mirrored = reconciler
            .sync_lists(&trakt, &mut fresh, &LastActivity::default(), true)
            .await
            .unwrap();
        assert!(mirrored.uploads.is_empty());
        assert_eq!(trakt.sent_movies.lock().unwrap().len(), 2);
        assert_eq!(flags(&store, 2), (true, true, false));
    }

    #[tokio::test]
    async fn test_mirror_mode_removes_flags_missing_remotely() {
        let store = MemoryStore::new();
        local_movie(&store, 1, true, true);
        local_movie(&store, 2, false, false);
        let trakt = FakeTrakt::new();
        trakt.watchlist_movies.lock().unwrap().insert(2);
        let mut state = SyncStateStore::in_memory();
        state.set_merged(merge_keys::TRAKT_MOVIES);

        let report = MovieReconciler::new(&store)
            .sync_lists(&trakt, &mut state, &LastActivity::default(), false)
            .await
            .unwrap();

        assert!(report.uploads.is_empty());
        assert_eq!(flags(&store, 1), (false, false, false));
        assert_eq!(flags(&store, 2), (false, true, false));
    }

    #[tokio::test]
    async fn test_new_shells_reset_watched_cursor() {
        let store = MemoryStore::new();
        let trakt = FakeTrakt::new();
        trakt.watchlist_movies.lock().unwrap().insert(77);
        let mut state = SyncStateStore::in_memory();
        state.set_merged(merge_keys::TRAKT_MOVIES);
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        state.set_cursor(SERVICE.as_str(), CursorKind::MoviesWatched, at);

        MovieReconciler::new(&store)
            .sync_lists(&trakt, &mut state, &LastActivity::default(), false)
            .await
            .unwrap();

        assert_eq!(state.cursor(SERVICE.as_str(), CursorKind::MoviesWatched), None);
        assert_eq!(flags(&store, 77), (false, true, false));
    }

    #[tokio::test]
    async fn test_download_watched_is_stable_when_repeated() {
        let store = MemoryStore::new();
        local_movie(&store, 1, false, false);
        local_movie(&store, 2, false, false);
        store
            .apply_batch(vec![StoreOp::SetMovieFlag {
                movie_id: 2,
                flag: MovieFlag::Watched,
                value: true,
            }])
            .unwrap();
        let trakt = FakeTrakt::new();
        trakt.watched_movies.lock().unwrap().extend([1, 9]);
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut state = SyncStateStore::in_memory();
        let reconciler = MovieReconciler::new(&store);

        let first = reconciler.download_watched(&trakt, &mut state, Some(at), false).await.unwrap();
        assert_eq!(first.shells_added, 1);
        let after_first = store.movies().unwrap();
        assert_eq!(flags(&store, 1), (false, false, true));
        assert_eq!(flags(&store, 2), (false, false, false));
        assert_eq!(flags(&store, 9), (false, false, true));

        let skipped = reconciler.download_watched(&trakt, &mut state, Some(at), false).await.unwrap();
        assert!(skipped.unchanged);

        let forced = reconciler.download_watched(&trakt, &mut state, Some(at), true).await.unwrap();
        assert_eq!(forced.updated, 0);
        assert_eq!(forced.shells_added, 0);
        assert_eq!(store.movies().unwrap(), after_first);
    }

    #[tokio::test]
    async fn test_movies_without_tmdb_id_are_skipped() {
        let store = MemoryStore::new();
        let trakt = FakeTrakt::new();
        trakt.watched_movies.lock().unwrap().insert(4);
        let mut state = SyncStateStore::in_memory();

        let report = MovieReconciler::new(&store)
            .download_watched(&trakt, &mut state, None, false)
            .await
            .unwrap();
        assert_eq!(report.skipped_malformed, 0);

        let ids = remote_ids(vec![remote_movie(1), RemoteMovie {
            tmdb_id: None,
            trakt_id: Some(3),
            imdb_id: None,
            title: Some("No ids".into()),
        }]);
        assert_eq!(ids.malformed, 1);
        assert!(ids.ids.contains(&1));
    }
}
