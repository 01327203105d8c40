use sgsync_models::{
    Episode, EpisodeFlags, EpisodeId, ListEntity, ListItem, Movie, MovieId, PendingJob, Season, SeasonId, Show,
    ShowId,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use crate::error::StoreResult;
use crate::memory::{apply_ops, recompute_shows, MemoryStore, StoreSnapshot};
use crate::store::{LocalStore, StoreOp};

/// A [`MemoryStore`] persisted as a JSON snapshot after every write.
///
/// A batch is committed in memory only after its snapshot reached the disk,
/// so a queued job survives process death.
pub struct FileStore {
    path: PathBuf,
    memory: MemoryStore,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            let start = std::time::Instant::now();
            let data = std::fs::read(&path)?;
            let snapshot: StoreSnapshot = serde_json::from_slice(&data)?;
            info!(
                path = %path.display(),
                shows = snapshot.shows.len(),
                movies = snapshot.movies.len(),
                pending_jobs = snapshot.jobs.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "loaded local store"
            );
            snapshot
        } else {
            debug!(path = %path.display(), "store file does not exist, starting empty");
            StoreSnapshot::default()
        };
        Ok(Self {
            path,
            memory: MemoryStore::from_snapshot(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, snapshot: &StoreSnapshot) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec(snapshot)?;
        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, &data)?;
        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to replace store file");
            return Err(e.into());
        }
        debug!(path = %self.path.display(), bytes = data.len(), "persisted local store");
        Ok(())
    }


}

impl LocalStore for FileStore {
    fn show_ids(&self) -> StoreResult<Vec<ShowId>> {
        self.memory.show_ids()
    }

    fn shows(&self) -> StoreResult<Vec<Show>> {
        self.memory.shows()
    }

    fn show(&self, show_id: ShowId) -> StoreResult<Option<Show>> {
        self.memory.show(show_id)
    }

    fn show_trakt_id(&self, show_id: ShowId) -> StoreResult<Option<u64>> {
        self.memory.show_trakt_id(show_id)
    }

    fn last_watched_ms(&self, show_id: ShowId) -> StoreResult<Option<i64>> {
        self.memory.last_watched_ms(show_id)
    }

    fn seasons_of_show(&self, show_id: ShowId) -> StoreResult<Vec<Season>> {
        self.memory.seasons_of_show(show_id)
    }

    fn season(&self, season_id: SeasonId) -> StoreResult<Option<Season>> {
        self.memory.season(season_id)
    }

    fn episodes_of_season(&self, season_id: SeasonId) -> StoreResult<Vec<EpisodeFlags>> {
        self.memory.episodes_of_season(season_id)
    }

    fn episodes_of_show(&self, show_id: ShowId) -> StoreResult<Vec<Episode>> {
        self.memory.episodes_of_show(show_id)
    }

    fn episode(&self, episode_id: EpisodeId) -> StoreResult<Option<Episode>> {
        self.memory.episode(episode_id)
    }

    fn movies(&self) -> StoreResult<Vec<Movie>> {
        self.memory.movies()
    }

    fn movie(&self, movie_id: MovieId) -> StoreResult<Option<Movie>> {
        self.memory.movie(movie_id)
    }

    fn lists(&self) -> StoreResult<Vec<ListEntity>> {
        self.memory.lists()
    }

    fn list_items(&self, list_id: &str) -> StoreResult<Vec<ListItem>> {
        self.memory.list_items(list_id)
    }

    fn pending_jobs(&self) -> StoreResult<Vec<PendingJob>> {
        self.memory.pending_jobs()
    }

    fn apply_batch(&self, ops: Vec<StoreOp>) -> StoreResult<()> {
        self.memory.transact(|next| apply_ops(next, ops), |next| self.persist(next))
    }

    fn notify_changed(&self, show_ids: &[ShowId]) -> StoreResult<()> {
        self.memory.transact(|next| recompute_shows(next, show_ids), |next| self.persist(next))
    }
}
