use chrono::Utc;
use sgsync_models::{
    EpisodeFlagPayload, EpisodeFlagValue, EpisodeId, EpisodeNumber, JobAction, ListDeletePayload, ListItem,
    ListItemRef, ListItemsPayload, Movie, MovieFlag, MovieFlagPayload, MovieId, NewJob, SeasonId, ShowId,
    WatchedState,
};
use tracing::{debug, instrument};
use crate::error::{StoreError, StoreResult};
use crate::store::{LocalStore, StoreOp};

fn movie_action(flag: MovieFlag) -> JobAction {
    match flag {
        MovieFlag::Collection => JobAction::MovieCollection,
        MovieFlag::Watchlist => JobAction::MovieWatchlist,
        MovieFlag::Watched => JobAction::MovieWatched,
    }
}

/// User-facing changes. Each one is written together with the job that
/// carries it to the remotes, so a change is never stored without its job.
pub struct LocalActions<'a> {
    store: &'a dyn LocalStore,
}

impl<'a> LocalActions<'a> {
    pub fn new(store: &'a dyn LocalStore) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub fn set_episode_watched(&self, episode_id: EpisodeId, state: WatchedState) -> StoreResult<()> {
        let episode = self
            .store
            .episode(episode_id)?
            .ok_or_else(|| StoreError::Write(format!("unknown episode {}", episode_id)))?;
        let mut ops = vec![StoreOp::SetEpisodeWatched {
            episode_id,
            state,
            only_if_watched: false,
        }];
        if state == WatchedState::Watched {
            self.touch_last_watched(episode.show_id, &mut ops)?;
        }
        ops.push(self.episode_job(
            episode.show_id,
            EpisodeFlagValue::Watched(state),
            vec![EpisodeNumber::new(episode.season, episode.number)],
        )?);
        self.apply_for_show(episode.show_id, ops)
    }

    /// Every episode of the season, specials season included.
    #[instrument(skip(self))]
    pub fn set_season_watched(&self, season_id: SeasonId, state: WatchedState) -> StoreResult<()> {
        let (show_id, numbers) = self.season_numbers(season_id)?;
        let mut ops = vec![StoreOp::SetSeasonWatched {
            season_id,
            state,
            only_if_watched: false,
        }];
        if state == WatchedState::Watched {
            self.touch_last_watched(show_id, &mut ops)?;
        }
        ops.push(self.episode_job(show_id, EpisodeFlagValue::Watched(state), numbers)?);
        self.apply_for_show(show_id, ops)
    }

    #[instrument(skip(self))]
    pub fn set_episode_collected(&self, episode_id: EpisodeId, collected: bool) -> StoreResult<()> {
        let episode = self
            .store
            .episode(episode_id)?
            .ok_or_else(|| StoreError::Write(format!("unknown episode {}", episode_id)))?;
        let ops = vec![
            StoreOp::SetEpisodeCollected { episode_id, collected },
            self.episode_job(
                episode.show_id,
                EpisodeFlagValue::Collected(collected),
                vec![EpisodeNumber::new(episode.season, episode.number)],
            )?,
        ];
        self.apply_for_show(episode.show_id, ops)
    }

    #[instrument(skip(self))]
    pub fn set_season_collected(&self, season_id: SeasonId, collected: bool) -> StoreResult<()> {
        let (show_id, numbers) = self.season_numbers(season_id)?;
        let ops = vec![
            StoreOp::SetSeasonCollected { season_id, collected },
            self.episode_job(show_id, EpisodeFlagValue::Collected(collected), numbers)?,
        ];
        self.apply_for_show(show_id, ops)
    }

    /// Movies not in the library yet are added as shells.
    #[instrument(skip(self))]
    pub fn set_movie_flag(&self, movie_id: MovieId, flag: MovieFlag, value: bool) -> StoreResult<()> {
        let payload = MovieFlagPayload { movie_id, flag, value };
        let ops = vec![
            StoreOp::InsertMovieShell(Movie::shell(movie_id)),
            StoreOp::SetMovieFlag { movie_id, flag, value },
            StoreOp::InsertJob(NewJob::encode(movie_action(flag), &payload)?),
        ];
        self.store.apply_batch(ops)
    }

    #[instrument(skip(self, items))]
    pub fn add_list_items(&self, list_id: &str, items: &[ListItemRef]) -> StoreResult<()> {
        let mut ops: Vec<StoreOp> = items
            .iter()
            .map(|item| StoreOp::InsertListItem(ListItem::new(item.ref_id, item.item_type, list_id)))
            .collect();
        ops.push(self.list_items_job(JobAction::ListItemsAdd, list_id, items)?);
        self.store.apply_batch(ops)
    }

    #[instrument(skip(self, items))]
    pub fn remove_list_items(&self, list_id: &str, items: &[ListItemRef]) -> StoreResult<()> {
        let mut ops: Vec<StoreOp> = items
            .iter()
            .map(|item| StoreOp::DeleteListItem(ListItem::new(item.ref_id, item.item_type, list_id).id))
            .collect();
        ops.push(self.list_items_job(JobAction::ListItemsRemove, list_id, items)?);
        self.store.apply_batch(ops)
    }

    #[instrument(skip(self))]
    pub fn delete_list(&self, list_id: &str) -> StoreResult<()> {
        let payload = ListDeletePayload {
            list_id: list_id.to_string(),
        };
        self.store.apply_batch(vec![
            StoreOp::DeleteList(list_id.to_string()),
            StoreOp::InsertJob(NewJob::encode(JobAction::ListDelete, &payload)?),
        ])
    }

    fn season_numbers(&self, season_id: SeasonId) -> StoreResult<(ShowId, Vec<EpisodeNumber>)> {
        let season = self
            .store
            .season(season_id)?
            .ok_or_else(|| StoreError::Write(format!("unknown season {}", season_id)))?;
        let numbers = self
            .store
            .episodes_of_season(season_id)?
            .iter()
            .map(|e| EpisodeNumber::new(season.number, e.number))
            .collect();
        Ok((season.show_id, numbers))
    }

    fn touch_last_watched(&self, show_id: ShowId, ops: &mut Vec<StoreOp>) -> StoreResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        if self.store.last_watched_ms(show_id)?.map(|local| now_ms > local).unwrap_or(true) {
            ops.push(StoreOp::SetShowLastWatched {
                show_id,
                last_watched_ms: now_ms,
            });
        }
        Ok(())
    }

    fn episode_job(&self, show_id: ShowId, value: EpisodeFlagValue, episodes: Vec<EpisodeNumber>) -> StoreResult<StoreOp> {
        let action = match value {
            EpisodeFlagValue::Watched(_) => JobAction::EpisodeWatched,
            EpisodeFlagValue::Collected(_) => JobAction::EpisodeCollected,
        };
        let payload = EpisodeFlagPayload {
            show_id,
            value,
            episodes,
        };
        Ok(StoreOp::InsertJob(NewJob::encode(action, &payload)?))
    }

    fn list_items_job(&self, action: JobAction, list_id: &str, items: &[ListItemRef]) -> StoreResult<StoreOp> {
        let payload = ListItemsPayload {
            list_id: list_id.to_string(),
            items: items.to_vec(),
        };
        Ok(StoreOp::InsertJob(NewJob::encode(action, &payload)?))
    }

    fn apply_for_show(&self, show_id: ShowId, ops: Vec<StoreOp>) -> StoreResult<()> {
        debug!(show_id, ops = ops.len(), "applying local change");
        self.store.apply_batch(ops)?;
        self.store.notify_changed(&[show_id])
    }
}
