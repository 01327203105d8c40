use chrono::Utc;
use sgsync_models::{Episode, Season, Show, ShowDetails, ShowId, WatchedState};
use sgsync_sources::{MetadataService, TraktService};
use std::collections::HashSet;
use tracing::{debug, instrument, warn};
use crate::error::{ServiceKind, SyncError};
use crate::store::{LocalStore, StoreOp};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowUpdate {
    pub inserted: bool,
    pub episodes: usize,
    pub removed_episodes: usize,
    pub trakt_id_resolved: bool,
}

fn show_from_details(details: &ShowDetails) -> Show {
    let mut show = Show::new(details.id, details.title.clone());
    show.status = details.status;
    show.release_weekday = details.release_weekday;
    show.release_time = details.release_time.clone();
    show.release_timezone = details.release_timezone.clone();
    show.language = details.language.clone();
    show.last_updated = Some(Utc::now());
    show
}

/// Fetch one show from the metadata provider and write it to the store in a
/// single batch. Flags of existing episodes are kept; seasons and episodes the
/// provider no longer lists are removed.
///
/// With `trakt` given, a missing trakt id is looked up; a failed lookup only
/// logs. Derived show values are left to the caller's notify step.
#[instrument(skip(store, metadata, trakt))]
pub async fn update_show(
    store: &dyn LocalStore,
    metadata: &dyn MetadataService,
    trakt: Option<&dyn TraktService>,
    show_id: ShowId,
) -> Result<ShowUpdate, SyncError> {
    let details = metadata
        .fetch_show(show_id)
        .await
        .map_err(|e| SyncError::from_remote(ServiceKind::Metadata, e))?;
    if details.id != show_id {
        return Err(SyncError::MalformedRemoteData(format!(
            "{}: asked for show {}, got {}",
            metadata.service_name(),
            show_id,
            details.id
        )));
    }

    let existing = store.show(show_id)?;
    let mut update = ShowUpdate {
        inserted: existing.is_none(),
        episodes: details.episodes.len(),
        ..ShowUpdate::default()
    };

    let mut ops = vec![StoreOp::UpsertShowMetadata(show_from_details(&details))];
    let season_ids: HashSet<u32> = details.seasons.iter().map(|s| s.id).collect();
    let episode_ids: HashSet<u32> = details.episodes.iter().map(|e| e.id).collect();

    for season in &details.seasons {
        ops.push(StoreOp::UpsertSeason(Season {
            id: season.id,
            show_id,
            number: season.number,
        }));
    }
    for episode in &details.episodes {
        if !season_ids.contains(&episode.season_id) {
            warn!(show_id, episode_id = episode.id, "skipping episode of unknown season");
            continue;
        }
        ops.push(StoreOp::UpsertEpisodeMetadata(Episode {
            id: episode.id,
            show_id,
            season_id: episode.season_id,
            season: episode.season,
            number: episode.number,
            absolute_number: episode.absolute_number,
            dvd_number: episode.dvd_number,
            title: episode.title.clone(),
            first_aired: episode.first_aired,
            watched: WatchedState::Unwatched,
            collected: false,
            last_edited: None,
        }));
    }

    if existing.is_some() {
        for episode in store.episodes_of_show(show_id)? {
            if !episode_ids.contains(&episode.id) {
                ops.push(StoreOp::DeleteEpisode(episode.id));
                update.removed_episodes += 1;
            }
        }
        for season in store.seasons_of_show(show_id)? {
            if !season_ids.contains(&season.id) {
                ops.push(StoreOp::DeleteSeason(season.id));
            }
        }
    }

    let known_trakt_id = existing.as_ref().and_then(|show| show.trakt_id);
    if let (None, Some(trakt)) = (known_trakt_id, trakt) {
        match trakt.lookup_show_trakt_id(show_id).await {
            Ok(Some(trakt_id)) => {
                ops.push(StoreOp::SetShowTraktId { show_id, trakt_id });
                update.trakt_id_resolved = true;
            }
            Ok(None) => debug!(show_id, "show not known to trakt"),
            Err(e) => warn!(show_id, error = %e, "trakt id lookup failed"),
        }
    }

    store.apply_batch(ops)?;
    debug!(
        show_id,
        inserted = update.inserted,
        episodes = update.episodes,
        removed = update.removed_episodes,
        "show metadata updated"
    );
    Ok(update)
}
