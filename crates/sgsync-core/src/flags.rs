use chrono::{DateTime, Utc};
use sgsync_config::{merge_keys, SyncStateStore};
use sgsync_models::{
    CursorKind, EpisodeFlagChange, EpisodeFlagValue, EpisodeFlags, EpisodeNumber, FlagKind, RemoteShowFlags, Season,
    ShowId, WatchedState,
};
use sgsync_sources::EpisodeFlagRemote;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};
use crate::error::{ServiceKind, StoreResult, SyncError};
use crate::gate::Interrupt;
use crate::store::{LocalStore, StoreOp};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// The remote is ground truth: local flags are set and cleared to match.
    Mirror,
    /// First contact: remote flags are added locally, local-only flags are
    /// uploaded instead of cleared.
    MergeUploadMissing,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteShowState {
    pub trakt_id: Option<u64>,
    pub last_watched_at: Option<DateTime<Utc>>,
    /// Season number to flagged episode numbers.
    pub seasons: HashMap<u32, HashSet<u32>>,
}

impl RemoteShowState {
    fn is_flagged(&self, season: u32, number: u32) -> bool {
        self.seasons
            .get(&season)
            .map(|episodes| episodes.contains(&number))
            .unwrap_or(false)
    }
}

/// What a remote considers flagged, keyed by local show id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteFlagState {
    shows: HashMap<ShowId, RemoteShowState>,
    malformed: usize,
}

impl RemoteFlagState {
    /// Records without a usable show id are skipped.
    pub fn from_records(records: Vec<RemoteShowFlags>) -> Self {
        let mut state = Self::default();
        for record in records {
            let Some(show_id) = record.show_id else {
                warn!(
                    trakt_id = record.trakt_id,
                    title = record.title.as_deref().unwrap_or("unknown"),
                    "skipping remote show without show id"
                );
                state.malformed += 1;
                continue;
            };
            let show = state.shows.entry(show_id).or_default();
            show.trakt_id = show.trakt_id.or(record.trakt_id);
            show.last_watched_at = show.last_watched_at.max(record.last_watched_at);
            for season in record.seasons {
                show.seasons.entry(season.number).or_default().extend(season.episodes);
            }
        }
        state
    }

    pub fn get(&self, show_id: ShowId) -> Option<&RemoteShowState> {
        self.shows.get(&show_id)
    }

    pub fn len(&self) -> usize {
        self.shows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shows.is_empty()
    }

    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagReport {
    /// False if any show's batch could not be applied.
    pub complete: bool,
    pub changed_shows: Vec<ShowId>,
    pub failed_shows: Vec<ShowId>,
    /// Local-only flags that have to be sent to the remote (merge mode).
    pub uploads: Vec<EpisodeFlagChange>,
    pub skipped_malformed: usize,
    /// The remote reported nothing new since the last cursor.
    pub unchanged: bool,
}

struct ShowPlan {
    ops: Vec<StoreOp>,
    upload: Vec<EpisodeNumber>,
    trakt_id: Option<u64>,
}

fn is_set(kind: FlagKind, episode: &EpisodeFlags) -> bool {
    match kind {
        FlagKind::Watched => episode.watched == WatchedState::Watched,
        FlagKind::Collected => episode.collected,
    }
}

fn set_value(kind: FlagKind) -> EpisodeFlagValue {
    match kind {
        FlagKind::Watched => EpisodeFlagValue::Watched(WatchedState::Watched),
        FlagKind::Collected => EpisodeFlagValue::Collected(true),
    }
}

fn cursor_kind(kind: FlagKind) -> CursorKind {
    match kind {
        FlagKind::Watched => CursorKind::EpisodesWatched,
        FlagKind::Collected => CursorKind::EpisodesCollected,
    }
}

/// The services that hold episode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagService {
    Cloud,
    Trakt,
}

impl FlagService {
    pub fn kind(self) -> ServiceKind {
        match self {
            FlagService::Cloud => ServiceKind::Cloud,
            FlagService::Trakt => ServiceKind::Trakt,
        }
    }
}

/// Merge flag key for `kind` on `service`.
pub fn merge_key(service: FlagService, kind: FlagKind) -> &'static str {
    match (service, kind) {
        (FlagService::Cloud, FlagKind::Watched) => merge_keys::CLOUD_EPISODES_WATCHED,
        (FlagService::Cloud, FlagKind::Collected) => merge_keys::CLOUD_EPISODES_COLLECTED,
        (FlagService::Trakt, FlagKind::Watched) => merge_keys::TRAKT_EPISODES_WATCHED,
        (FlagService::Trakt, FlagKind::Collected) => merge_keys::TRAKT_EPISODES_COLLECTED,
    }
}

/// Aligns local episode flags with what a remote reports.
pub struct FlagReconciler<'a> {
    store: &'a dyn LocalStore,
    interrupt: Interrupt,
    collapse_seasons: bool,
}

impl<'a> FlagReconciler<'a> {
    pub fn new(store: &'a dyn LocalStore) -> Self {
        Self {
            store,
            interrupt: Interrupt::never(),
            collapse_seasons: true,
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Write whole-season updates when every episode of a season changes.
    /// Disabling it yields the same end state with one update per episode.
    pub fn with_season_collapse(mut self, collapse: bool) -> Self {
        self.collapse_seasons = collapse;
        self
    }

    /// Apply the local mutations needed to align `show_ids` with `remote`,
    /// one batch per show, and collect what merge mode has to upload.
    ///
    /// `requires_trakt_id` limits uploads of shows the remote does not know
    /// to shows with a trakt id.
    pub fn reconcile(
        &self,
        kind: FlagKind,
        show_ids: &[ShowId],
        remote: &RemoteFlagState,
        mode: ReconcileMode,
        requires_trakt_id: bool,
    ) -> Result<FlagReport, SyncError> {
        let mut report = FlagReport {
            complete: true,
            skipped_malformed: remote.malformed(),
            ..FlagReport::default()
        };

        for &show_id in show_ids {
            self.interrupt.check()?;

            let plan = match self.plan_show(kind, show_id, remote.get(show_id), mode, requires_trakt_id) {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(show_id, kind = %kind, error = %e, "failed to read local flags");
                    report.complete = false;
                    report.failed_shows.push(show_id);
                    continue;
                }
            };

            if !plan.ops.is_empty() {
                let op_count = plan.ops.len();
                match self.store.apply_batch(plan.ops) {
                    Ok(()) => {
                        debug!(show_id, kind = %kind, ops = op_count, "applied flag batch");
                        report.changed_shows.push(show_id);
                    }
                    Err(e) => {
                        warn!(
                            operation = "flag_batch",
                            show_id,
                            kind = %kind,
                            status = "error",
                            error = %e,
                            "failed to apply flag batch"
                        );
                        report.complete = false;
                        report.failed_shows.push(show_id);
                        continue;
                    }
                }
            }

            if !plan.upload.is_empty() {
                report.uploads.push(EpisodeFlagChange {
                    show_id,
                    trakt_id: plan.trakt_id,
                    value: set_value(kind),
                    episodes: plan.upload,
                });
            }
        }

        Ok(report)
    }

    fn plan_show(
        &self,
        kind: FlagKind,
        show_id: ShowId,
        remote: Option<&RemoteShowState>,
        mode: ReconcileMode,
        requires_trakt_id: bool,
    ) -> StoreResult<ShowPlan> {
        let local_trakt_id = self.store.show_trakt_id(show_id)?;
        let mut plan = ShowPlan {
            ops: Vec::new(),
            upload: Vec::new(),
            trakt_id: local_trakt_id,
        };

        let Some(remote) = remote else {
            self.plan_absent_show(kind, show_id, mode, requires_trakt_id, &mut plan)?;
            return Ok(plan);
        };

        if let (None, Some(trakt_id)) = (local_trakt_id, remote.trakt_id) {
            plan.ops.push(StoreOp::SetShowTraktId { show_id, trakt_id });
            plan.trakt_id = Some(trakt_id);
        }

        for season in self.store.seasons_of_show(show_id)? {
            let episodes = self.store.episodes_of_season(season.id)?;
            self.plan_season(kind, &season, &episodes, remote, mode, &mut plan);
        }

        if kind == FlagKind::Watched {
            if let Some(remote_at) = remote.last_watched_at {
                let remote_ms = remote_at.timestamp_millis();
                let local_ms = self.store.last_watched_ms(show_id)?;
                if local_ms.map(|local| remote_ms > local).unwrap_or(true) {
                    plan.ops.push(StoreOp::SetShowLastWatched {
                        show_id,
                        last_watched_ms: remote_ms,
                    });
                }
            }
        }

        Ok(plan)
    }

    fn plan_absent_show(
        &self,
        kind: FlagKind,
        show_id: ShowId,
        mode: ReconcileMode,
        requires_trakt_id: bool,
        plan: &mut ShowPlan,
    ) -> StoreResult<()> {
        let flagged: Vec<EpisodeNumber> = self
            .store
            .episodes_of_show(show_id)?
            .iter()
            .filter(|e| is_set(kind, &e.flags()))
            .map(|e| EpisodeNumber::new(e.season, e.number))
            .collect();
        if flagged.is_empty() {
            return Ok(());
        }

        match mode {
            ReconcileMode::Mirror => plan.ops.push(match kind {
                FlagKind::Watched => StoreOp::SetShowWatched {
                    show_id,
                    state: WatchedState::Unwatched,
                    only_if_watched: true,
                },
                FlagKind::Collected => StoreOp::SetShowCollected {
                    show_id,
                    collected: false,
                },
            }),
            ReconcileMode::MergeUploadMissing => {
                if requires_trakt_id && plan.trakt_id.is_none() {
                    debug!(show_id, "show has no trakt id, not uploading its flags");
                } else {
                    plan.upload = flagged;
                }
            }
        }
        Ok(())
    }

    fn plan_season(
        &self,
        kind: FlagKind,
        season: &Season,
        episodes: &[EpisodeFlags],
        remote: &RemoteShowState,
        mode: ReconcileMode,
        plan: &mut ShowPlan,
    ) {
        if episodes.is_empty() {
            return;
        }

        let to_set: Vec<&EpisodeFlags> = episodes
            .iter()
            .filter(|e| !is_set(kind, e) && remote.is_flagged(season.number, e.number))
            .collect();
        let local_only: Vec<&EpisodeFlags> = episodes
            .iter()
            .filter(|e| is_set(kind, e) && !remote.is_flagged(season.number, e.number))
            .collect();

        if !to_set.is_empty() {
            if self.collapse_seasons && to_set.len() == episodes.len() {
                plan.ops.push(season_op(kind, season, true));
            } else {
                plan.ops.extend(to_set.iter().map(|e| episode_op(kind, e, true)));
            }
        }

        if local_only.is_empty() {
            return;
        }
        match mode {
            ReconcileMode::Mirror => {
                if self.collapse_seasons && local_only.len() == episodes.len() {
                    plan.ops.push(season_op(kind, season, false));
                } else {
                    plan.ops.extend(local_only.iter().map(|e| episode_op(kind, e, false)));
                }
            }
            ReconcileMode::MergeUploadMissing => plan
                .upload
                .extend(local_only.iter().map(|e| EpisodeNumber::new(season.number, e.number))),
        }
    }

    /// Download `kind` flags from `remote`, acting as `service`, and reconcile
    /// every local show.
    ///
    /// Runs in merge mode until the merge flag for this service and kind is
    /// set, mirror mode afterwards. Skipped as a no-op when `remote_activity_at`
    /// is not newer than the stored cursor, unless `force` is set.
    #[instrument(skip(self, remote, state), fields(service = %service.kind(), remote = remote.service_name()))]
    pub async fn sync<R: EpisodeFlagRemote + ?Sized>(
        &self,
        service: FlagService,
        remote: &R,
        kind: FlagKind,
        state: &mut SyncStateStore,
        remote_activity_at: Option<DateTime<Utc>>,
        force: bool,
    ) -> Result<FlagReport, SyncError> {
        let merge_key = merge_key(service, kind);
        let source = service.kind();
        let merged = state.is_merged(merge_key);
        let cursor = cursor_kind(kind);

        if merged && !force && !state.has_changed_since_cursor(source.as_str(), cursor, remote_activity_at) {
            debug!(kind = %kind, "no remote changes since last sync");
            return Ok(FlagReport {
                complete: true,
                unchanged: true,
                ..FlagReport::default()
            });
        }

        let started_at = Utc::now();
        let records = remote
            .download_episode_flags(kind)
            .await
            .map_err(|e| SyncError::from_remote(source, e))?;
        let remote_state = RemoteFlagState::from_records(records);
        let mode = if merged {
            ReconcileMode::Mirror
        } else {
            ReconcileMode::MergeUploadMissing
        };
        info!(
            operation = "flag_sync",
            kind = %kind,
            mode = ?mode,
            remote_shows = remote_state.len(),
            malformed = remote_state.malformed(),
            "reconciling episode flags"
        );

        let show_ids = self.store.show_ids()?;
        let report = self.reconcile(kind, &show_ids, &remote_state, mode, remote.requires_trakt_id())?;

        if !report.uploads.is_empty() {
            let episodes: usize = report.uploads.iter().map(|u| u.episodes.len()).sum();
            info!(kind = %kind, shows = report.uploads.len(), episodes, "uploading local-only flags");
            remote
                .send_episode_flags(&report.uploads)
                .await
                .map_err(|e| SyncError::from_remote(source, e))?;
        }

        if report.complete {
            if !merged {
                state.set_merged(merge_key);
            }
            state.set_cursor(source.as_str(), cursor, remote_activity_at.unwrap_or(started_at));
        }

        info!(
            operation = "flag_sync",
            kind = %kind,
            status = if report.complete { "success" } else { "incomplete" },
            changed_shows = report.changed_shows.len(),
            failed_shows = report.failed_shows.len(),
            "episode flag sync finished"
        );
        Ok(report)
    }
}

fn episode_op(kind: FlagKind, episode: &EpisodeFlags, set: bool) -> StoreOp {
    match kind {
        FlagKind::Watched => StoreOp::SetEpisodeWatched {
            episode_id: episode.id,
            state: if set { WatchedState::Watched } else { WatchedState::Unwatched },
            only_if_watched: !set,
        },
        FlagKind::Collected => StoreOp::SetEpisodeCollected {
            episode_id: episode.id,
            collected: set,
        },
    }
}

fn season_op(kind: FlagKind, season: &Season, set: bool) -> StoreOp {
    match kind {
        FlagKind::Watched => StoreOp::SetSeasonWatched {
            season_id: season.id,
            state: if set { WatchedState::Watched } else { WatchedState::Unwatched },
            only_if_watched: !set,
        },
        FlagKind::Collected => StoreOp::SetSeasonCollected {
            season_id: season.id,
            collected: set,
        },
    }
}
