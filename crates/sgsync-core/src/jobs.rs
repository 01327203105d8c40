use sgsync_models::{
    EpisodeFlagChange, EpisodeFlagPayload, EpisodeFlagValue, JobAction, JobId, ListDeletePayload, ListItemsPayload,
    MovieFlag, MovieFlagChange, MovieFlagPayload, PendingJob, WatchedState,
};
use sgsync_sources::{CloudService, TraktService};
use tracing::{debug, info, instrument, warn};
use crate::error::{ServiceKind, SyncError};
use crate::gate::Interrupt;
use crate::store::{LocalStore, StoreOp};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
    pub processed: usize,
    /// Jobs whose payload could not be understood; removed without sending.
    pub discarded: usize,
    pub remaining: usize,
}

enum Dispatch {
    Episode(EpisodeFlagPayload),
    Movie(MovieFlagPayload),
    ListItemsAdd(ListItemsPayload),
    ListItemsRemove(ListItemsPayload),
    ListDelete(ListDeletePayload),
}

enum JobFailure {
    /// Retrying cannot help.
    Invalid(String),
    Remote(SyncError),
}

impl From<SyncError> for JobFailure {
    fn from(e: SyncError) -> Self {
        JobFailure::Remote(e)
    }
}

fn decode(job: &PendingJob) -> Result<Dispatch, String> {
    let invalid = |e: serde_json::Error| format!("undecodable payload: {}", e);
    let dispatch = match job.action {
        JobAction::EpisodeWatched | JobAction::EpisodeCollected => {
            let payload: EpisodeFlagPayload = job.decode().map_err(invalid)?;
            let matches = matches!(
                (job.action, payload.value),
                (JobAction::EpisodeWatched, EpisodeFlagValue::Watched(_))
                    | (JobAction::EpisodeCollected, EpisodeFlagValue::Collected(_))
            );
            if !matches {
                return Err(format!("{} job carries a {} value", job.action, payload.value.kind()));
            }
            Dispatch::Episode(payload)
        }
        JobAction::MovieCollection | JobAction::MovieWatchlist | JobAction::MovieWatched => {
            let payload: MovieFlagPayload = job.decode().map_err(invalid)?;
            let expected = match job.action {
                JobAction::MovieCollection => MovieFlag::Collection,
                JobAction::MovieWatchlist => MovieFlag::Watchlist,
                _ => MovieFlag::Watched,
            };
            if payload.flag != expected {
                return Err(format!("{} job carries a {:?} flag", job.action, payload.flag));
            }
            Dispatch::Movie(payload)
        }
        JobAction::ListItemsAdd => Dispatch::ListItemsAdd(job.decode().map_err(invalid)?),
        JobAction::ListItemsRemove => Dispatch::ListItemsRemove(job.decode().map_err(invalid)?),
        JobAction::ListDelete => Dispatch::ListDelete(job.decode().map_err(invalid)?),
    };
    Ok(dispatch)
}

fn movie_change(payload: &MovieFlagPayload) -> MovieFlagChange {
    MovieFlagChange {
        movie_id: payload.movie_id,
        flag: payload.flag,
        value: payload.value,
    }
}

/// Sends queued local changes to every configured destination, oldest first.
///
/// A job leaves the queue only after all destinations accepted it. The first
/// failure stops the drain so a later job never overtakes an earlier one.
pub struct JobQueue<'a> {
    store: &'a dyn LocalStore,
    cloud: Option<&'a dyn CloudService>,
    trakt: Option<&'a dyn TraktService>,
    interrupt: Interrupt,
}

impl<'a> JobQueue<'a> {
    pub fn new(
        store: &'a dyn LocalStore,
        cloud: Option<&'a dyn CloudService>,
        trakt: Option<&'a dyn TraktService>,
    ) -> Self {
        Self {
            store,
            cloud,
            trakt,
            interrupt: Interrupt::never(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    #[instrument(skip(self))]
    pub async fn process(&self) -> Result<JobReport, SyncError> {
        if self.cloud.is_none() && self.trakt.is_none() {
            debug!("no job destination configured");
            return Ok(JobReport::default());
        }

        let jobs = self.store.pending_jobs()?;
        if jobs.is_empty() {
            return Ok(JobReport::default());
        }

        let mut report = JobReport::default();
        let mut done: Vec<JobId> = Vec::new();
        let mut failure = None;

        for job in &jobs {
            if let Err(e) = self.interrupt.check() {
                failure = Some(e);
                break;
            }
            match self.dispatch(job).await {
                Ok(()) => {
                    debug!(job_id = job.id, action = %job.action, "job delivered");
                    report.processed += 1;
                    done.push(job.id);
                }
                Err(JobFailure::Invalid(reason)) => {
                    warn!(job_id = job.id, action = %job.action, reason = %reason, "discarding invalid job");
                    report.discarded += 1;
                    done.push(job.id);
                }
                Err(JobFailure::Remote(e)) => {
                    warn!(
                        operation = "job_drain",
                        job_id = job.id,
                        action = %job.action,
                        status = "error",
                        error = %e,
                        "job delivery failed, keeping it and every later job queued"
                    );
                    failure = Some(e);
                    break;
                }
            }
        }

        report.remaining = jobs.len() - done.len();
        if !done.is_empty() {
            self.store.apply_batch(vec![StoreOp::DeleteJobs(done)])?;
        }

        match failure {
            Some(e) => Err(e),
            None => {
                info!(
                    operation = "job_drain",
                    status = "success",
                    processed = report.processed,
                    discarded = report.discarded,
                    "job queue drained"
                );
                Ok(report)
            }
        }
    }

    async fn dispatch(&self, job: &PendingJob) -> Result<(), JobFailure> {
        let dispatch = decode(job).map_err(JobFailure::Invalid)?;
        if let Some(cloud) = self.cloud {
            self.send_to_cloud(cloud, &dispatch).await?;
        }
        if let Some(trakt) = self.trakt {
            self.send_to_trakt(trakt, &dispatch).await?;
        }
        Ok(())
    }

    async fn send_to_cloud(&self, cloud: &dyn CloudService, dispatch: &Dispatch) -> Result<(), SyncError> {
        let result = match dispatch {
            Dispatch::Episode(payload) => {
                let change = EpisodeFlagChange {
                    show_id: payload.show_id,
                    trakt_id: self.store.show_trakt_id(payload.show_id)?,
                    value: payload.value,
                    episodes: payload.episodes.clone(),
                };
                cloud.send_episode_flags(&[change]).await
            }
            Dispatch::Movie(payload) => cloud.send_movie_flags(&[movie_change(payload)]).await,
            Dispatch::ListItemsAdd(payload) => cloud.add_list_items(&payload.list_id, &payload.items).await,
            Dispatch::ListItemsRemove(payload) => cloud.remove_list_items(&payload.list_id, &payload.items).await,
            Dispatch::ListDelete(payload) => cloud.delete_list(&payload.list_id).await,
        };
        result.map_err(|e| SyncError::from_remote(ServiceKind::Cloud, e))
    }

    /// Lists and skipped episodes have no trakt counterpart, and shows
    /// without a trakt id cannot be addressed; those succeed without a call.
    async fn send_to_trakt(&self, trakt: &dyn TraktService, dispatch: &Dispatch) -> Result<(), SyncError> {
        let result = match dispatch {
            Dispatch::Episode(payload) => {
                if payload.value == EpisodeFlagValue::Watched(WatchedState::Skipped) {
                    return Ok(());
                }
                let Some(trakt_id) = self.store.show_trakt_id(payload.show_id)? else {
                    debug!(show_id = payload.show_id, "show has no trakt id, nothing to send");
                    return Ok(());
                };
                let change = EpisodeFlagChange {
                    show_id: payload.show_id,
                    trakt_id: Some(trakt_id),
                    value: payload.value,
                    episodes: payload.episodes.clone(),
                };
                trakt.send_episode_flags(&[change]).await
            }
            Dispatch::Movie(payload) => trakt.send_movie_flags(&[movie_change(payload)]).await,
            Dispatch::ListItemsAdd(_) | Dispatch::ListItemsRemove(_) | Dispatch::ListDelete(_) => return Ok(()),
        };
        result.map_err(|e| SyncError::from_remote(ServiceKind::Trakt, e))
    }
}
