use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use sgsync_config::{FlagSource, SyncSettings, SyncStateStore};
use sgsync_models::{FlagKind, LastActivity, ShowId};
use sgsync_sources::{CloudService, MetadataService, TraktService};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use crate::backoff::Backoff;
use crate::error::{ServiceKind, SyncError};
use crate::flags::{FlagReconciler, FlagService};
use crate::gate::{AlwaysConnected, AtomicSyncGate, Connectivity, GateGuard, Interrupt, SyncGate};
use crate::jobs::JobQueue;
use crate::lists::ListReconciler;
use crate::metadata::update_show;
use crate::movies::MovieReconciler;
use crate::progress::{NoopProgress, StageOutcome, SyncProgressListener, SyncStage};
use crate::store::LocalStore;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRequest {
    /// Drain jobs and refresh one show's metadata.
    Single(ShowId),
    /// Refresh stale shows and reconcile what changed since the cursors.
    Delta,
    /// Refresh every show and reconcile regardless of cursors.
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Incomplete,
    /// Credentials of `service` were rejected; the user has to sign in again.
    AuthRequired { service: String },
    AlreadyRunning,
    Offline,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub status: SyncStatus,
    pub stages: Vec<(SyncStage, StageOutcome)>,
    pub errors: Vec<String>,
    pub duration: Duration,
    /// None when the run does not schedule the next one.
    pub next_sync_in: Option<Duration>,
    pub consecutive_failures: u32,
    pub persistent_warning: bool,
}

impl SyncResult {
    fn not_started(status: SyncStatus, start: Instant, next_sync_in: Option<Duration>, failures: u32) -> Self {
        Self {
            status,
            stages: Vec::new(),
            errors: Vec::new(),
            duration: start.elapsed(),
            next_sync_in,
            consecutive_failures: failures,
            persistent_warning: false,
        }
    }

    pub fn outcome(&self, stage: SyncStage) -> Option<StageOutcome> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, outcome)| *outcome)
    }
}

/// Which remote episode flags are reconciled against. Chosen once when the
/// orchestrator is built.
#[derive(Clone)]
pub enum FlagAuthority {
    Cloud(Arc<dyn CloudService>),
    Trakt(Arc<dyn TraktService>),
    None,
}

impl FlagAuthority {
    pub fn resolve(
        source: FlagSource,
        cloud: Option<&Arc<dyn CloudService>>,
        trakt: Option<&Arc<dyn TraktService>>,
    ) -> Self {
        match (source, cloud, trakt) {
            (FlagSource::Auto | FlagSource::Cloud, Some(cloud), _) => FlagAuthority::Cloud(cloud.clone()),
            (FlagSource::Auto | FlagSource::Trakt, _, Some(trakt)) => FlagAuthority::Trakt(trakt.clone()),
            _ => FlagAuthority::None,
        }
    }

    pub fn service(&self) -> Option<FlagService> {
        match self {
            FlagAuthority::Cloud(_) => Some(FlagService::Cloud),
            FlagAuthority::Trakt(_) => Some(FlagService::Trakt),
            FlagAuthority::None => None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.service().map_or("none", |service| service.kind().as_str())
    }
}

/// Remote services the orchestrator talks to. Any of them may be missing.
#[derive(Clone, Default)]
pub struct SyncServices {
    pub cloud: Option<Arc<dyn CloudService>>,
    pub trakt: Option<Arc<dyn TraktService>>,
    pub metadata: Option<Arc<dyn MetadataService>>,
}

/// Stages, errors and revoked services of one run.
struct RunLog<'a> {
    progress: &'a dyn SyncProgressListener,
    stages: Vec<(SyncStage, StageOutcome)>,
    errors: Vec<String>,
    revoked: Vec<ServiceKind>,
    incomplete: bool,
    /// Network lost or cancelled: remaining remote stages are skipped.
    stopped: bool,
}

impl<'a> RunLog<'a> {
    fn new(progress: &'a dyn SyncProgressListener) -> Self {
        Self {
            progress,
            stages: Vec::new(),
            errors: Vec::new(),
            revoked: Vec::new(),
            incomplete: false,
            stopped: false,
        }
    }

    fn start(&self, stage: SyncStage) {
        debug!(stage = %stage, "stage started");
        self.progress.stage_started(stage);
    }

    fn finish(&mut self, stage: SyncStage, outcome: StageOutcome) {
        debug!(stage = %stage, outcome = ?outcome, "stage finished");
        self.progress.stage_finished(stage, outcome);
        self.stages.push((stage, outcome));
    }

    fn skip(&mut self, stage: SyncStage) {
        self.start(stage);
        self.finish(stage, StageOutcome::Skipped);
    }

    fn warn(&mut self, stage: SyncStage, message: String) {
        let message = format!("{}: {}", stage, message);
        self.progress.warning(&message);
        self.errors.push(message);
        self.incomplete = true;
    }

    fn fail(&mut self, stage: SyncStage, error: &SyncError) {
        warn!(
            operation = "sync_stage",
            stage = %stage,
            status = "error",
            error = %error,
            "sync stage failed"
        );
        let message = format!("{}: {}", stage, error);
        self.progress.warning(&message);
        self.errors.push(message);
        match error.unauthorized_service() {
            Some(service) => {
                if !self.is_revoked(service) {
                    self.revoked.push(service);
                }
            }
            None => {
                self.incomplete = true;
                self.stopped |= error.stops_run();
            }
        }
    }

    fn is_revoked(&self, service: ServiceKind) -> bool {
        self.revoked.contains(&service)
    }
}

/// Runs the sync pipeline: drain jobs, refresh metadata, reconcile flags,
/// lists and movies, then schedule the next run.
pub struct SyncOrchestrator {
    store: Arc<dyn LocalStore>,
    services: SyncServices,
    authority: FlagAuthority,
    settings: SyncSettings,
    backoff: Backoff,
    gate: Arc<dyn SyncGate>,
    connectivity: Arc<dyn Connectivity>,
    progress: Arc<dyn SyncProgressListener>,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn LocalStore>, services: SyncServices, settings: SyncSettings) -> Self {
        let authority = FlagAuthority::resolve(settings.flag_source, services.cloud.as_ref(), services.trakt.as_ref());
        if matches!(authority, FlagAuthority::None) {
            warn!(flag_source = ?settings.flag_source, "no remote configured for episode flags");
        }
        Self {
            store,
            services,
            authority,
            backoff: Backoff::from_settings(&settings),
            settings,
            gate: Arc::new(AtomicSyncGate::new()),
            connectivity: Arc::new(AlwaysConnected),
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn SyncGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn SyncProgressListener>) -> Self {
        self.progress = progress;
        self
    }

    pub fn authority(&self) -> &FlagAuthority {
        &self.authority
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    fn cloud(&self, log: &RunLog<'_>) -> Option<&dyn CloudService> {
        self.services.cloud.as_deref().filter(|_| !log.is_revoked(ServiceKind::Cloud))
    }

    fn trakt(&self, log: &RunLog<'_>) -> Option<&dyn TraktService> {
        self.services.trakt.as_deref().filter(|_| !log.is_revoked(ServiceKind::Trakt))
    }

    fn metadata(&self, log: &RunLog<'_>) -> Option<&dyn MetadataService> {
        self.services.metadata.as_deref().filter(|_| !log.is_revoked(ServiceKind::Metadata))
    }

    #[instrument(skip(self, state, cancel), fields(authority = self.authority.name()))]
    pub async fn run(&self, request: SyncRequest, state: &mut SyncStateStore, cancel: &CancellationToken) -> SyncResult {
        let start = Instant::now();
        let Some(_guard) = GateGuard::enter(self.gate.as_ref()) else {
            info!(operation = "sync_start", status = "skipped", "a sync is already running");
            return SyncResult::not_started(SyncStatus::AlreadyRunning, start, None, state.consecutive_failures());
        };
        if !self.connectivity.is_connected() {
            info!(operation = "sync_start", status = "offline", "no network, not syncing");
            let next = (!matches!(request, SyncRequest::Single(_))).then(|| self.backoff.interval());
            return SyncResult::not_started(SyncStatus::Offline, start, next, state.consecutive_failures());
        }

        info!(operation = "sync_start", request = ?request, "starting sync");
        let interrupt = Interrupt::new(cancel.clone(), self.connectivity.clone());
        let mut log = RunLog::new(self.progress.as_ref());

        self.drain_jobs(&interrupt, &mut log).await;

        if let SyncRequest::Single(show_id) = request {
            self.update_single_show(show_id, &mut log).await;
            return self.finish_single(log, start, state.consecutive_failures());
        }

        state.record_attempt(Utc::now());
        let force = request == SyncRequest::Full;
        let mut changed: BTreeSet<ShowId> = BTreeSet::new();

        let selected = self.select_shows(request, &mut log);
        self.update_shows(&selected, &interrupt, &mut log, &mut changed).await;

        let activity = self.reconcile_flags(state, force, &interrupt, &mut log, &mut changed).await;
        match &self.authority {
            FlagAuthority::Trakt(_) => self.reconcile_movies(state, activity, force, &interrupt, &mut log).await,
            FlagAuthority::Cloud(_) => self.reconcile_lists(state, force, &interrupt, &mut log).await,
            FlagAuthority::None => log.skip(SyncStage::ListReconcile),
        }

        log.start(SyncStage::NotifyLocalStore);
        let changed: Vec<ShowId> = changed.into_iter().collect();
        match self.store.notify_changed(&changed) {
            Ok(()) => log.finish(SyncStage::NotifyLocalStore, StageOutcome::Success),
            Err(e) => {
                log.fail(SyncStage::NotifyLocalStore, &SyncError::from(e));
                log.finish(SyncStage::NotifyLocalStore, StageOutcome::Incomplete);
            }
        }

        self.finish_run(log, state, start)
    }

    async fn drain_jobs(&self, interrupt: &Interrupt, log: &mut RunLog<'_>) {
        let stage = SyncStage::DrainJobs;
        let (cloud, trakt) = (self.cloud(log), self.trakt(log));
        if cloud.is_none() && trakt.is_none() {
            log.skip(stage);
            return;
        }
        log.start(stage);
        let queue = JobQueue::new(self.store.as_ref(), cloud, trakt).with_interrupt(interrupt.clone());
        match queue.process().await {
            Ok(report) => {
                debug!(processed = report.processed, discarded = report.discarded, "jobs drained");
                log.finish(stage, StageOutcome::Success);
            }
            Err(e) => {
                log.fail(stage, &e);
                log.finish(stage, StageOutcome::Incomplete);
            }
        }
    }

    async fn update_single_show(&self, show_id: ShowId, log: &mut RunLog<'_>) {
        let stage = SyncStage::UpdateShow;
        let Some(metadata) = self.metadata(log).filter(|_| !log.stopped) else {
            log.skip(stage);
            return;
        };
        log.start(stage);
        let result = match update_show(self.store.as_ref(), metadata, self.trakt(log), show_id).await {
            Ok(_) => self.store.notify_changed(&[show_id]).map_err(SyncError::from),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => log.finish(stage, StageOutcome::Success),
            Err(e) => {
                log.fail(stage, &e);
                log.finish(stage, StageOutcome::Incomplete);
            }
        }
    }

    /// Full refreshes every show, delta only shows not updated within the
    /// configured interval.
    fn select_shows(&self, request: SyncRequest, log: &mut RunLog<'_>) -> Vec<ShowId> {
        let stage = SyncStage::MetadataRefresh;
        if self.metadata(log).is_none() || log.stopped {
            log.skip(stage);
            return Vec::new();
        }
        log.start(stage);
        let stale_before = Utc::now() - ChronoDuration::hours(self.settings.show_update_interval_hours as i64);
        let shows = match self.store.shows() {
            Ok(shows) => shows,
            Err(e) => {
                log.fail(stage, &SyncError::from(e));
                log.finish(stage, StageOutcome::Incomplete);
                return Vec::new();
            }
        };
        let selected: Vec<ShowId> = shows
            .into_iter()
            .filter(|show| {
                request == SyncRequest::Full || show.last_updated.map(|at| at < stale_before).unwrap_or(true)
            })
            .map(|show| show.id)
            .collect();
        info!(shows = selected.len(), "selected shows for metadata refresh");
        log.finish(stage, StageOutcome::Success);
        selected
    }

    async fn update_shows(
        &self,
        show_ids: &[ShowId],
        interrupt: &Interrupt,
        log: &mut RunLog<'_>,
        changed: &mut BTreeSet<ShowId>,
    ) {
        let stage = SyncStage::ShowMetadataUpdate;
        let Some(metadata) = self.metadata(log).filter(|_| !log.stopped) else {
            log.skip(stage);
            return;
        };
        log.start(stage);
        let max_timeouts = self.settings.max_consecutive_timeouts.max(1);
        let mut consecutive_timeouts = 0;
        let mut outcome = StageOutcome::Success;

        for &show_id in show_ids {
            if let Err(e) = interrupt.check() {
                log.fail(stage, &e);
                outcome = StageOutcome::Incomplete;
                break;
            }
            match update_show(self.store.as_ref(), metadata, self.trakt(log), show_id).await {
                Ok(_) => {
                    consecutive_timeouts = 0;
                    changed.insert(show_id);
                }
                Err(SyncError::MalformedRemoteData(message)) => {
                    consecutive_timeouts = 0;
                    warn!(show_id, error = %message, "skipping show with malformed metadata");
                }
                Err(e) if e.is_timeout() => {
                    consecutive_timeouts += 1;
                    log.fail(stage, &e);
                    outcome = StageOutcome::Incomplete;
                    if consecutive_timeouts >= max_timeouts {
                        warn!(
                            operation = "metadata_update",
                            status = "aborted",
                            consecutive_timeouts,
                            "metadata service keeps timing out, skipping remaining shows"
                        );
                        break;
                    }
                }
                Err(e) => {
                    consecutive_timeouts = 0;
                    log.fail(stage, &e);
                    outcome = StageOutcome::Incomplete;
                    if e.stops_run() || e.unauthorized_service().is_some() {
                        break;
                    }
                }
            }
        }
        log.finish(stage, outcome);
    }

    /// Returns trakt's activity timestamps when trakt is the authority.
    async fn reconcile_flags(
        &self,
        state: &mut SyncStateStore,
        force: bool,
        interrupt: &Interrupt,
        log: &mut RunLog<'_>,
        changed: &mut BTreeSet<ShowId>,
    ) -> Option<LastActivity> {
        let stage = SyncStage::FlagReconcile;
        let revoked = self.authority.service().map_or(true, |service| log.is_revoked(service.kind()));
        if log.stopped || revoked {
            log.skip(stage);
            return None;
        }
        if let Err(e) = interrupt.check() {
            log.fail(stage, &e);
            log.skip(stage);
            return None;
        }
        log.start(stage);

        let reconciler = FlagReconciler::new(self.store.as_ref()).with_interrupt(interrupt.clone());
        let mut outcome = StageOutcome::Success;
        let mut activity = None;

        for kind in [FlagKind::Watched, FlagKind::Collected] {
            let result = match &self.authority {
                FlagAuthority::Cloud(cloud) => reconciler.sync(FlagService::Cloud, cloud.as_ref(), kind, state, None, force).await,
                FlagAuthority::Trakt(trakt) => {
                    if activity.is_none() {
                        match trakt.last_activity().await {
                            Ok(fetched) => activity = Some(fetched),
                            Err(e) => {
                                log.fail(stage, &SyncError::from_remote(ServiceKind::Trakt, e));
                                outcome = StageOutcome::Incomplete;
                                break;
                            }
                        }
                    }
                    let activity_at = activity.as_ref().and_then(|a| match kind {
                        FlagKind::Watched => a.episodes_watched_at,
                        FlagKind::Collected => a.episodes_collected_at,
                    });
                    reconciler.sync(FlagService::Trakt, trakt.as_ref(), kind, state, activity_at, force).await
                }
                FlagAuthority::None => break,
            };

            match result {
                Ok(report) => {
                    changed.extend(report.changed_shows.iter().copied());
                    if !report.complete {
                        log.warn(stage, format!("{} shows failed to update {} flags", report.failed_shows.len(), kind));
                        outcome = StageOutcome::Incomplete;
                    }
                }
                Err(e) => {
                    log.fail(stage, &e);
                    outcome = StageOutcome::Incomplete;
                    if e.stops_run() || e.unauthorized_service().is_some() {
                        break;
                    }
                }
            }
        }

        log.finish(stage, outcome);
        activity
    }

    async fn reconcile_lists(
        &self,
        state: &mut SyncStateStore,
        force: bool,
        interrupt: &Interrupt,
        log: &mut RunLog<'_>,
    ) {
        let stage = SyncStage::ListReconcile;
        let Some(cloud) = self.cloud(log).filter(|_| !log.stopped) else {
            log.skip(stage);
            return;
        };
        if let Err(e) = interrupt.check() {
            log.fail(stage, &e);
            log.skip(stage);
            return;
        }
        log.start(stage);
        match ListReconciler::new(self.store.as_ref()).sync(cloud, state, force).await {
            Ok(_) => log.finish(stage, StageOutcome::Success),
            Err(e) => {
                log.fail(stage, &e);
                log.finish(stage, StageOutcome::Incomplete);
            }
        }
    }

    async fn reconcile_movies(
        &self,
        state: &mut SyncStateStore,
        activity: Option<LastActivity>,
        force: bool,
        interrupt: &Interrupt,
        log: &mut RunLog<'_>,
    ) {
        let stage = SyncStage::MovieReconcile;
        let (Some(trakt), Some(activity)) = (self.trakt(log).filter(|_| !log.stopped), activity) else {
            log.skip(stage);
            return;
        };
        if let Err(e) = interrupt.check() {
            log.fail(stage, &e);
            log.skip(stage);
            return;
        }
        log.start(stage);
        let reconciler = MovieReconciler::new(self.store.as_ref());
        let result = match reconciler.sync_lists(trakt, state, &activity, force).await {
            Ok(_) => reconciler
                .download_watched(trakt, state, activity.movies_watched_at, force)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => log.finish(stage, StageOutcome::Success),
            Err(e) => {
                log.fail(stage, &e);
                log.finish(stage, StageOutcome::Incomplete);
            }
        }
    }

    fn finish_single(&self, log: RunLog<'_>, start: Instant, failures: u32) -> SyncResult {
        let status = if let Some(service) = log.revoked.first() {
            SyncStatus::AuthRequired {
                service: service.to_string(),
            }
        } else if log.incomplete {
            SyncStatus::Incomplete
        } else {
            SyncStatus::Success
        };
        info!(
            operation = "sync_complete",
            status = ?status,
            duration_ms = start.elapsed().as_millis(),
            "single show sync finished"
        );
        SyncResult {
            status,
            stages: log.stages,
            errors: log.errors,
            duration: start.elapsed(),
            next_sync_in: None,
            consecutive_failures: failures,
            persistent_warning: false,
        }
    }

    fn finish_run(&self, mut log: RunLog<'_>, state: &mut SyncStateStore, start: Instant) -> SyncResult {
        let stage = SyncStage::UpdateCursorsAndBackoff;
        log.start(stage);

        let (status, next_sync_in) = if let Some(service) = log.revoked.first() {
            // Failures of other stages still count toward backoff.
            let next_sync_in = if log.incomplete {
                self.backoff.retry_delay(state.record_failure())
            } else {
                self.backoff.interval()
            };
            (
                SyncStatus::AuthRequired {
                    service: service.to_string(),
                },
                next_sync_in,
            )
        } else if log.incomplete {
            let failures = state.record_failure();
            (SyncStatus::Incomplete, self.backoff.retry_delay(failures))
        } else {
            state.record_success(Utc::now());
            (SyncStatus::Success, self.backoff.interval())
        };
        let consecutive_failures = state.consecutive_failures();
        let persistent_warning = consecutive_failures >= self.settings.warn_after_failures.max(1);
        if persistent_warning {
            log.progress.warning(&format!("sync failed {} times in a row", consecutive_failures));
        }

        match state.save() {
            Ok(()) => log.finish(stage, StageOutcome::Success),
            Err(e) => {
                warn!(error = %e, "failed to save sync state");
                log.errors.push(format!("{}: {}", stage, e));
                log.finish(stage, StageOutcome::Incomplete);
            }
        }

        let duration = start.elapsed();
        info!(
            operation = "sync_complete",
            status = ?status,
            duration_ms = duration.as_millis(),
            errors = log.errors.len(),
            consecutive_failures,
            next_sync_secs = next_sync_in.as_secs(),
            "sync finished"
        );
        SyncResult {
            status,
            stages: log.stages,
            errors: log.errors,
            duration,
            next_sync_in: Some(next_sync_in),
            consecutive_failures,
            persistent_warning,
        }
    }
}
