use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    DrainJobs,
    UpdateShow,
    MetadataRefresh,
    ShowMetadataUpdate,
    FlagReconcile,
    ListReconcile,
    MovieReconcile,
    NotifyLocalStore,
    UpdateCursorsAndBackoff,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncStage::DrainJobs => "drain_jobs",
            SyncStage::UpdateShow => "update_show",
            SyncStage::MetadataRefresh => "metadata_refresh",
            SyncStage::ShowMetadataUpdate => "show_metadata_update",
            SyncStage::FlagReconcile => "flag_reconcile",
            SyncStage::ListReconcile => "list_reconcile",
            SyncStage::MovieReconcile => "movie_reconcile",
            SyncStage::NotifyLocalStore => "notify_local_store",
            SyncStage::UpdateCursorsAndBackoff => "update_cursors_and_backoff",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    Incomplete,
    /// Not applicable, or its service was revoked earlier in the run.
    Skipped,
}

/// Observer for a running sync.
pub trait SyncProgressListener: Send + Sync {
    fn stage_started(&self, _stage: SyncStage) {}
    fn stage_finished(&self, _stage: SyncStage, _outcome: StageOutcome) {}
    fn warning(&self, _message: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl SyncProgressListener for NoopProgress {}
