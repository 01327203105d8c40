use super::{build_orchestrator, build_services, forget_revoked_credentials, load_config, open_state, open_store};
use crate::output::Output;
use color_eyre::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use owo_colors::OwoColorize;
use sgsync_config::PathManager;
use sgsync_core::{StageOutcome, SyncProgressListener, SyncRequest, SyncResult, SyncStage, SyncStatus};
use sgsync_models::ShowId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Prints stage transitions on stderr while a sync runs.
pub struct StageReporter {
    enabled: bool,
}

impl StageReporter {
    pub fn new(output: &Output) -> Self {
        Self {
            enabled: output.is_human(),
        }
    }
}

impl SyncProgressListener for StageReporter {
    fn stage_started(&self, stage: SyncStage) {
        if self.enabled {
            eprintln!("{} {}", "→".cyan(), stage);
        }
    }

    fn warning(&self, message: &str) {
        if self.enabled {
            eprintln!("  {} {}", "⚠".yellow(), message);
        }
    }
}

pub fn request_from_args(full: bool, show: Option<ShowId>) -> SyncRequest {
    match (show, full) {
        (Some(show_id), _) => SyncRequest::Single(show_id),
        (None, true) => SyncRequest::Full,
        (None, false) => SyncRequest::Delta,
    }
}

pub async fn run_sync(full: bool, show: Option<ShowId>, output: &Output) -> Result<()> {
    tracing::debug!("Sync command started");
    let path_manager = PathManager::default();
    let config = load_config(&path_manager, output)?;
    let store = open_store(&path_manager)?;
    let mut state = open_state(&path_manager)?;
    let services = build_services(&config, &path_manager, output)?;

    let orchestrator = build_orchestrator(&config, store, services)
        .with_progress(Arc::new(StageReporter::new(output)));
    let request = request_from_args(full, show);

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(operation = "sync_interrupted", "Interrupt received, stopping after the current step");
            watcher.cancel();
        }
    });

    let result = orchestrator.run(request, &mut state, &cancel).await;
    info!(
        operation = "sync_complete",
        status = ?result.status,
        errors = result.errors.len(),
        duration_ms = result.duration.as_millis() as u64,
        "Sync finished"
    );
    report_result(&result, output);
    if let SyncStatus::AuthRequired { service } = &result.status {
        forget_revoked_credentials(&path_manager, service)?;
    }
    Ok(())
}

fn outcome_cell(outcome: StageOutcome) -> Cell {
    match outcome {
        StageOutcome::Success => Cell::new("success").fg(Color::Green),
        StageOutcome::Incomplete => Cell::new("incomplete").fg(Color::Yellow),
        StageOutcome::Skipped => Cell::new("skipped").fg(Color::DarkGrey),
    }
}

pub fn report_result(result: &SyncResult, output: &Output) {
    if !output.is_human() {
        match serde_json::to_value(result) {
            Ok(value) => output.json(&value),
            Err(e) => output.error(format!("Failed to encode sync result: {}", e)),
        }
        return;
    }

    if !result.stages.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec!["Stage", "Outcome"]);
        for (stage, outcome) in &result.stages {
            table.add_row(vec![Cell::new(stage.to_string()), outcome_cell(*outcome)]);
        }
        output.table(&table);
    }
    for error in &result.errors {
        output.warn(error);
    }

    match &result.status {
        SyncStatus::Success => output.success(format!("Sync completed in {:.1?}", result.duration)),
        SyncStatus::Incomplete => output.warn(format!(
            "Sync incomplete after {:.1?} ({} consecutive failures)",
            result.duration, result.consecutive_failures
        )),
        SyncStatus::AuthRequired { service } => {
            output.error(format!("{} rejected the stored credentials, sign in again", service))
        }
        SyncStatus::AlreadyRunning => output.info("Another sync is already running"),
        SyncStatus::Offline => output.warn("No network connection, sync skipped"),
    }
    if result.persistent_warning {
        output.error(format!(
            "Sync has failed {} times in a row",
            result.consecutive_failures
        ));
    }
    if let Some(next) = result.next_sync_in {
        output.info(format!("Next sync in {} min", next.as_secs() / 60));
    }
}
