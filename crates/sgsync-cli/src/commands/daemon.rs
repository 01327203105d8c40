use super::sync::{report_result, StageReporter};
use super::{build_orchestrator, build_services, forget_revoked_credentials, load_config, open_state, open_store};
use crate::output::Output;
use color_eyre::Result;
use sgsync_config::PathManager;
use sgsync_core::{SyncRequest, SyncStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Delay before the next run: the orchestrator's schedule, or the regular
/// interval when the run did not set one.
fn next_delay(next_sync_in: Option<Duration>, interval: Duration) -> Duration {
    next_sync_in.unwrap_or(interval)
}

/// Run delta syncs until interrupted. The first run is a full sync unless
/// `no_startup_sync` skips it.
pub async fn run_daemon(no_startup_sync: bool, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let config = load_config(&path_manager, output)?;
    let store = open_store(&path_manager)?;
    let mut state = open_state(&path_manager)?;
    let services = build_services(&config, &path_manager, output)?;
    let interval = Duration::from_secs(config.sync.sync_interval_minutes * 60);

    let orchestrator = build_orchestrator(&config, store, services)
        .with_progress(Arc::new(StageReporter::new(output)));

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(operation = "daemon_shutdown", "Shutdown requested");
            watcher.cancel();
        }
    });

    info!(
        operation = "daemon_started",
        interval_minutes = config.sync.sync_interval_minutes,
        authority = orchestrator.authority().name(),
        "Daemon started"
    );

    let mut request = SyncRequest::Full;
    let mut delay = if no_startup_sync { interval } else { Duration::ZERO };

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => break,
        }

        info!(operation = "scheduled_sync_start", request = ?request, "Starting scheduled sync");
        let result = orchestrator.run(request, &mut state, &cancel).await;
        match &result.status {
            SyncStatus::Success => info!(
                operation = "scheduled_sync_complete",
                duration_ms = result.duration.as_millis() as u64,
                "Scheduled sync completed"
            ),
            SyncStatus::AuthRequired { service } => {
                error!(
                    operation = "scheduled_sync_auth",
                    service = %service,
                    "Credentials rejected, sign in again"
                );
                if let Err(e) = forget_revoked_credentials(&path_manager, service) {
                    warn!(operation = "scheduled_sync_auth", error = %e, "Could not remove rejected credentials");
                }
            }
            status => warn!(
                operation = "scheduled_sync_incomplete",
                status = ?status,
                errors = result.errors.len(),
                consecutive_failures = result.consecutive_failures,
                "Scheduled sync did not complete"
            ),
        }
        report_result(&result, output);

        if cancel.is_cancelled() {
            break;
        }
        request = SyncRequest::Delta;
        delay = next_delay(result.next_sync_in, interval);
        info!(operation = "scheduled_sync_next", delay_secs = delay.as_secs(), "Next sync scheduled");
    }

    output.success("Daemon stopped");
    Ok(())
}
