use super::{build_services, load_config, open_store};
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::{presets::UTF8_FULL, Table};
use serde_json::json;
use sgsync_config::PathManager;
use sgsync_core::{JobQueue, LocalStore};
use sgsync_models::PendingJob;
use tracing::info;

fn job_rows(jobs: &[PendingJob]) -> Vec<Vec<String>> {
    jobs.iter()
        .map(|job| {
            vec![
                job.id.to_string(),
                job.action.to_string(),
                job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                format!("{} B", job.payload.len()),
            ]
        })
        .collect()
}

/// List the pending jobs, oldest first. With `drain`, send them to the
/// configured remotes first.
pub async fn run_jobs(drain: bool, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let store = open_store(&path_manager)?;

    if drain {
        let config = load_config(&path_manager, output)?;
        let services = build_services(&config, &path_manager, output)?;
        let queue = JobQueue::new(&*store, services.cloud.as_deref(), services.trakt.as_deref());
        match queue.process().await {
            Ok(report) => {
                info!(
                    operation = "jobs_drained",
                    processed = report.processed,
                    discarded = report.discarded,
                    remaining = report.remaining,
                    "Job queue drained"
                );
                output.success(format!(
                    "Sent {} job(s), discarded {} invalid, {} remaining",
                    report.processed, report.discarded, report.remaining
                ));
            }
            Err(e) => output.error(format!("Job queue stopped: {}", e)),
        }
    }

    let jobs = store
        .pending_jobs()
        .map_err(|e| eyre!("Failed to read pending jobs: {}", e))?;

    if !output.is_human() {
        let items: Vec<_> = jobs
            .iter()
            .map(|job| {
                json!({
                    "id": job.id,
                    "action": job.action.to_string(),
                    "created_at": job.created_at.to_rfc3339(),
                    "payload_bytes": job.payload.len(),
                })
            })
            .collect();
        output.json(&json!({ "pending_jobs": items }));
        return Ok(());
    }

    if jobs.is_empty() {
        output.info("No pending jobs");
        return Ok(());
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["ID", "Action", "Created (UTC)", "Payload"]);
    for row in job_rows(&jobs) {
        table.add_row(row);
    }
    output.table(&table);
    output.info(format!("{} pending job(s)", jobs.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sgsync_models::JobAction;

    #[test]
    fn test_job_rows_show_action_and_size() {
        let job = PendingJob {
            id: 7,
            action: JobAction::ListDelete,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap(),
            payload: br#"{"list_id":"favs"}"#.to_vec(),
        };
        let rows = job_rows(&[job]);
        assert_eq!(
            rows[0],
            vec!["7", "list_delete", "2026-03-01 08:30:00", "18 B"]
        );
    }
}
