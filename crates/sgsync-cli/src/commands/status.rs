use super::{open_state, open_store};
use crate::output::Output;
use chrono::{DateTime, Utc};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::{presets::UTF8_FULL, Table};
use serde_json::json;
use sgsync_config::PathManager;
use sgsync_core::LocalStore;

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
}

pub async fn run_status(output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    let state = open_state(&path_manager)?;
    let store = open_store(&path_manager)?;
    let pending = store
        .pending_jobs()
        .map_err(|e| eyre!("Failed to read pending jobs: {}", e))?
        .len();
    let shows = store
        .show_ids()
        .map_err(|e| eyre!("Failed to read shows: {}", e))?
        .len();

    if !output.is_human() {
        let cursors: serde_json::Map<String, serde_json::Value> = state
            .cursors()
            .map(|(key, at)| (key.to_string(), json!(at.to_rfc3339())))
            .collect();
        let merged: Vec<&str> = state.merged_keys().collect();
        output.json(&json!({
            "shows": shows,
            "pending_jobs": pending,
            "consecutive_failures": state.consecutive_failures(),
            "last_attempt": state.last_attempt().map(|t| t.to_rfc3339()),
            "last_success": state.last_success().map(|t| t.to_rfc3339()),
            "merged": merged,
            "cursors": cursors,
        }));
        return Ok(());
    }

    let mut summary = Table::new();
    summary.load_preset(UTF8_FULL).set_header(vec!["", "Value"]);
    summary.add_row(vec!["Shows".to_string(), shows.to_string()]);
    summary.add_row(vec!["Pending jobs".to_string(), pending.to_string()]);
    summary.add_row(vec![
        "Consecutive failures".to_string(),
        state.consecutive_failures().to_string(),
    ]);
    summary.add_row(vec!["Last attempt".to_string(), format_time(state.last_attempt())]);
    summary.add_row(vec!["Last success".to_string(), format_time(state.last_success())]);
    output.table(&summary);

    let mut cursors = Table::new();
    cursors.load_preset(UTF8_FULL).set_header(vec!["Cursor", "Synced up to"]);
    for (key, at) in state.cursors() {
        cursors.add_row(vec![key.to_string(), at.to_rfc3339()]);
    }
    output.table(&cursors);

    let merged: Vec<&str> = state.merged_keys().collect();
    if merged.is_empty() {
        output.info("No initial merge completed yet");
    } else {
        output.info(format!("Merged: {}", merged.join(", ")));
    }
    Ok(())
}
