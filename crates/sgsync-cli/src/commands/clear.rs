use super::open_state;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use sgsync_config::PathManager;
use std::fs;

pub async fn run_clear(all: bool, cursors: bool, state: bool, credentials: bool, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();

    if all {
        clear_state(&path_manager, output)?;
        clear_credentials(&path_manager, output)?;
        output.success("Sync state and credentials cleared");
        return Ok(());
    }

    let mut cleared_anything = false;

    if state {
        clear_state(&path_manager, output)?;
        cleared_anything = true;
    } else if cursors {
        clear_cursors(&path_manager, output)?;
        cleared_anything = true;
    }

    if credentials {
        clear_credentials(&path_manager, output)?;
        cleared_anything = true;
    }

    if !cleared_anything {
        output.warn("No clear option specified. Use --cursors, --state, --credentials, or --all");
        output.info("\nExample: sgsync clear --cursors");
    }

    Ok(())
}

/// The next run downloads everything again, but keeps mirroring.
fn clear_cursors(path_manager: &PathManager, output: &Output) -> Result<()> {
    let mut state = open_state(path_manager)?;
    let count = state.cursors().count();
    if count == 0 {
        output.info("No sync cursors found to clear");
        return Ok(());
    }
    state.clear_cursors();
    state
        .save()
        .map_err(|e| eyre!("Failed to save sync state: {}", e))?;
    output.success(format!("Cleared {} sync cursor(s)", count));
    Ok(())
}

/// Cursors, merge flags and failure count. The next run merges again.
fn clear_state(path_manager: &PathManager, output: &Output) -> Result<()> {
    let mut state = open_state(path_manager)?;
    state.clear_all();
    state
        .save()
        .map_err(|e| eyre!("Failed to save sync state: {}", e))?;
    output.success(format!("Cleared sync state: {}", path_manager.state_file().display()));
    Ok(())
}

fn clear_credentials(path_manager: &PathManager, output: &Output) -> Result<()> {
    let credentials_file = path_manager.credentials_file();
    if credentials_file.exists() {
        fs::remove_file(&credentials_file).map_err(|e| {
            eyre!(
                "Failed to remove credentials file at {}: {}",
                credentials_file.display(),
                e
            )
        })?;
        output.success(format!("Cleared credentials: {}", credentials_file.display()));
    } else {
        output.info("No credentials file found to clear");
    }
    Ok(())
}
