pub mod clear;
pub mod daemon;
pub mod jobs;
pub mod status;
pub mod sync;

use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use sgsync_config::{Config, CredentialStore, PathManager, SyncStateStore};
use sgsync_core::{FileStore, LocalStore, SyncOrchestrator, SyncServices};
use sgsync_sources::{TraktClient, TraktService};
use std::sync::Arc;
use tracing::{debug, info};

pub fn load_config(path_manager: &PathManager, output: &Output) -> Result<Config> {
    let config_file = path_manager.config_file();
    let config = if config_file.exists() {
        Config::load_from_file(&config_file)
            .map_err(|e| eyre!("Failed to load config from {}: {}", config_file.display(), e))?
    } else {
        output.warn(format!(
            "No configuration at {}, running with local data only",
            config_file.display()
        ));
        Config::default()
    };
    config
        .validate()
        .map_err(|e| eyre!("Configuration validation failed: {}", e))?;
    Ok(config)
}

pub fn open_store(path_manager: &PathManager) -> Result<Arc<FileStore>> {
    path_manager
        .ensure_directories()
        .map_err(|e| eyre!("Failed to create data directories: {}", e))?;
    let store_file = path_manager.store_file();
    let store = FileStore::open(store_file.clone())
        .map_err(|e| eyre!("Failed to open local store at {}: {}", store_file.display(), e))?;
    Ok(Arc::new(store))
}

pub fn open_state(path_manager: &PathManager) -> Result<SyncStateStore> {
    let state_file = path_manager.state_file();
    SyncStateStore::open(state_file.clone())
        .map_err(|e| eyre!("Failed to load sync state from {}: {}", state_file.display(), e))
}

/// Remote clients for the configured services. Cloud and metadata clients are
/// supplied by the host application; this binary only talks to trakt.
pub fn build_services(config: &Config, path_manager: &PathManager, output: &Output) -> Result<SyncServices> {
    let mut services = SyncServices::default();

    if config.is_trakt_configured() {
        let credentials_file = path_manager.credentials_file();
        let mut cred_store = CredentialStore::new(credentials_file.clone());
        cred_store
            .load()
            .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;

        match (config.trakt.as_ref(), cred_store.get_trakt_access_token()) {
            (Some(trakt), Some(token)) => {
                if !cred_store.has_valid_trakt_token() {
                    output.warn("The trakt access token has expired, trakt requests will be rejected");
                }
                let client = TraktClient::new(trakt.client_id.clone(), token.clone());
                services.trakt = Some(Arc::new(client) as Arc<dyn TraktService>);
                debug!(service = "trakt", "remote client created");
            }
            _ => output.warn("trakt is configured but not signed in, skipping trakt"),
        }
    }
    if config.is_cloud_enabled() {
        output.warn("Cloud sync needs a client from the host application, skipping cloud");
    }
    if config.is_metadata_enabled() {
        output.warn("Metadata updates need a client from the host application, skipping metadata");
    }

    info!(
        operation = "services_configured",
        trakt = services.trakt.is_some(),
        cloud = services.cloud.is_some(),
        metadata = services.metadata.is_some(),
        "Remote services configured"
    );
    Ok(services)
}

/// Rejected trakt tokens are useless; drop them so `status` and the next run
/// report trakt as signed out.
pub fn forget_revoked_credentials(path_manager: &PathManager, service: &str) -> Result<()> {
    if service != "trakt" {
        return Ok(());
    }
    let mut cred_store = CredentialStore::new(path_manager.credentials_file());
    cred_store
        .load()
        .map_err(|e| eyre!("Failed to load credentials: {}", e))?;
    cred_store.clear_trakt();
    cred_store
        .save()
        .map_err(|e| eyre!("Failed to save credentials: {}", e))?;
    info!(operation = "credentials_revoked", service, "Removed rejected trakt tokens");
    Ok(())
}

pub fn build_orchestrator(config: &Config, store: Arc<FileStore>, services: SyncServices) -> SyncOrchestrator {
    let store: Arc<dyn LocalStore> = store;
    SyncOrchestrator::new(store, services, config.sync.clone())
}
