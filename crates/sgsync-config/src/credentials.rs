use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trakt_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trakt_refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trakt_token_expires: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cloud_token: Option<String>,
}

/// Tokens for the remote services, kept apart from `config.toml`.
///
/// Signing in happens elsewhere; this only reads and writes what the sign-in
/// flow obtained.
pub struct CredentialStore {
    path: PathBuf,
    tokens: Tokens,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            tokens: Tokens::default(),
        }
    }

    /// A missing file leaves the store empty.
    pub fn load(&mut self) -> Result<()> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            self.tokens = toml::from_str(&content)?;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(&self.tokens)?)?;
        Ok(())
    }

    pub fn get_trakt_access_token(&self) -> Option<&String> {
        self.tokens.trakt_access_token.as_ref()
    }

    pub fn set_trakt_access_token(&mut self, token: String) {
        self.tokens.trakt_access_token = Some(token);
    }

    pub fn get_trakt_refresh_token(&self) -> Option<&String> {
        self.tokens.trakt_refresh_token.as_ref()
    }

    pub fn set_trakt_refresh_token(&mut self, token: String) {
        self.tokens.trakt_refresh_token = Some(token);
    }

    pub fn get_trakt_token_expires(&self) -> Option<DateTime<Utc>> {
        self.tokens.trakt_token_expires
    }

    pub fn set_trakt_token_expires(&mut self, expires: DateTime<Utc>) {
        self.tokens.trakt_token_expires = Some(expires);
    }

    pub fn get_cloud_token(&self) -> Option<&String> {
        self.tokens.cloud_token.as_ref()
    }

    pub fn set_cloud_token(&mut self, token: String) {
        self.tokens.cloud_token = Some(token);
    }

    /// Drop every trakt token, e.g. after the remote revoked them.
    pub fn clear_trakt(&mut self) {
        self.tokens.trakt_access_token = None;
        self.tokens.trakt_refresh_token = None;
        self.tokens.trakt_token_expires = None;
    }

    /// A trakt token that is missing or expires within five minutes is unusable.
    pub fn has_valid_trakt_token(&self) -> bool {
        match (&self.tokens.trakt_access_token, self.tokens.trakt_token_expires) {
            (Some(_), Some(expires)) => expires > Utc::now() + Duration::minutes(5),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}
