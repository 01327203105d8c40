use async_trait::async_trait;
use reqwest::Client;
use sgsync_models::{
    EpisodeFlagChange, EpisodeFlagValue, FlagKind, LastActivity, MovieFlag, MovieFlagChange, RemoteMovie,
    RemoteShowFlags, ShowId, WatchedState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use crate::error::RemoteResult;
use crate::traits::{EpisodeFlagRemote, MovieFlagRemote, RemoteService, TraktService};
use crate::trakt::api::{self, Endpoint};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the reqwest client used for trakt requests.
pub fn create_trakt_client() -> Client {
    Client::builder()
        .user_agent(concat!("sgsync/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// trakt API client using an already obtained OAuth access token.
#[derive(Clone)]
pub struct TraktClient {
    client: Arc<Client>,
    base_url: String,
    client_id: String,
    access_token: String,
}

impl TraktClient {
    pub fn new(client_id: String, access_token: String) -> Self {
        Self {
            client: Arc::new(create_trakt_client()),
            base_url: api::DEFAULT_BASE_URL.to_string(),
            client_id,
            access_token,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> Endpoint<'_> {
        Endpoint {
            client: &self.client,
            base_url: &self.base_url,
            access_token: &self.access_token,
            client_id: &self.client_id,
        }
    }
}

impl RemoteService for TraktClient {
    fn service_name(&self) -> &str {
        "trakt"
    }
}

#[async_trait]
impl EpisodeFlagRemote for TraktClient {
    fn requires_trakt_id(&self) -> bool {
        true
    }

    async fn download_episode_flags(&self, kind: FlagKind) -> RemoteResult<Vec<RemoteShowFlags>> {
        let kind_path = match kind {
            FlagKind::Watched => "watched",
            FlagKind::Collected => "collection",
        };
        api::get_flagged_shows(&self.endpoint(), kind_path).await
    }

    async fn send_episode_flags(&self, changes: &[EpisodeFlagChange]) -> RemoteResult<()> {
        let endpoint = self.endpoint();
        for (list_path, kind) in [("history", FlagKind::Watched), ("collection", FlagKind::Collected)] {
            for remove in [false, true] {
                let batch: Vec<&EpisodeFlagChange> = changes
                    .iter()
                    .filter(|c| c.value.kind() == kind)
                    // trakt has no skipped state
                    .filter(|c| c.value != EpisodeFlagValue::Watched(WatchedState::Skipped))
                    .filter(|c| c.value.is_set() != remove)
                    .collect();
                if batch.is_empty() {
                    continue;
                }
                debug!(list = list_path, remove, shows = batch.len(), "sending episode flags to trakt");
                api::post_sync(&endpoint, list_path, remove, &api::episodes_body(&batch)).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MovieFlagRemote for TraktClient {
    async fn send_movie_flags(&self, changes: &[MovieFlagChange]) -> RemoteResult<()> {
        let endpoint = self.endpoint();
        for (list_path, flag) in [
            ("collection", MovieFlag::Collection),
            ("watchlist", MovieFlag::Watchlist),
            ("history", MovieFlag::Watched),
        ] {
            for remove in [false, true] {
                let batch: Vec<&MovieFlagChange> = changes
                    .iter()
                    .filter(|c| c.flag == flag && c.value != remove)
                    .collect();
                if batch.is_empty() {
                    continue;
                }
                debug!(list = list_path, remove, movies = batch.len(), "sending movie flags to trakt");
                api::post_sync(&endpoint, list_path, remove, &api::movies_body(&batch)).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TraktService for TraktClient {
    async fn last_activity(&self) -> RemoteResult<LastActivity> {
        api::get_last_activities(&self.endpoint()).await
    }

    async fn movie_collection(&self) -> RemoteResult<Vec<RemoteMovie>> {
        api::get_movies(&self.endpoint(), "collection").await
    }

    async fn movie_watchlist(&self) -> RemoteResult<Vec<RemoteMovie>> {
        api::get_movies(&self.endpoint(), "watchlist").await
    }

    async fn watched_movies(&self) -> RemoteResult<Vec<RemoteMovie>> {
        api::get_movies(&self.endpoint(), "watched").await
    }

    async fn lookup_show_trakt_id(&self, show_id: ShowId) -> RemoteResult<Option<u64>> {
        let trakt_id = api::search_show_by_tvdb_id(&self.endpoint(), show_id).await?;
        if let Some(trakt_id) = trakt_id {
            info!(show_id, trakt_id, "resolved trakt id");
        }
        Ok(trakt_id)
    }
}
