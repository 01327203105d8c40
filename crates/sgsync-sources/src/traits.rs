use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sgsync_models::{
    EpisodeFlagChange, FlagKind, LastActivity, ListItemRef, ListUpload, MovieFlagChange, RemoteList, RemoteMovie,
    RemoteShowFlags, ShowDetails, ShowId,
};
use crate::error::RemoteResult;

/// Common metadata of every remote service.
pub trait RemoteService: Send + Sync {
    fn service_name(&self) -> &str;
}

/// A remote that stores per-episode watched and collected flags.
#[async_trait]
pub trait EpisodeFlagRemote: RemoteService {
    /// Shows can only be addressed on this remote once their trakt id is known.
    fn requires_trakt_id(&self) -> bool {
        false
    }

    /// Every show the remote has at least one flagged episode for.
    async fn download_episode_flags(&self, kind: FlagKind) -> RemoteResult<Vec<RemoteShowFlags>>;

    /// Set or clear flags. Re-sending an applied change must be a no-op.
    async fn send_episode_flags(&self, changes: &[EpisodeFlagChange]) -> RemoteResult<()>;
}

#[async_trait]
pub trait MovieFlagRemote: RemoteService {
    /// Set or clear movie flags. Re-sending an applied change must be a no-op.
    async fn send_movie_flags(&self, changes: &[MovieFlagChange]) -> RemoteResult<()>;
}

/// The cloud backend: episode and movie flags plus lists.
#[async_trait]
pub trait CloudService: EpisodeFlagRemote + MovieFlagRemote {
    async fn download_lists(&self, updated_since: Option<DateTime<Utc>>) -> RemoteResult<Vec<RemoteList>>;
    async fn upload_lists(&self, lists: &[ListUpload]) -> RemoteResult<()>;
    async fn add_list_items(&self, list_id: &str, items: &[ListItemRef]) -> RemoteResult<()>;
    async fn remove_list_items(&self, list_id: &str, items: &[ListItemRef]) -> RemoteResult<()>;
    async fn delete_list(&self, list_id: &str) -> RemoteResult<()>;
}

/// trakt: episode and movie flags, activity timestamps, id lookups.
#[async_trait]
pub trait TraktService: EpisodeFlagRemote + MovieFlagRemote {
    async fn last_activity(&self) -> RemoteResult<LastActivity>;
    async fn movie_collection(&self) -> RemoteResult<Vec<RemoteMovie>>;
    async fn movie_watchlist(&self) -> RemoteResult<Vec<RemoteMovie>>;
    async fn watched_movies(&self) -> RemoteResult<Vec<RemoteMovie>>;
    async fn lookup_show_trakt_id(&self, show_id: ShowId) -> RemoteResult<Option<u64>>;
}

/// The show metadata provider.
#[async_trait]
pub trait MetadataService: RemoteService {
    async fn fetch_show(&self, show_id: ShowId) -> RemoteResult<ShowDetails>;
}
