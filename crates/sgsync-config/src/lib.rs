pub mod config;
pub mod credentials;
pub mod paths;
pub mod state;

pub use config::{CloudConfig, Config, FlagSource, LoggingConfig, MetadataConfig, SyncSettings, TraktConfig};
pub use credentials::CredentialStore;
pub use paths::{base_path_override, PathManager};
pub use state::{merge_keys, SyncStateStore};
