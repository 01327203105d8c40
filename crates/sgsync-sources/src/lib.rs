pub mod error;
pub mod traits;
pub mod trakt;

pub use error::{RemoteError, RemoteResult};
pub use traits::{CloudService, EpisodeFlagRemote, MetadataService, MovieFlagRemote, RemoteService, TraktService};
pub use trakt::TraktClient;
