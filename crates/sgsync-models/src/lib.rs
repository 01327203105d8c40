pub mod cursor;
pub mod flag;
pub mod job;
pub mod list;
pub mod movie;
pub mod remote;
pub mod show;

pub use cursor::CursorKind;
pub use flag::{EpisodeFlagValue, FlagKind};
pub use job::{EpisodeFlagPayload, JobAction, JobId, ListDeletePayload, ListItemsPayload, MovieFlagPayload, NewJob, PendingJob};
pub use list::{list_item_id, ListEntity, ListItem, ListItemRef, ListItemType};
pub use movie::{Movie, MovieFlag, MovieId};
pub use remote::{EpisodeDetails, EpisodeFlagChange, LastActivity, ListUpload, MovieFlagChange, RemoteList, RemoteListItem, RemoteMovie, RemoteSeasonFlags, RemoteShowFlags, SeasonDetails, ShowDetails};
pub use show::{Episode, EpisodeFlags, EpisodeId, EpisodeNumber, Season, SeasonId, Show, ShowId, ShowStatus, WatchedState, SPECIALS_SEASON};
