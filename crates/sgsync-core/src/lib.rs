pub mod actions;
pub mod backoff;
pub mod error;
pub mod file_store;
pub mod flags;
pub mod gate;
pub mod jobs;
pub mod lists;
pub mod memory;
pub mod metadata;
pub mod movies;
pub mod progress;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

pub use actions::LocalActions;
pub use backoff::Backoff;
pub use error::{ServiceKind, StoreError, StoreResult, SyncError};
pub use file_store::FileStore;
pub use flags::{FlagReconciler, FlagReport, FlagService, ReconcileMode, RemoteFlagState, RemoteShowState};
pub use gate::{AlwaysConnected, AtomicSyncGate, Connectivity, GateGuard, Interrupt, SyncGate};
pub use jobs::{JobQueue, JobReport};
pub use lists::{ListReconciler, ListReport};
pub use memory::{MemoryStore, StoreSnapshot};
pub use metadata::{update_show, ShowUpdate};
pub use movies::{MovieReconciler, MovieReport};
pub use progress::{NoopProgress, StageOutcome, SyncProgressListener, SyncStage};
pub use store::{LocalStore, StoreOp};
pub use sync::{FlagAuthority, SyncOrchestrator, SyncRequest, SyncResult, SyncServices, SyncStatus};
