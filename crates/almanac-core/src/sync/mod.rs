//! Offline-first synchronization between the local store and the remote backend

mod engine;
mod merge;
mod queue;
mod scheduler;
mod status;
mod timers;

pub use engine::{FlushReport, SyncEngine, SyncReport};
pub use merge::{merge, merge_with_report, MergeReport};
pub use queue::{PendingAction, PendingOperation, PendingQueue};
pub use scheduler::{MutationListener, SyncOutcome, SyncScheduler};
pub use status::{SyncState, SyncStatus};
pub use timers::{TimerHandle, Timers};
