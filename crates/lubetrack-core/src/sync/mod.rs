//! Synchronization engine.
//!
//! Drains the ledger's queue to the remote authority in FIFO order, one
//! task at a time, with backoff for transient failures and manual review for
//! rejections. Connectivity and progress are published through
//! [`SyncStatusHub`].

mod backoff;
mod engine;
mod remote;
mod status;
mod worker;

pub use backoff::BackoffPolicy;
pub use engine::{SyncEngine, SyncResult};
pub use remote::{HttpRemoteAuthority, PushOutcome, RemoteAuthority};
pub use status::{Subscription, SyncStatus, SyncStatusHub};
pub use worker::SyncWorker;
