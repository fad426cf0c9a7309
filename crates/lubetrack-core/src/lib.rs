//! lubetrack-core - Offline-first execution ledger for lubrication tasks
//!
//! This crate contains the models, the embedded SQLite store, the evidence
//! registry, quality gate, fraud alert manager and the sync engine shared by
//! every Lubetrack client.

pub mod config;
pub mod db;
pub mod error;
pub mod evidence;
pub mod fraud;
pub mod ledger;
pub mod models;
pub mod quality;
pub mod services;
pub mod sync;
pub mod util;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use models::{TaskExecution, TaskId};
pub use services::ExecutionService;
pub use sync::{SyncEngine, SyncStatus};
