//! # Controller
//!
//! The migration state machine and its supporting pieces (spec.md §4.2,
//! §4.5, §4.6).

pub mod backoff;
pub mod condition_reporter;
pub mod errors;
pub mod migration_driver;
pub mod sync_loop;

pub use condition_reporter::ConditionReporter;
pub use errors::SyncError;
pub use migration_driver::{MigrationDriver, SyncOutcome};
pub use sync_loop::{SyncLoop, SyncLoopConfig};
