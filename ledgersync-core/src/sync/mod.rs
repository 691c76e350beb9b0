//! Sync Orchestrator and its scheduler.
//!
//! - `orchestrator`: enable/disable lifecycle, push and pull
//! - `scheduler`: debounced local-change pushes plus poll and backup timers
//! - `config`: TOML-loadable tuning knobs
//! - `clock`: injectable time source
//! - `state`: phase, status and per-call outcome types

pub mod clock;
pub mod config;
pub mod orchestrator;
pub mod scheduler;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use orchestrator::SyncOrchestrator;
pub use scheduler::{Debouncer, SchedulerHandle, SyncScheduler, SyncTriggers};
pub use state::{SyncOutcome, SyncPhase, SyncStatus};
