//! Sync orchestration: per-user and global syncs, the scheduled trigger and
//! the tracking-row operations exposed to the API.

mod orchestrator;
mod schedule;
mod scheduler;
mod types;

pub use orchestrator::SyncOrchestrator;
pub use schedule::{ScheduleInterval, DEFAULT_SCHEDULE_HOURS, DISABLED_SENTINEL, RUN_TOLERANCE, TEST_MODE_SENTINEL};
pub use scheduler::SyncScheduler;
pub use types::*;
