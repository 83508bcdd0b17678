//! Activity accounting for the update limit notifier.
//!
//! Counts what the tracker did with the posts it saw, so users can check why
//! a warning was or was not sent.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, ActivityLog, ActivityStats,
    SharedActivityLog,
};
