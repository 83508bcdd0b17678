//! Lock-free activity counters.
//!
//! Only counters are persisted; section state is rebuilt from history on
//! every start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters describing the tracker's work.
#[derive(Debug)]
pub struct ActivityLog {
    /// Posts delivered to the controller while started
    posts_received: AtomicU64,
    /// Posts held back while a bootstrap was running
    posts_buffered: AtomicU64,
    /// Posts rejected by attribution or boundary rules
    posts_rejected: AtomicU64,
    /// Posts counted into a section
    posts_counted: AtomicU64,
    /// Sections closed by a live post
    rollovers: AtomicU64,
    bootstraps_succeeded: AtomicU64,
    bootstraps_failed: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_failed: AtomicU64,
    /// When this log was created
    log_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl ActivityLog {
    /// Create a new activity log.
    pub fn new() -> Self {
        Self {
            posts_received: AtomicU64::new(0),
            posts_buffered: AtomicU64::new(0),
            posts_rejected: AtomicU64::new(0),
            posts_counted: AtomicU64::new(0),
            rollovers: AtomicU64::new(0),
            bootstraps_succeeded: AtomicU64::new(0),
            bootstraps_failed: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            log_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create an activity log that loads from and saves to `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous activity counters");
        }

        log
    }

    pub fn record_post_received(&self) {
        self.posts_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_post_buffered(&self) {
        self.posts_buffered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_post_rejected(&self) {
        self.posts_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_post_counted(&self) {
        self.posts_counted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollover(&self) {
        self.rollovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bootstrap(&self, succeeded: bool) {
        let counter = if succeeded {
            &self.bootstraps_succeeded
        } else {
            &self.bootstraps_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification(&self, sent: bool) {
        let counter = if sent {
            &self.notifications_sent
        } else {
            &self.notifications_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> ActivityStats {
        ActivityStats {
            posts_received: self.posts_received.load(Ordering::Relaxed),
            posts_buffered: self.posts_buffered.load(Ordering::Relaxed),
            posts_rejected: self.posts_rejected.load(Ordering::Relaxed),
            posts_counted: self.posts_counted.load(Ordering::Relaxed),
            rollovers: self.rollovers.load(Ordering::Relaxed),
            bootstraps_succeeded: self.bootstraps_succeeded.load(Ordering::Relaxed),
            bootstraps_failed: self.bootstraps_failed.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            log_start: self.log_start,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Activity:\n\
             - Posts received: {}\n\
             - Posts buffered during bootstrap: {}\n\
             - Posts rejected: {}\n\
             - Posts counted: {}\n\
             - Section rollovers: {}\n\
             - Bootstraps: {} ok, {} failed\n\
             - Notifications: {} sent, {} failed",
            stats.posts_received,
            stats.posts_buffered,
            stats.posts_rejected,
            stats.posts_counted,
            stats.rollovers,
            stats.bootstraps_succeeded,
            stats.bootstraps_failed,
            stats.notifications_sent,
            stats.notifications_failed,
        )
    }

    /// Save counters to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let persisted = PersistedStats {
                stats: self.stats(),
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load counters from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;
                let stats = persisted.stats;

                self.posts_received
                    .store(stats.posts_received, Ordering::Relaxed);
                self.posts_buffered
                    .store(stats.posts_buffered, Ordering::Relaxed);
                self.posts_rejected
                    .store(stats.posts_rejected, Ordering::Relaxed);
                self.posts_counted
                    .store(stats.posts_counted, Ordering::Relaxed);
                self.rollovers.store(stats.rollovers, Ordering::Relaxed);
                self.bootstraps_succeeded
                    .store(stats.bootstraps_succeeded, Ordering::Relaxed);
                self.bootstraps_failed
                    .store(stats.bootstraps_failed, Ordering::Relaxed);
                self.notifications_sent
                    .store(stats.notifications_sent, Ordering::Relaxed);
                self.notifications_failed
                    .store(stats.notifications_failed, Ordering::Relaxed);
                self.log_start = stats.log_start;
            }
        }
        Ok(())
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of activity counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub posts_received: u64,
    pub posts_buffered: u64,
    pub posts_rejected: u64,
    pub posts_counted: u64,
    pub rollovers: u64,
    pub bootstraps_succeeded: u64,
    pub bootstraps_failed: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub log_start: DateTime<Utc>,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(flatten)]
    stats: ActivityStats,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared activity log.
pub type SharedActivityLog = Arc<ActivityLog>;

/// Create a new shared activity log.
pub fn create_shared_log() -> SharedActivityLog {
    Arc::new(ActivityLog::new())
}

/// Create a new shared activity log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedActivityLog {
    Arc::new(ActivityLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_counting() {
        let log = ActivityLog::new();

        log.record_post_received();
        log.record_post_received();
        log.record_post_rejected();
        log.record_bootstrap(true);
        log.record_notification(false);

        let stats = log.stats();
        assert_eq!(stats.posts_received, 2);
        assert_eq!(stats.posts_rejected, 1);
        assert_eq!(stats.bootstraps_succeeded, 1);
        assert_eq!(stats.bootstraps_failed, 0);
        assert_eq!(stats.notifications_failed, 1);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let path = std::env::temp_dir()
            .join(format!("update-limit-activity-{}", uuid::Uuid::new_v4()))
            .join("activity.json");

        let log = ActivityLog::with_persistence(path.clone());
        log.record_post_counted();
        log.record_rollover();
        log.save().unwrap();

        let reloaded = ActivityLog::with_persistence(path.clone());
        let stats = reloaded.stats();
        assert_eq!(stats.posts_counted, 1);
        assert_eq!(stats.rollovers, 1);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_summary_format() {
        let log = ActivityLog::new();
        let summary = log.summary();

        assert!(summary.contains("Posts received"));
        assert!(summary.contains("Section rollovers"));
        assert!(summary.contains("Notifications"));
    }
}
