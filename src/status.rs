//! Point-in-time view of the controller.
//!
//! A [`Status`] owns copies of everything it shows; holding or mutating one
//! never affects the live tracker.

use crate::post::Post;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub started: bool,
    pub bootstrapping: bool,
    pub accurate: bool,
    pub already_notified: bool,
    pub section_start_post: Option<Post>,
    pub post_count_in_section: usize,
    /// End of the previous section
    pub boundary_time: Option<DateTime<Utc>>,
    /// When the current section's limit lifts; `None` when no section is open
    pub release_instant: Option<DateTime<Utc>>,
    /// Whether the release instant is still ahead of the snapshot time
    pub section_open: bool,
    pub release_instant_formatted: Option<String>,
    /// Posts waiting for the bootstrap to finish
    pub buffered_posts: usize,
    pub tracking_id: Option<Uuid>,
}

impl Status {
    /// Status of a stopped controller.
    pub fn stopped() -> Self {
        Self::default()
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        if !self.started {
            return "Tracking: stopped".to_string();
        }
        if self.bootstrapping {
            return format!(
                "Tracking: bootstrapping ({} posts buffered)",
                self.buffered_posts
            );
        }

        let start = self
            .section_start_post
            .as_ref()
            .map(|p| format!("#{} at {}", p.id, p.posted_or_retweeted_at().to_rfc3339()))
            .unwrap_or_else(|| "none".to_string());
        let release = self
            .release_instant_formatted
            .clone()
            .or_else(|| self.release_instant.map(|r| r.to_rfc3339()))
            .map(|r| {
                if self.section_open {
                    r
                } else {
                    format!("{r} (released)")
                }
            })
            .unwrap_or_else(|| "-".to_string());

        format!(
            "Tracking: active\n\
             - Section start: {}\n\
             - Posts in section: {}\n\
             - Limit release: {}\n\
             - Accurate: {}\n\
             - Notified: {}",
            start,
            self.post_count_in_section,
            release,
            if self.accurate { "yes" } else { "no" },
            if self.already_notified { "yes" } else { "no" },
        )
    }
}
