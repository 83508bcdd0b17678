//! Section constants and the section value.
//!
//! A section is a run of posting activity that starts after at least
//! [`SECTION_GAP_HOURS`] of silence. The limit is released
//! [`SECTION_GAP_HOURS`] after the first post of the section.

use crate::post::Post;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of the silence that separates two sections, in hours.
pub const SECTION_GAP_HOURS: i64 = 3;

/// Number of posts requested from the history provider during bootstrap.
pub const FETCH_COUNT: usize = 200;

/// Rank (0-indexed, newest first) of the post treated as the section start
/// when a full history page contains no silence gap.
pub const FALLBACK_RANK: usize = 126;

/// The silence gap as a duration.
pub fn section_gap() -> Duration {
    Duration::hours(SECTION_GAP_HOURS)
}

/// Boundaries of the current section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Earliest post of the section, if one is open
    pub start_post: Option<Post>,
    /// End of the previous section; posts before it are stale
    pub boundary_time: Option<DateTime<Utc>>,
    /// Whether the start was derived from an observed silence gap
    pub accurate: bool,
}

impl Section {
    /// When the limit of this section is released: the start post plus the gap.
    pub fn release_at(&self) -> Option<DateTime<Utc>> {
        self.start_post
            .as_ref()
            .map(|p| p.posted_or_retweeted_at() + section_gap())
    }

    /// Whether the section is still running at `now`.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.release_at().is_some_and(|release| now <= release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_release_is_start_plus_gap() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let section = Section {
            start_post: Some(Post::new(1, start, "alice")),
            boundary_time: Some(start - Duration::hours(1)),
            accurate: true,
        };

        assert_eq!(section.release_at(), Some(start + Duration::hours(3)));
        assert!(section.is_open_at(start + Duration::hours(3)));
        assert!(!section.is_open_at(start + Duration::hours(3) + Duration::seconds(1)));
    }

    #[test]
    fn test_empty_section_is_never_open() {
        let section = Section::default();
        assert_eq!(section.release_at(), None);
        assert!(!section.is_open_at(Utc::now()));
    }
}
