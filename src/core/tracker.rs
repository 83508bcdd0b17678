//! Live section tracking.
//!
//! [`SectionTracker`] owns the posts of the current section. Every observed
//! post either extends the section, rolls it over into a new one, or is
//! rejected. Crossing the notify threshold yields a [`NotifyTrigger`] once per
//! section.

use crate::core::finder::SectionEstimate;
use crate::core::section::{section_gap, Section};
use crate::post::{Post, PostId};
use crate::provider::IdentityCheck;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why a post did not count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    DirectMessage,
    OtherAccount,
    BeforeBoundary,
}

/// Everything the notifier needs to announce a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyTrigger {
    pub start_post: Post,
    pub post_count: usize,
    pub accurate: bool,
    pub release_at: DateTime<Utc>,
}

/// What happened to a checked post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Rejected(RejectReason),
    /// The post is part of the current section
    Counted { post_count: usize },
    /// The post opened a new section
    RolledOver { evicted: usize },
    /// The post pushed the section over the threshold
    Triggered(NotifyTrigger),
}

impl PostOutcome {
    pub fn into_trigger(self) -> Option<NotifyTrigger> {
        match self {
            PostOutcome::Triggered(trigger) => Some(trigger),
            _ => None,
        }
    }
}

/// Section state machine fed by live posts.
#[derive(Debug, Clone, Default)]
pub struct SectionTracker {
    section: Section,
    posts: HashMap<PostId, Post>,
    notified: bool,
}

impl SectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace section and posts with a bootstrap result, keeping the latch.
    pub fn apply_estimate(&mut self, estimate: SectionEstimate) {
        self.section = estimate.section;
        self.posts = estimate.posts;
    }

    pub fn section(&self) -> &Section {
        &self.section
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn has_notified(&self) -> bool {
        self.notified
    }

    /// Re-arm the notify latch for the current section.
    pub fn reset_notified(&mut self) {
        self.notified = false;
    }

    /// Apply one post to the section.
    ///
    /// Rollover compares timestamps only, so a late post that is older than
    /// tracked posts can still advance the section.
    pub fn check_post(
        &mut self,
        post: &Post,
        identity: &dyn IdentityCheck,
        threshold: usize,
    ) -> PostOutcome {
        if post.is_direct_message {
            return PostOutcome::Rejected(RejectReason::DirectMessage);
        }
        if !identity.is_current_account(post.attributed_handle()) {
            return PostOutcome::Rejected(RejectReason::OtherAccount);
        }
        let at = post.posted_or_retweeted_at();
        if self.section.boundary_time.is_some_and(|boundary| at < boundary) {
            return PostOutcome::Rejected(RejectReason::BeforeBoundary);
        }

        self.posts.entry(post.id).or_insert_with(|| post.clone());

        let start = match &self.section.start_post {
            Some(start) if start.posted_or_retweeted_at() <= at => start.clone(),
            _ => {
                self.section.start_post = Some(post.clone());
                post.clone()
            }
        };
        let start_at = start.posted_or_retweeted_at();

        if at > start_at + section_gap() {
            let boundary = start_at + section_gap();
            self.section.boundary_time = Some(boundary);
            self.section.start_post = Some(post.clone());

            let before = self.posts.len();
            self.posts
                .retain(|_, p| p.posted_or_retweeted_at() >= boundary);
            self.notified = false;

            return PostOutcome::RolledOver {
                evicted: before - self.posts.len(),
            };
        }

        let post_count = self.posts.len();
        if post_count >= threshold && !self.notified {
            self.notified = true;
            return PostOutcome::Triggered(NotifyTrigger {
                start_post: start,
                post_count,
                accurate: self.section.accurate,
                release_at: start_at + section_gap(),
            });
        }

        PostOutcome::Counted { post_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::finder::SectionFinder;
    use chrono::{Duration, TimeZone};

    struct Handle(&'static str);

    impl IdentityCheck for Handle {
        fn is_current_account(&self, handle: &str) -> bool {
            handle == self.0
        }
    }

    const ME: Handle = Handle("alice");

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap()
    }

    fn mine(id: PostId, at: DateTime<Utc>) -> Post {
        Post::new(id, at, "alice")
    }

    fn tracker_at(boundary: DateTime<Utc>) -> SectionTracker {
        let mut tracker = SectionTracker::new();
        tracker.apply_estimate(SectionEstimate {
            section: Section {
                start_post: None,
                boundary_time: Some(boundary),
                accurate: true,
            },
            posts: HashMap::new(),
        });
        tracker
    }

    #[test]
    fn test_rejects_direct_messages_and_other_accounts() {
        let mut tracker = tracker_at(t0());

        let dm = mine(1, t0()).direct_message();
        assert_eq!(
            tracker.check_post(&dm, &ME, 5),
            PostOutcome::Rejected(RejectReason::DirectMessage)
        );

        let other = Post::new(2, t0(), "bob");
        assert_eq!(
            tracker.check_post(&other, &ME, 5),
            PostOutcome::Rejected(RejectReason::OtherAccount)
        );

        // Retweet of someone else by the tracked account counts.
        let my_retweet = Post::new(3, t0(), "bob").retweeted_by("alice");
        assert_eq!(
            tracker.check_post(&my_retweet, &ME, 5),
            PostOutcome::Counted { post_count: 1 }
        );

        // Retweet of the tracked account by someone else does not.
        let their_retweet = Post::new(4, t0(), "alice").retweeted_by("bob");
        assert_eq!(
            tracker.check_post(&their_retweet, &ME, 5),
            PostOutcome::Rejected(RejectReason::OtherAccount)
        );
        assert_eq!(tracker.post_count(), 1);
    }

    #[test]
    fn test_rejects_posts_before_boundary() {
        let mut tracker = tracker_at(t0());
        let stale = mine(1, t0() - Duration::seconds(1));
        assert_eq!(
            tracker.check_post(&stale, &ME, 5),
            PostOutcome::Rejected(RejectReason::BeforeBoundary)
        );
        assert_eq!(tracker.post_count(), 0);
    }

    #[test]
    fn test_same_post_is_counted_once() {
        let mut tracker = tracker_at(t0());
        let post = mine(1, t0() + Duration::minutes(1));

        tracker.check_post(&post, &ME, 10);
        tracker.check_post(&post, &ME, 10);

        assert_eq!(tracker.post_count(), 1);
    }

    #[test]
    fn test_earlier_post_becomes_start() {
        let mut tracker = tracker_at(t0());
        tracker.check_post(&mine(2, t0() + Duration::minutes(10)), &ME, 10);
        tracker.check_post(&mine(1, t0() + Duration::minutes(5)), &ME, 10);

        assert_eq!(
            tracker.section().start_post.as_ref().map(|p| p.id),
            Some(1)
        );
    }

    #[test]
    fn test_threshold_fires_exactly_once() {
        let mut tracker = tracker_at(t0());
        let mut triggers = Vec::new();

        for i in 0..8 {
            let post = mine(i + 1, t0() + Duration::minutes(i as i64));
            if let Some(trigger) = tracker.check_post(&post, &ME, 5).into_trigger() {
                triggers.push((i + 1, trigger));
            }
        }

        assert_eq!(triggers.len(), 1);
        let (nth, trigger) = &triggers[0];
        assert_eq!(*nth, 5);
        assert_eq!(trigger.post_count, 5);
        assert_eq!(trigger.start_post.id, 1);
        assert_eq!(trigger.release_at, t0() + Duration::hours(3));
        assert!(trigger.accurate);
        assert!(tracker.has_notified());
    }

    #[test]
    fn test_rollover_evicts_and_rearms() {
        let mut tracker = tracker_at(t0());
        for i in 0..5 {
            tracker.check_post(&mine(i + 1, t0() + Duration::minutes(i as i64)), &ME, 5);
        }
        assert!(tracker.has_notified());

        // Section started at t0, so its boundary is t0+3h.
        let late = mine(100, t0() + Duration::hours(3) + Duration::seconds(1));
        let outcome = tracker.check_post(&late, &ME, 5);

        assert_eq!(outcome, PostOutcome::RolledOver { evicted: 5 });
        assert!(!tracker.has_notified());
        assert_eq!(tracker.post_count(), 1);
        assert_eq!(
            tracker.section().boundary_time,
            Some(t0() + Duration::hours(3))
        );
        assert_eq!(
            tracker.section().start_post.as_ref().map(|p| p.id),
            Some(100)
        );
    }

    #[test]
    fn test_lower_threshold_after_reset_fires_again() {
        let mut tracker = tracker_at(t0());
        for i in 0..3 {
            tracker.check_post(&mine(i + 1, t0() + Duration::minutes(i as i64)), &ME, 3);
        }
        assert!(tracker.has_notified());

        tracker.reset_notified();
        let outcome = tracker.check_post(&mine(4, t0() + Duration::minutes(4)), &ME, 2);
        assert_eq!(outcome.into_trigger().map(|t| t.post_count), Some(4));
    }

    #[test]
    fn test_late_post_after_rollover_becomes_start() {
        let mut tracker = tracker_at(t0() - Duration::hours(1));
        tracker.check_post(&mine(1, t0()), &ME, 10);

        let outcome = tracker.check_post(&mine(2, t0() + Duration::hours(4)), &ME, 10);
        assert_eq!(outcome, PostOutcome::RolledOver { evicted: 1 });

        // Delivered late, but still after the new boundary: it opens the section.
        let late = mine(3, t0() + Duration::hours(3) + Duration::minutes(10));
        assert_eq!(
            tracker.check_post(&late, &ME, 10),
            PostOutcome::Counted { post_count: 2 }
        );

        assert_eq!(
            tracker.section().start_post.as_ref().map(|p| p.id),
            Some(3)
        );
        assert_eq!(tracker.post_count(), 2);
        assert_eq!(
            tracker.section().boundary_time,
            Some(t0() + Duration::hours(3))
        );
    }

    #[test]
    fn test_live_post_after_cold_estimate_opens_section() {
        let history = vec![mine(1, t0()), mine(2, t0() + Duration::hours(2))];
        let finder = SectionFinder::new(2).with_fallback_rank(1);
        let estimate = finder.find(&history, t0() + Duration::hours(3) + Duration::minutes(1));
        assert!(estimate.section.start_post.is_none());

        let mut tracker = SectionTracker::new();
        tracker.apply_estimate(estimate);

        let stale = mine(3, t0() + Duration::hours(2) + Duration::minutes(30));
        assert_eq!(
            tracker.check_post(&stale, &ME, 10),
            PostOutcome::Rejected(RejectReason::BeforeBoundary)
        );

        let fresh = mine(4, t0() + Duration::hours(3) + Duration::minutes(5));
        assert_eq!(
            tracker.check_post(&fresh, &ME, 10),
            PostOutcome::Counted { post_count: 1 }
        );
        assert_eq!(
            tracker.section().start_post.as_ref().map(|p| p.id),
            Some(4)
        );
        assert_eq!(
            tracker.section().boundary_time,
            Some(t0() + Duration::hours(3))
        );
        assert!(!tracker.section().accurate);
    }
}
