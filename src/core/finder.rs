//! Locating the current section from a page of history.
//!
//! The finder walks the page newest-first looking for the first silence of at
//! least three hours. If the page is the account's whole history, the oldest
//! post starts the section. If the page is full and silent gaps are nowhere to
//! be found, a fixed-rank post is used instead and the result is flagged as
//! inaccurate. The found start is then rolled forward section by section until
//! it covers `now`.

use crate::core::section::{section_gap, Section, FALLBACK_RANK, FETCH_COUNT};
use crate::post::{Post, PostId};
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Result of a section search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionEstimate {
    /// Section boundaries as found
    pub section: Section,
    /// Posts of the history page that fall into the section, by id
    pub posts: HashMap<PostId, Post>,
}

impl SectionEstimate {
    pub fn start_post(&self) -> Option<&Post> {
        self.section.start_post.as_ref()
    }

    pub fn boundary_time(&self) -> Option<DateTime<Utc>> {
        self.section.boundary_time
    }

    pub fn accurate(&self) -> bool {
        self.section.accurate
    }
}

/// One-shot section search over a bounded history page.
#[derive(Debug, Clone)]
pub struct SectionFinder {
    /// Size of a full history page
    page_size: usize,
    /// Newest-first rank used when no gap is found in a full page
    fallback_rank: usize,
    /// Silence that separates sections
    gap: Duration,
}

impl Default for SectionFinder {
    fn default() -> Self {
        Self::new(FETCH_COUNT)
    }
}

impl SectionFinder {
    /// Create a finder for history pages of `page_size` posts.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            fallback_rank: FALLBACK_RANK,
            gap: section_gap(),
        }
    }

    /// Override the fallback rank.
    pub fn with_fallback_rank(mut self, rank: usize) -> Self {
        self.fallback_rank = rank;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Find the section that is current at `now`.
    pub fn find(&self, history: &[Post], now: DateTime<Utc>) -> SectionEstimate {
        let mut sorted: Vec<&Post> = history.iter().collect();
        sorted.sort_by(|a, b| newest_first(a, b));

        let mut section = self.find_gap(&sorted, now);
        self.roll_forward(&mut section, &sorted, now);

        let posts = match &section.start_post {
            Some(start) => collect_from(history, start.posted_or_retweeted_at()),
            None => HashMap::new(),
        };

        SectionEstimate { section, posts }
    }

    /// Steps 2 and 3: first silence gap, or one of the fallbacks.
    fn find_gap(&self, sorted: &[&Post], now: DateTime<Utc>) -> Section {
        let Some(newest) = sorted.first() else {
            return Section {
                start_post: None,
                boundary_time: Some(now),
                accurate: true,
            };
        };

        // Even the newest post is older than the gap: no section is open.
        if now > newest.posted_or_retweeted_at() + self.gap {
            return Section {
                start_post: None,
                boundary_time: Some(newest.posted_or_retweeted_at() + self.gap),
                accurate: true,
            };
        }

        for pair in sorted.windows(2) {
            let (newer, older) = (pair[0], pair[1]);
            if newer.posted_or_retweeted_at() > older.posted_or_retweeted_at() + self.gap {
                return Section {
                    start_post: Some(newer.clone()),
                    boundary_time: Some(older.posted_or_retweeted_at() + self.gap),
                    accurate: true,
                };
            }
        }

        if sorted.len() < self.page_size {
            // The page holds the whole history, so its oldest post opened it.
            let oldest = sorted[sorted.len() - 1];
            return Section {
                start_post: Some(oldest.clone()),
                boundary_time: Some(oldest.posted_or_retweeted_at() - Duration::seconds(1)),
                accurate: true,
            };
        }

        let start = sorted
            .get(self.fallback_rank)
            .copied()
            .unwrap_or(sorted[sorted.len() - 1]);
        tracing::debug!(
            rank = self.fallback_rank,
            page = sorted.len(),
            "no silence gap in a full history page, using fallback rank"
        );
        Section {
            start_post: Some(start.clone()),
            boundary_time: Some(start.posted_or_retweeted_at() - Duration::seconds(1)),
            accurate: false,
        }
    }

    /// Step 4: advance stale sections until the start post covers `now`.
    fn roll_forward(&self, section: &mut Section, sorted: &[&Post], now: DateTime<Utc>) {
        while let Some(start) = &section.start_post {
            let release = start.posted_or_retweeted_at() + self.gap;
            if now <= release {
                break;
            }

            section.boundary_time = Some(release);
            // `sorted` is newest-first, so the last match is the earliest one.
            section.start_post = sorted
                .iter()
                .rev()
                .find(|p| p.posted_or_retweeted_at() >= release)
                .map(|p| (*p).clone());
        }
    }
}

/// Find the current section in `history` using the default page size.
pub fn find_section(history: &[Post], now: DateTime<Utc>) -> SectionEstimate {
    SectionFinder::default().find(history, now)
}

/// Descending by time; equal timestamps fall back to ascending id.
fn newest_first(a: &Post, b: &Post) -> Ordering {
    b.posted_or_retweeted_at()
        .cmp(&a.posted_or_retweeted_at())
        .then_with(|| a.id.cmp(&b.id))
}

/// Step 5: posts at or after `start`, first occurrence of each id wins.
fn collect_from(history: &[Post], start: DateTime<Utc>) -> HashMap<PostId, Post> {
    let mut posts = HashMap::new();
    for post in history
        .iter()
        .filter(|p| p.posted_or_retweeted_at() >= start)
    {
        posts.entry(post.id).or_insert_with(|| post.clone());
    }
    posts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap()
    }

    fn post(id: PostId, at: DateTime<Utc>) -> Post {
        Post::new(id, at, "alice")
    }

    /// `count` posts one minute apart, newest at `newest`.
    fn burst(count: usize, newest: DateTime<Utc>) -> Vec<Post> {
        (0..count)
            .map(|i| post(i as PostId + 1, newest - Duration::minutes(i as i64)))
            .collect()
    }

    #[test]
    fn test_gap_between_posts_starts_section() {
        let history = vec![
            post(1, t0()),
            post(2, t0() + Duration::hours(1)),
            post(3, t0() + Duration::hours(5)),
        ];
        let now = t0() + Duration::hours(5) + Duration::minutes(10);

        let estimate = find_section(&history, now);

        assert!(estimate.accurate());
        assert_eq!(estimate.start_post().map(|p| p.id), Some(3));
        assert_eq!(estimate.boundary_time(), Some(t0() + Duration::hours(4)));
        assert_eq!(
            estimate.section.release_at(),
            Some(t0() + Duration::hours(8))
        );
        assert_eq!(estimate.posts.len(), 1);
        assert!(estimate.posts.contains_key(&3));
    }

    #[test]
    fn test_gap_before_now_means_no_open_section() {
        let history = vec![post(1, t0()), post(2, t0() + Duration::minutes(30))];
        let now = t0() + Duration::hours(4);

        let estimate = find_section(&history, now);

        assert!(estimate.accurate());
        assert!(estimate.start_post().is_none());
        assert_eq!(
            estimate.boundary_time(),
            Some(t0() + Duration::minutes(30) + Duration::hours(3))
        );
        assert!(estimate.posts.is_empty());
    }

    #[test]
    fn test_empty_history_is_accurate_and_bounded_by_now() {
        let now = t0();
        let estimate = find_section(&[], now);

        assert!(estimate.accurate());
        assert!(estimate.start_post().is_none());
        assert_eq!(estimate.boundary_time(), Some(now));
    }

    #[test]
    fn test_short_history_starts_at_oldest_post() {
        let newest = t0() + Duration::hours(2);
        let history = burst(50, newest);
        let oldest = history.last().cloned().unwrap();

        let estimate = find_section(&history, newest + Duration::minutes(1));

        assert!(estimate.accurate());
        assert_eq!(estimate.start_post(), Some(&oldest));
        assert_eq!(
            estimate.boundary_time(),
            Some(oldest.timestamp - Duration::seconds(1))
        );
        assert_eq!(estimate.posts.len(), 50);
    }

    #[test]
    fn test_full_page_without_gap_uses_fallback_rank() {
        let newest = t0() + Duration::hours(4);
        let history = burst(FETCH_COUNT, newest);

        let estimate = find_section(&history, newest + Duration::minutes(1));

        assert!(!estimate.accurate());
        // burst() gives the 127th-newest post id 127
        let start = estimate.start_post().unwrap();
        assert_eq!(start.id, 127);
        assert_eq!(
            estimate.boundary_time(),
            Some(start.timestamp - Duration::seconds(1))
        );
        assert_eq!(estimate.posts.len(), 127);
    }

    #[test]
    fn test_stale_section_rolls_forward() {
        // Section starts at t0 after a long silence; a later burst begins at
        // t0+3h30 and must become the current section.
        let history = vec![
            post(1, t0() - Duration::hours(10)),
            post(2, t0()),
            post(3, t0() + Duration::hours(1)),
            post(4, t0() + Duration::hours(3) + Duration::minutes(30)),
            post(5, t0() + Duration::hours(4)),
        ];
        let now = t0() + Duration::hours(4) + Duration::minutes(5);

        let estimate = find_section(&history, now);

        assert!(estimate.accurate());
        assert_eq!(estimate.start_post().map(|p| p.id), Some(4));
        assert_eq!(estimate.boundary_time(), Some(t0() + Duration::hours(3)));
        let mut ids: Vec<_> = estimate.posts.keys().copied().collect();
        ids.sort();
        assert_eq!(ids, vec![4, 5]);
    }

    #[test]
    fn test_roll_forward_can_go_cold() {
        // With a custom page size the whole page counts as full, so the
        // fallback start is used and then rolled past every post.
        let history = vec![post(1, t0()), post(2, t0() + Duration::hours(2))];
        let finder = SectionFinder::new(2).with_fallback_rank(1);
        let now = t0() + Duration::hours(2) + Duration::minutes(59);

        let estimate = finder.find(&history, now);
        assert_eq!(estimate.start_post().map(|p| p.id), Some(1));

        // Post 2 lies before the rolled boundary, so nothing can take over.
        let later = t0() + Duration::hours(3) + Duration::minutes(1);
        let estimate = finder.find(&history, later);
        assert!(!estimate.accurate());
        assert!(estimate.start_post().is_none());
        assert_eq!(estimate.boundary_time(), Some(t0() + Duration::hours(3)));
        assert!(estimate.posts.is_empty());
    }

    #[test]
    fn test_duplicate_ids_keep_first_occurrence() {
        let first = post(9, t0());
        let mut second = first.clone();
        second.author = "someone-else".to_string();
        let history = vec![first.clone(), second];

        let estimate = find_section(&history, t0() + Duration::minutes(5));

        assert_eq!(estimate.posts.len(), 1);
        assert_eq!(estimate.posts.get(&9), Some(&first));
    }

    #[test]
    fn test_equal_timestamps_order_by_id() {
        let at = t0();
        let mut a = post(20, at);
        let mut b = post(10, at);
        assert_eq!(newest_first(&a, &b), Ordering::Greater);
        a.timestamp = at + Duration::seconds(1);
        b.timestamp = at;
        assert_eq!(newest_first(&a, &b), Ordering::Less);
    }
}
