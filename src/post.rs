//! The post record observed by the tracker.
//!
//! A post is an immutable view of one posting event. Retweets are keyed by the
//! time of the retweet, not by the time of the original post.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable, unique identifier of a post.
pub type PostId = u64;

/// One posting event of the tracked account (or of anyone else, before
/// attribution filtering).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Unique status id
    pub id: PostId,
    /// Posting time, or retweet time for retweets
    #[serde(alias = "posted_or_retweeted_at")]
    pub timestamp: DateTime<Utc>,
    /// Direct messages never count toward the limit
    #[serde(default)]
    pub is_direct_message: bool,
    /// Handle of the original author
    pub author: String,
    /// Handle of the retweeting account, if this is a retweet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retweeted_by: Option<String>,
}

impl Post {
    /// Create an original (non-retweet) post.
    pub fn new(id: PostId, timestamp: DateTime<Utc>, author: impl Into<String>) -> Self {
        Self {
            id,
            timestamp,
            is_direct_message: false,
            author: author.into(),
            retweeted_by: None,
        }
    }

    /// Turn this post into a retweet made by `handle`.
    pub fn retweeted_by(mut self, handle: impl Into<String>) -> Self {
        self.retweeted_by = Some(handle.into());
        self
    }

    /// Mark this post as a direct message.
    pub fn direct_message(mut self) -> Self {
        self.is_direct_message = true;
        self
    }

    /// The grouping key used for every section computation.
    pub fn posted_or_retweeted_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// The handle this post is attributed to: the retweeter for retweets,
    /// the author otherwise. An empty retweeter counts as no retweet.
    pub fn attributed_handle(&self) -> &str {
        match self.retweeted_by.as_deref() {
            Some(handle) if !handle.is_empty() => handle,
            _ => &self.author,
        }
    }
}
