//! In-memory and file-backed history.

use crate::post::Post;
use crate::provider::{HistoryError, HistoryProvider};
use std::path::Path;

/// A fixed set of posts served newest-first.
#[derive(Debug, Clone, Default)]
pub struct StaticHistory {
    posts: Vec<Post>,
}

impl StaticHistory {
    /// Create a history from posts in any order.
    pub fn new(mut posts: Vec<Post>) -> Self {
        posts.sort_by(|a, b| {
            b.posted_or_retweeted_at()
                .cmp(&a.posted_or_retweeted_at())
                .then_with(|| a.id.cmp(&b.id))
        });
        Self { posts }
    }

    /// Load a JSON array of posts, or JSON lines with one post per line.
    pub fn from_file(path: &Path) -> Result<Self, HistoryError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HistoryError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Parse a JSON array of posts, or JSON lines.
    pub fn from_json(content: &str) -> Result<Self, HistoryError> {
        let trimmed = content.trim_start();
        let posts = if trimmed.starts_with('[') {
            serde_json::from_str::<Vec<Post>>(trimmed)
                .map_err(|e| HistoryError::Parse(e.to_string()))?
        } else {
            trimmed
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| {
                    serde_json::from_str::<Post>(line)
                        .map_err(|e| HistoryError::Parse(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Self::new(posts))
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

impl HistoryProvider for StaticHistory {
    fn fetch_recent(&self, max_count: usize, offset: usize) -> Result<Vec<Post>, HistoryError> {
        Ok(self
            .posts
            .iter()
            .skip(offset)
            .take(max_count)
            .cloned()
            .collect())
    }
}
