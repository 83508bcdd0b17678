//! External collaborators of the tracker.
//!
//! The tracker never talks to a network itself. History comes from a
//! [`HistoryProvider`], attribution is answered by an [`IdentityCheck`], and
//! the outgoing warning goes through a [`NotifyAction`]. This module defines
//! those seams and ships a few ready-made implementations.

pub mod history;
pub mod identity;
pub mod notify;

#[cfg(feature = "webhook")]
pub mod webhook;

use crate::post::Post;

// Re-export commonly used types
pub use history::StaticHistory;
pub use identity::AccountIdentity;
pub use notify::{RecordingNotifyAction, StdoutNotifyAction};

#[cfg(feature = "webhook")]
pub use webhook::{WebhookConfig, WebhookNotifyAction};

/// Source of the account's recent posts.
pub trait HistoryProvider: Send + Sync {
    /// Fetch up to `max_count` of the account's most recent posts, skipping
    /// the newest `offset` ones.
    fn fetch_recent(&self, max_count: usize, offset: usize) -> Result<Vec<Post>, HistoryError>;
}

/// Answers whether a handle belongs to the tracked account.
pub trait IdentityCheck: Send + Sync {
    fn is_current_account(&self, handle: &str) -> bool;
}

/// The outgoing notification, e.g. posting a warning status.
pub trait NotifyAction: Send + Sync {
    fn post(&self, message: &str, post_count: usize) -> Result<(), NotifyError>;
}

/// Errors that can occur while fetching history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// Transport failure
    Network(String),
    /// The remote API answered with an error
    Api { status: u16, message: String },
    /// The response could not be decoded
    Parse(String),
    /// Local history file could not be read
    Io(String),
}

impl std::fmt::Display for HistoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryError::Network(msg) => write!(f, "History network error: {msg}"),
            HistoryError::Api { status, message } => {
                write!(f, "History API error ({status}): {message}")
            }
            HistoryError::Parse(msg) => write!(f, "History parse error: {msg}"),
            HistoryError::Io(msg) => write!(f, "History IO error: {msg}"),
        }
    }
}

impl std::error::Error for HistoryError {}

/// Errors that can occur while sending a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The notify action itself failed
    Action(String),
    /// The message could not be rendered
    Format(String),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::Action(msg) => write!(f, "Notify action failed: {msg}"),
            NotifyError::Format(msg) => write!(f, "Notification format error: {msg}"),
        }
    }
}

impl std::error::Error for NotifyError {}
