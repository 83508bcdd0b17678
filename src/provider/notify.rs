//! Local notify actions.

use crate::provider::{NotifyAction, NotifyError};
use std::sync::{Mutex, PoisonError};

/// Prints notifications to stdout.
#[derive(Debug, Default)]
pub struct StdoutNotifyAction;

impl NotifyAction for StdoutNotifyAction {
    fn post(&self, message: &str, post_count: usize) -> Result<(), NotifyError> {
        println!("[notify] ({post_count} posts) {message}");
        Ok(())
    }
}

/// Keeps every notification in memory instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingNotifyAction {
    sent: Mutex<Vec<(String, usize)>>,
}

impl RecordingNotifyAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages recorded so far, oldest first.
    pub fn messages(&self) -> Vec<(String, usize)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotifyAction for RecordingNotifyAction {
    fn post(&self, message: &str, post_count: usize) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((message.to_string(), post_count));
        Ok(())
    }
}
