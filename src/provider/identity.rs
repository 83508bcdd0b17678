//! Handle-based identity check.

use crate::provider::IdentityCheck;
use std::sync::{PoisonError, RwLock};

/// The tracked account's handle. Handles compare case-insensitively and an
/// optional leading `@` is ignored.
#[derive(Debug)]
pub struct AccountIdentity {
    handle: RwLock<String>,
}

impl AccountIdentity {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: RwLock::new(normalize(&handle.into())),
        }
    }

    /// Switch to another account. Callers are expected to restart the
    /// controller afterwards.
    pub fn switch_to(&self, handle: impl Into<String>) {
        let mut guard = self.handle.write().unwrap_or_else(PoisonError::into_inner);
        *guard = normalize(&handle.into());
    }

    pub fn handle(&self) -> String {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl IdentityCheck for AccountIdentity {
    fn is_current_account(&self, handle: &str) -> bool {
        let current = self.handle.read().unwrap_or_else(PoisonError::into_inner);
        !current.is_empty() && *current == normalize(handle)
    }
}

fn normalize(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_match() {
        let identity = AccountIdentity::new("@Alice");
        assert!(identity.is_current_account("alice"));
        assert!(identity.is_current_account("ALICE"));
        assert!(!identity.is_current_account("bob"));
    }

    #[test]
    fn test_switch_account() {
        let identity = AccountIdentity::new("alice");
        identity.switch_to("bob");
        assert_eq!(identity.handle(), "bob");
        assert!(!identity.is_current_account("alice"));
        assert!(identity.is_current_account("bob"));
    }

    #[test]
    fn test_empty_handle_matches_nothing() {
        let identity = AccountIdentity::new("");
        assert!(!identity.is_current_account(""));
    }
}
