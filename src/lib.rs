//! Update Limit Notifier - warns an account before it hits its posting limit.
//!
//! The service allows a fixed number of posts per *section*. A section opens
//! with the first post after at least three hours of silence and the limit
//! lifts three hours after that first post. This library tracks the current
//! section for one account and fires a single warning per section once the
//! post count reaches a configurable threshold.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Update Limit Notifier                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │ Post stream │──▶│ Controller  │──▶│  Section    │        │
//! │  │  (external) │   │ (lifecycle) │   │  Tracker    │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │                       │       ▲            │                │
//! │                       ▼       │            ▼                │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │  History    │──▶│  Section    │   │  Notifier   │        │
//! │  │  Provider   │   │  Finder     │   │  (action)   │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use update_limit_notifier::provider::{AccountIdentity, StaticHistory, StdoutNotifyAction};
//! use update_limit_notifier::{Controller, NotifySettings};
//!
//! let controller = Controller::builder(
//!     Arc::new(StaticHistory::default()),
//!     Arc::new(AccountIdentity::new("alice")),
//!     Arc::new(StdoutNotifyAction),
//! )
//! .settings(NotifySettings::with_threshold(120))
//! .build()
//! .expect("valid settings");
//!
//! controller.start_blocking().expect("history scan failed");
//! println!("{}", controller.snapshot().summary());
//! ```

pub mod activity;
pub mod clock;
pub mod config;
pub mod controller;
pub mod core;
pub mod notifier;
pub mod post;
pub mod provider;
pub mod status;

// Re-export key types at crate root for convenience
pub use activity::{ActivityLog, ActivityStats, SharedActivityLog};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Config, ConfigError, NotifySettings};
pub use controller::{BootstrapError, Controller, ControllerBuilder, Phase, TrackerEvent};
pub use core::{find_section, Section, SectionEstimate, SectionFinder, SectionTracker};
pub use notifier::Notifier;
pub use post::{Post, PostId};
pub use provider::{HistoryError, HistoryProvider, IdentityCheck, NotifyAction, NotifyError};
pub use status::Status;

// Webhook re-exports (when enabled)
#[cfg(feature = "webhook")]
pub use provider::{WebhookConfig, WebhookNotifyAction};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
