//! Core functionality for the update limit notifier.
//!
//! This module contains:
//! - Section constants and the section value
//! - The one-shot section finder run at bootstrap
//! - The live tracker that counts posts and detects rollovers

pub mod finder;
pub mod section;
pub mod tracker;

// Re-export commonly used types
pub use finder::{find_section, SectionEstimate, SectionFinder};
pub use section::{section_gap, Section, FALLBACK_RANK, FETCH_COUNT, SECTION_GAP_HOURS};
pub use tracker::{NotifyTrigger, PostOutcome, RejectReason, SectionTracker};
