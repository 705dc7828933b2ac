//! Atomic file output and derived publication artifacts.
//!
//! - [`atomic`]: temp-file + rename writes used for every file scholarsnap emits
//! - [`shields`]: shields.io endpoint badge documents
//! - [`report`]: the metric warning report of the latest run

pub mod atomic;
pub mod report;
pub mod shields;

pub use atomic::{ArtifactMeta, write_atomic, write_json_atomic};
pub use report::{WARNINGS_FILE, WarningReport, write_warnings};
pub use shields::{SUMMARY_BADGE_FILE, ShieldBadge, publication_badge_file, write_shields};
