//! Shared types, error model, and configuration for scholarsnap.
//!
//! This crate is the foundation depended on by all other scholarsnap crates.
//! It provides:
//! - [`ScholarSnapError`]: the unified error type
//! - Domain types ([`Publication`], [`ProfileMetrics`], [`Snapshot`], [`SummaryFigures`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], [`SnapshotConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FetchConfig, FetchSection, ProfileConfig, ProfileId, RetrySection,
    SnapshotConfig, SnapshotSection, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_profile_id,
};
pub use error::{ErrorCategory, FetchErrorKind, ParseErrorKind, Result, ScholarSnapError};
pub use types::{
    MetricWarning, ProfileMetrics, Publication, PublicationSet, Snapshot, SummaryFigures,
    normalize_title, stable_key,
};
