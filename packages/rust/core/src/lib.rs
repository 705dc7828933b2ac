//! Core pipeline orchestration and domain logic for scholarsnap.
//!
//! This crate ties together fetching, parsing, metric aggregation, and
//! snapshot persistence into the end-to-end [`pipeline::run`] workflow.

pub mod aggregator;
pub mod pipeline;
pub mod store;
pub mod verify;

pub use aggregator::{Aggregation, aggregate, aggregate_with_summary, h_index, i10_index};
pub use pipeline::{ProgressReporter, RunConfig, RunResult, SilentProgress, run, run_with_http};
pub use store::{MergePolicy, SnapshotStore, merge};
pub use verify::{VerifyReport, verify};
