//! Metric warning report.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use scholarsnap_shared::{MetricWarning, Result};

use crate::atomic::{ArtifactMeta, write_json_atomic};

/// File name of the warning report.
pub const WARNINGS_FILE: &str = "gs_data_warnings.json";

/// Disagreements between provider and computed figures in the latest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningReport {
    pub generated_at: DateTime<Utc>,
    pub warnings: Vec<MetricWarning>,
}

/// Write the report to `dir`. An empty list is still written so a stale
/// report from an earlier run does not linger.
pub fn write_warnings(
    dir: &Path,
    generated_at: DateTime<Utc>,
    warnings: &[MetricWarning],
) -> Result<ArtifactMeta> {
    let report = WarningReport {
        generated_at,
        warnings: warnings.to_vec(),
    };
    let meta = write_json_atomic(&dir.join(WARNINGS_FILE), &report)?;
    debug!(warnings = warnings.len(), "warning report written");
    Ok(meta)
}
