//! shields.io endpoint badges.
//!
//! One summary badge carries the profile's total citations as the provider
//! shows it, falling back to the snapshot total; each publication gets its
//! own badge keyed by stable key. Badges of publications that are no
//! longer in the snapshot are pruned.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use scholarsnap_shared::{Result, ScholarSnapError, Snapshot};

use crate::atomic::{ArtifactMeta, write_json_atomic};

/// File name of the profile-level badge.
pub const SUMMARY_BADGE_FILE: &str = "gs_data_shieldsio.json";

const BADGE_SUFFIX: &str = "_shieldsio.json";
const BADGE_LABEL: &str = "citations";

/// A shields.io endpoint document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldBadge {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u8,
    pub label: String,
    pub message: String,
}

impl ShieldBadge {
    /// A citation-count badge.
    pub fn citations(count: u64) -> Self {
        Self {
            schema_version: 1,
            label: BADGE_LABEL.to_string(),
            message: count.to_string(),
        }
    }
}

/// File name of the badge for the publication with `stable_key`.
pub fn publication_badge_file(stable_key: &str) -> String {
    format!("{stable_key}{BADGE_SUFFIX}")
}

/// Write the summary badge plus one badge per publication into `dir`.
///
/// `provider_total` is the total the profile page displays, when it shows one.
/// Returns metadata for every file written, summary badge first.
#[instrument(skip_all, fields(dir = %dir.display(), publications = snapshot.publications.len()))]
pub fn write_shields(
    dir: &Path,
    snapshot: &Snapshot,
    provider_total: Option<u64>,
) -> Result<Vec<ArtifactMeta>> {
    let mut written = Vec::with_capacity(snapshot.publications.len() + 1);

    let total = provider_total.unwrap_or(snapshot.metrics.total_citations);
    written.push(write_json_atomic(
        &dir.join(SUMMARY_BADGE_FILE),
        &ShieldBadge::citations(total),
    )?);

    for (key, publication) in &snapshot.publications {
        written.push(write_json_atomic(
            &dir.join(publication_badge_file(key)),
            &ShieldBadge::citations(publication.citation_count),
        )?);
    }

    let pruned = prune_stale(dir, snapshot)?;

    info!(
        badges = written.len(),
        pruned = pruned.len(),
        "shields.io badges written"
    );
    Ok(written)
}

/// Remove per-publication badges whose key is not part of `snapshot`.
fn prune_stale(dir: &Path, snapshot: &Snapshot) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| ScholarSnapError::io(dir, e))?;
    let mut removed = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| ScholarSnapError::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(key) = badge_key(name) else { continue };

        if !snapshot.publications.contains_key(key) {
            let path = entry.path();
            fs::remove_file(&path).map_err(|e| ScholarSnapError::io(&path, e))?;
            debug!(path = %path.display(), "removed stale badge");
            removed.push(path);
        }
    }

    Ok(removed)
}

/// The stable key encoded in a per-publication badge file name.
fn badge_key(file_name: &str) -> Option<&str> {
    let key = file_name.strip_suffix(BADGE_SUFFIX)?;
    (key.len() == 16 && key.bytes().all(|b| b.is_ascii_hexdigit())).then_some(key)
}
