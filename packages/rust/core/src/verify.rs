//! Consistency check for a persisted snapshot.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use scholarsnap_shared::{Result, ScholarSnapError, Snapshot, stable_key};

use crate::aggregator;

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub path: PathBuf,
    pub profile_id: String,
    pub publications: usize,
    pub total_citations: u64,
    pub h_index: u32,
    pub i10_index: u32,
}

/// List every inconsistency in `snapshot`. Empty means consistent.
pub fn check(snapshot: &Snapshot) -> Vec<String> {
    let mut problems = Vec::new();

    for (key, publication) in &snapshot.publications {
        if key != &publication.stable_key {
            problems.push(format!(
                "publication '{}' is stored under key {key} but carries {}",
                publication.title, publication.stable_key
            ));
        }
        let expected = stable_key(&publication.title, publication.year);
        if publication.stable_key != expected {
            problems.push(format!(
                "publication '{}' has key {}, expected {expected}",
                publication.title, publication.stable_key
            ));
        }
    }

    let computed = aggregator::aggregate(snapshot.publications.values());
    let metrics = &snapshot.metrics;
    if metrics.total_citations != computed.total_citations {
        problems.push(format!(
            "total_citations is {}, publications sum to {}",
            metrics.total_citations, computed.total_citations
        ));
    }
    if metrics.h_index != computed.h_index {
        problems.push(format!(
            "h_index is {}, recomputed {}",
            metrics.h_index, computed.h_index
        ));
    }
    if metrics.i10_index != computed.i10_index {
        problems.push(format!(
            "i10_index is {}, recomputed {}",
            metrics.i10_index, computed.i10_index
        ));
    }

    problems
}

/// Load the snapshot at `path` and check it.
///
/// Inconsistencies are logged one by one and reported as a single
/// validation error.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn verify(path: &Path) -> Result<VerifyReport> {
    let content = std::fs::read_to_string(path).map_err(|e| ScholarSnapError::io(path, e))?;
    let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
        ScholarSnapError::validation(format!("{} is not a valid snapshot: {e}", path.display()))
    })?;

    let problems = check(&snapshot);
    if !problems.is_empty() {
        for problem in &problems {
            warn!(%problem, "snapshot inconsistency");
        }
        return Err(ScholarSnapError::validation(format!(
            "{} has {} inconsistencies: {}",
            path.display(),
            problems.len(),
            problems.join("; ")
        )));
    }

    info!(publications = snapshot.publications.len(), "snapshot is consistent");
    Ok(VerifyReport {
        path: path.to_path_buf(),
        profile_id: snapshot.profile_id,
        publications: snapshot.publications.len(),
        total_citations: snapshot.metrics.total_citations,
        h_index: snapshot.metrics.h_index,
        i10_index: snapshot.metrics.i10_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scholarsnap_shared::{ErrorCategory, Publication, PublicationSet};
    use uuid::Uuid;

    fn consistent() -> Snapshot {
        let pubs = [
            Publication::new("One", vec![], "", Some(2020), 15),
            Publication::new("Two", vec![], "", Some(2021), 2),
        ];
        let publications: PublicationSet = pubs
            .iter()
            .map(|p| (p.stable_key.clone(), p.clone()))
            .collect();
        Snapshot {
            generated_at: Utc::now(),
            profile_id: "abc".into(),
            metrics: aggregator::aggregate(&pubs),
            publications,
        }
    }

    #[test]
    fn consistent_snapshot_has_no_problems() {
        assert!(check(&consistent()).is_empty());
    }

    #[test]
    fn detects_stale_metrics() {
        let mut snap = consistent();
        snap.metrics.h_index = 7;
        snap.metrics.total_citations = 1;
        let problems = check(&snap);
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.starts_with("h_index")));
    }

    #[test]
    fn detects_edited_title() {
        let mut snap = consistent();
        let entry = snap.publications.values_mut().next().unwrap();
        entry.title.push_str(" (revised)");
        assert_eq!(check(&snap).len(), 1);
    }

    #[test]
    fn verify_reads_file() {
        let dir = std::env::temp_dir().join(format!("scholarsnap-verify-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gs_data.json");

        std::fs::write(&path, serde_json::to_string(&consistent()).unwrap()).unwrap();
        let report = verify(&path).unwrap();
        assert_eq!(report.publications, 2);
        assert_eq!(report.h_index, 2);

        let mut broken = consistent();
        broken.metrics.i10_index = 0;
        std::fs::write(&path, serde_json::to_string(&broken).unwrap()).unwrap();
        let err = verify(&path).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
