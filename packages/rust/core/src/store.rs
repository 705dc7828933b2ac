//! Snapshot persistence and the merge policy between runs.
//!
//! A run never edits the previous snapshot. It builds a fresh one from the
//! previous state and the new observations, validates it, and replaces the
//! file with a single atomic rename. Any validation failure leaves the
//! published file untouched.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use scholarsnap_artifacts::write_json_atomic;
use scholarsnap_shared::{
    ProfileId, ProfileMetrics, Publication, PublicationSet, Result, ScholarSnapError, Snapshot,
    SnapshotConfig,
};

use crate::aggregator;

/// Rules applied when combining the previous snapshot with a new fetch.
#[derive(Debug, Clone)]
pub struct MergePolicy {
    /// Minimum accepted fraction of the previous total citation count.
    pub regression_floor: f64,
    /// Stable keys excluded from the merged snapshot.
    pub removed_keys: BTreeSet<String>,
}

impl From<&SnapshotConfig> for MergePolicy {
    fn from(config: &SnapshotConfig) -> Self {
        Self {
            regression_floor: config.regression_floor,
            removed_keys: config.removed_keys.iter().cloned().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Owner of the on-disk snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    policy: MergePolicy,
}

impl SnapshotStore {
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            path: config.snapshot_path(),
            policy: MergePolicy::from(config),
        }
    }

    /// Canonical snapshot path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the previously published snapshot, if there is one.
    ///
    /// A file that exists but cannot be parsed is a validation failure: the
    /// run must not silently start over from an empty history.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no previous snapshot");
            return Ok(None);
        }
        let content =
            fs::read_to_string(&self.path).map_err(|e| ScholarSnapError::io(&self.path, e))?;
        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            ScholarSnapError::validation(format!(
                "previous snapshot {} is unreadable: {e}",
                self.path.display()
            ))
        })?;
        debug!(
            path = %self.path.display(),
            publications = snapshot.publications.len(),
            total_citations = snapshot.metrics.total_citations,
            "loaded previous snapshot"
        );
        Ok(Some(snapshot))
    }

    /// Merge the new observations into `previous`, validate, and write the
    /// result atomically.
    #[instrument(skip_all, fields(path = %self.path.display(), profile_id = %profile_id))]
    pub fn merge_and_persist(
        &self,
        previous: Option<&Snapshot>,
        profile_id: &ProfileId,
        new_metrics: &ProfileMetrics,
        new_publications: &[Publication],
    ) -> Result<Snapshot> {
        let snapshot = merge(
            previous,
            profile_id.as_str(),
            new_metrics,
            new_publications,
            &self.policy,
            Utc::now(),
        )?;
        self.persist(&snapshot)?;
        Ok(snapshot)
    }

    /// Atomically replace the snapshot file.
    pub fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let meta = write_json_atomic(&self.path, snapshot)?;
        info!(
            path = %self.path.display(),
            publications = snapshot.publications.len(),
            total_citations = snapshot.metrics.total_citations,
            h_index = snapshot.metrics.h_index,
            sha256 = %meta.sha256,
            "snapshot persisted"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Build the next snapshot. Pure: the caller decides whether to persist it.
pub fn merge(
    previous: Option<&Snapshot>,
    profile_id: &str,
    new_metrics: &ProfileMetrics,
    new_publications: &[Publication],
    policy: &MergePolicy,
    generated_at: DateTime<Utc>,
) -> Result<Snapshot> {
    if let Some(prev) = previous {
        if prev.profile_id != profile_id {
            return Err(ScholarSnapError::validation(format!(
                "previous snapshot belongs to profile '{}', refusing to merge '{profile_id}' into it",
                prev.profile_id
            )));
        }
        check_regression(prev.metrics.total_citations, new_metrics.total_citations, policy)?;
    }

    let mut publications: PublicationSet = previous
        .map(|p| p.publications.clone())
        .unwrap_or_default();
    let retained = publications.len();

    for (key, publication) in dedup(new_publications) {
        publications.insert(key, publication);
    }

    let removed: Vec<String> = policy
        .removed_keys
        .iter()
        .filter(|k| publications.remove(*k).is_some())
        .cloned()
        .collect();
    if !removed.is_empty() {
        info!(count = removed.len(), keys = ?removed, "dropped publications listed in removed_keys");
    }

    let mut metrics = aggregator::aggregate(publications.values());
    if let Some(prev) = previous {
        metrics.citations_by_year = prev.metrics.citations_by_year.clone();
    }
    metrics
        .citations_by_year
        .extend(new_metrics.citations_by_year.iter().map(|(y, c)| (*y, *c)));

    debug!(
        retained,
        fetched = new_publications.len(),
        merged = publications.len(),
        "merged publications"
    );

    Ok(Snapshot {
        generated_at,
        profile_id: profile_id.to_string(),
        metrics,
        publications,
    })
}

/// Collapse repeated stable keys within one fetch, keeping the higher count.
fn dedup(publications: &[Publication]) -> PublicationSet {
    let mut set = PublicationSet::new();
    for publication in publications {
        match set.get(&publication.stable_key) {
            Some(existing) if existing.citation_count >= publication.citation_count => {
                debug!(key = %publication.stable_key, "duplicate publication in fetch, keeping higher count");
            }
            _ => {
                set.insert(publication.stable_key.clone(), publication.clone());
            }
        }
    }
    set
}

fn check_regression(previous_total: u64, new_total: u64, policy: &MergePolicy) -> Result<()> {
    let floor = previous_total as f64 * policy.regression_floor;
    if (new_total as f64) < floor {
        warn!(
            previous_total,
            new_total,
            regression_floor = policy.regression_floor,
            "total citations regressed below the floor"
        );
        return Err(ScholarSnapError::validation(format!(
            "total citations dropped from {previous_total} to {new_total} \
             (below {:.0}% of the published value)",
            policy.regression_floor * 100.0
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;

    use scholarsnap_shared::{AppConfig, ErrorCategory};
    use uuid::Uuid;

    fn temp_config() -> SnapshotConfig {
        let mut config = SnapshotConfig::try_from(&AppConfig::default()).unwrap();
        config.output_dir =
            std::env::temp_dir().join(format!("scholarsnap-store-{}", Uuid::now_v7()));
        config
    }

    fn cleanup(config: &SnapshotConfig) {
        let _ = fs::remove_dir_all(&config.output_dir);
    }

    fn profile() -> ProfileId {
        ProfileId::parse("AAAAAAAAAAAJ").unwrap()
    }

    fn publication(title: &str, count: u64) -> Publication {
        Publication::new(title, vec!["A Author".into()], "Venue", Some(2020), count)
    }

    fn policy() -> MergePolicy {
        MergePolicy {
            regression_floor: 0.9,
            removed_keys: BTreeSet::new(),
        }
    }

    fn snapshot_of(pubs: &[Publication]) -> Snapshot {
        merge(
            None,
            "AAAAAAAAAAAJ",
            &aggregator::aggregate(pubs),
            pubs,
            &policy(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn previous_keys_are_retained() {
        let old = snapshot_of(&[publication("Old paper", 40), publication("Shared", 10)]);
        let fresh = [publication("Shared", 12), publication("New paper", 30)];

        let merged = merge(
            Some(&old),
            "AAAAAAAAAAAJ",
            &aggregator::aggregate(&fresh),
            &fresh,
            &policy(),
            Utc::now(),
        )
        .unwrap();

        for key in old.publications.keys() {
            assert!(merged.publications.contains_key(key), "lost {key}");
        }
        assert_eq!(merged.publications.len(), 3);
        let shared = &merged.publications[&publication("Shared", 0).stable_key];
        assert_eq!(shared.citation_count, 12);
        assert_eq!(merged.metrics.total_citations, 82);
        assert_eq!(merged.metrics.h_index, 3);
    }

    #[test]
    fn removed_keys_are_the_only_way_to_drop_history() {
        let gone = publication("Misattributed", 5);
        let old = snapshot_of(&[gone.clone(), publication("Kept", 50)]);
        let fresh = [publication("Kept", 51)];
        let mut policy = policy();
        policy.removed_keys.insert(gone.stable_key.clone());

        let merged = merge(
            Some(&old),
            "AAAAAAAAAAAJ",
            &aggregator::aggregate(&fresh),
            &fresh,
            &policy,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(merged.publications.len(), 1);
        assert!(!merged.publications.contains_key(&gone.stable_key));
        assert_eq!(merged.metrics.total_citations, 51);
    }

    #[test]
    fn duplicate_keys_keep_higher_count() {
        let fresh = [publication("Twice", 3), publication("Twice", 9), publication("Twice", 4)];
        let merged = snapshot_of(&fresh);
        assert_eq!(merged.publications.len(), 1);
        assert_eq!(merged.metrics.total_citations, 9);
    }

    #[test]
    fn year_buckets_are_unioned_with_new_values_winning() {
        let mut old = snapshot_of(&[publication("P", 10)]);
        old.metrics.citations_by_year = BTreeMap::from([(2019, 4), (2020, 6)]);

        let fresh = [publication("P", 11)];
        let mut new_metrics = aggregator::aggregate(&fresh);
        new_metrics.citations_by_year = BTreeMap::from([(2020, 7), (2021, 1)]);

        let merged = merge(
            Some(&old),
            "AAAAAAAAAAAJ",
            &new_metrics,
            &fresh,
            &policy(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            merged.metrics.citations_by_year,
            BTreeMap::from([(2019, 4), (2020, 7), (2021, 1)])
        );
    }

    #[test]
    fn other_profile_is_refused() {
        let old = snapshot_of(&[publication("P", 10)]);
        let err = merge(
            Some(&old),
            "BBBBBBBBBBBJ",
            &ProfileMetrics::default(),
            &[],
            &policy(),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn regression_is_refused_and_file_untouched() {
        let config = temp_config();
        let store = SnapshotStore::new(&config);

        let first = [publication("Big", 1000)];
        let published = store
            .merge_and_persist(None, &profile(), &aggregator::aggregate(&first), &first)
            .unwrap();
        assert_eq!(published.metrics.total_citations, 1000);
        let before = fs::read(store.path()).unwrap();

        let second = [publication("Big", 500)];
        let err = store
            .merge_and_persist(
                Some(&published),
                &profile(),
                &aggregator::aggregate(&second),
                &second,
            )
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(fs::read(store.path()).unwrap(), before);
        cleanup(&config);
    }

    #[test]
    fn drop_within_floor_is_accepted() {
        let old = snapshot_of(&[publication("P", 1000)]);
        let fresh = [publication("P", 900)];
        let merged = merge(
            Some(&old),
            "AAAAAAAAAAAJ",
            &aggregator::aggregate(&fresh),
            &fresh,
            &policy(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(merged.metrics.total_citations, 900);
    }

    #[test]
    fn load_missing_is_none_and_corrupt_is_validation() {
        let config = temp_config();
        let store = SnapshotStore::new(&config);
        assert!(store.load().unwrap().is_none());

        fs::create_dir_all(&config.output_dir).unwrap();
        fs::write(store.path(), "{ not json").unwrap();
        let err = store.load().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
        cleanup(&config);
    }

    #[test]
    fn parse_aggregate_persist_reload_roundtrip() {
        let html = fs::read_to_string(Path::new("../../../fixtures/html/profile_first.html"))
            .expect("fixture");
        let pubs = scholarsnap_crawler::parse(&html).unwrap();
        let metrics = aggregator::aggregate(&pubs);

        let config = temp_config();
        let store = SnapshotStore::new(&config);
        let written = store
            .merge_and_persist(None, &profile(), &metrics, &pubs)
            .unwrap();

        let reloaded = store.load().unwrap().expect("snapshot on disk");
        assert_eq!(reloaded, written);
        assert_eq!(reloaded.metrics.total_citations, metrics.total_citations);
        assert_eq!(reloaded.metrics.h_index, metrics.h_index);
        cleanup(&config);
    }
}
