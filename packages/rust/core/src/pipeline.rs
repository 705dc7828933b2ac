//! End-to-end `run` pipeline: fetch → parse → aggregate → merge → persist → artifacts.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use scholarsnap_artifacts::{ArtifactMeta, write_shields, write_warnings};
use scholarsnap_crawler::{Fetcher, RetryPolicy, Sleeper, Transport};
use scholarsnap_shared::{
    FetchConfig, MetricWarning, ProfileId, Result, ScholarSnapError, SnapshotConfig,
};

use crate::aggregator;
use crate::store::SnapshotStore;

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Profile to scrape.
    pub profile_id: ProfileId,
    /// Snapshot location and merge policy.
    pub snapshot: SnapshotConfig,
}

/// Result of a run that persisted a new snapshot.
#[derive(Debug)]
pub struct RunResult {
    /// Path of the persisted snapshot.
    pub snapshot_path: PathBuf,
    /// Listing pages fetched.
    pub pages: usize,
    /// Whether the page limit cut the listing short.
    pub truncated: bool,
    /// Publications observed in this run.
    pub fetched: usize,
    /// Publications in the persisted snapshot.
    pub publications: usize,
    pub total_citations: u64,
    pub h_index: u32,
    pub i10_index: u32,
    /// Provider vs computed disagreements.
    pub warnings: Vec<MetricWarning>,
    /// Badge and report files written after the snapshot.
    pub artifacts: Vec<ArtifactMeta>,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each listing page is parsed.
    fn page_parsed(&self, current: usize, total: usize, publications: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &RunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_parsed(&self, _current: usize, _total: usize, _publications: usize) {}
    fn done(&self, _result: &RunResult) {}
}

/// Run the pipeline with the real HTTP transport.
pub async fn run_with_http(
    config: &RunConfig,
    fetch: FetchConfig,
    policy: RetryPolicy,
    progress: &dyn ProgressReporter,
) -> Result<RunResult> {
    let fetcher = Fetcher::new(fetch, policy)?;
    run(config, &fetcher, progress).await
}

/// Run the full pipeline.
///
/// 1. Load the previous snapshot (a corrupt one aborts before any request)
/// 2. Fetch every listing page
/// 3. Collect publications, and the summary figures of the first page
/// 4. Aggregate and cross-check against the summary
/// 5. Merge with the previous snapshot and persist atomically
/// 6. Write the warning report and shields.io badges (the summary badge
///    shows the provider's total when the page displays one)
///
/// Nothing is written unless steps 1 to 4 succeed and the merge validates.
#[instrument(skip_all, fields(profile_id = %config.profile_id))]
pub async fn run<T: Transport, S: Sleeper>(
    config: &RunConfig,
    fetcher: &Fetcher<T, S>,
    progress: &dyn ProgressReporter,
) -> Result<RunResult> {
    let start = Instant::now();
    let store = SnapshotStore::new(&config.snapshot);

    info!(snapshot = %store.path().display(), "starting run");

    // --- Phase 1: Previous state ---
    progress.phase("Loading previous snapshot");
    let previous = store.load()?;

    // --- Phase 2: Fetch ---
    progress.phase("Fetching profile");
    let outcome = fetcher.fetch(&config.profile_id).await?;
    if outcome.truncated {
        warn!(
            pages = outcome.pages.len(),
            "listing truncated at the page limit, unseen publications are kept from history"
        );
    }

    // --- Phase 3: Collect parsed pages ---
    progress.phase("Parsing publications");
    let summary = outcome
        .pages
        .first()
        .map(|first| first.page.summary.clone())
        .ok_or_else(|| ScholarSnapError::structural_mismatch("provider returned no pages"))?;

    let total_pages = outcome.pages.len();
    let mut publications = Vec::new();
    for (i, fetched) in outcome.pages.into_iter().enumerate() {
        publications.extend(fetched.page.publications);
        progress.page_parsed(i + 1, total_pages, publications.len());
    }
    info!(
        pages = total_pages,
        publications = publications.len(),
        "parsed listing"
    );

    // --- Phase 4: Aggregate ---
    progress.phase("Aggregating metrics");
    let aggregation = aggregator::aggregate_with_summary(&publications, &summary);

    // --- Phase 5: Merge + persist ---
    progress.phase("Writing snapshot");
    let snapshot = store.merge_and_persist(
        previous.as_ref(),
        &config.profile_id,
        &aggregation.metrics,
        &publications,
    )?;

    // --- Phase 6: Artifacts ---
    progress.phase("Writing artifacts");
    let out_dir = &config.snapshot.output_dir;
    let mut artifacts = vec![write_warnings(
        out_dir,
        snapshot.generated_at,
        &aggregation.warnings,
    )?];
    if config.snapshot.shields {
        artifacts.extend(write_shields(out_dir, &snapshot, summary.total_citations)?);
    }

    let result = RunResult {
        snapshot_path: store.path().clone(),
        pages: total_pages,
        truncated: outcome.truncated,
        fetched: publications.len(),
        publications: snapshot.publications.len(),
        total_citations: snapshot.metrics.total_citations,
        h_index: snapshot.metrics.h_index,
        i10_index: snapshot.metrics.i10_index,
        warnings: aggregation.warnings,
        artifacts,
        elapsed: start.elapsed(),
    };

    info!(
        publications = result.publications,
        total_citations = result.total_citations,
        h_index = result.h_index,
        i10_index = result.i10_index,
        warnings = result.warnings.len(),
        elapsed_ms = result.elapsed.as_millis() as u64,
        "run complete"
    );
    progress.done(&result);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::future::{Future, ready};

    use scholarsnap_artifacts::{SUMMARY_BADGE_FILE, WARNINGS_FILE};
    use scholarsnap_crawler::{RawResponse, TransportError};
    use scholarsnap_shared::{AppConfig, ErrorCategory, ParseErrorKind};
    use url::Url;
    use uuid::Uuid;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    /// Serves page `cstart / page_size`, repeating the last page past the end.
    struct PagedTransport {
        pages: Vec<String>,
        page_size: usize,
    }

    impl Transport for PagedTransport {
        fn get(
            &self,
            url: &Url,
        ) -> impl Future<Output = std::result::Result<RawResponse, TransportError>> + Send {
            let cstart: usize = url
                .query_pairs()
                .find(|(k, _)| k == "cstart")
                .and_then(|(_, v)| v.parse().ok())
                .unwrap_or(0);
            let body = self
                .pages
                .get(cstart / self.page_size)
                .or(self.pages.last())
                .cloned()
                .unwrap_or_default();
            ready(Ok(RawResponse {
                status: 200,
                final_url: url.clone(),
                body,
            }))
        }
    }

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> + Send {
            ready(())
        }
    }

    fn fetcher(pages: &[&str]) -> Fetcher<PagedTransport, NoSleep> {
        let config = FetchConfig::try_from(&AppConfig::default()).unwrap();
        let transport = PagedTransport {
            pages: pages.iter().map(|p| load_fixture(p)).collect(),
            page_size: config.page_size as usize,
        };
        Fetcher::with_parts(config, RetryPolicy::default(), transport, NoSleep)
            .with_jitter(|| 0.0)
    }

    fn run_config() -> RunConfig {
        let mut snapshot = SnapshotConfig::try_from(&AppConfig::default()).unwrap();
        snapshot.output_dir =
            std::env::temp_dir().join(format!("scholarsnap-pipeline-{}", Uuid::now_v7()));
        RunConfig {
            profile_id: ProfileId::parse("AAAAAAAAAAAJ").unwrap(),
            snapshot,
        }
    }

    #[tokio::test]
    async fn run_persists_snapshot_and_artifacts() {
        let config = run_config();
        let fetcher = fetcher(&["profile_first.html", "profile_last.html"]);

        let result = run(&config, &fetcher, &SilentProgress).await.unwrap();

        assert_eq!(result.pages, 2);
        assert!(!result.truncated);
        assert_eq!(result.publications, 6);
        assert_eq!(result.total_citations, 1132);
        assert_eq!(result.h_index, 4);
        assert_eq!(result.i10_index, 3);
        // Provider shows 1,234 / 12 / 14 for the full profile.
        assert_eq!(result.warnings.len(), 3);

        let dir = &config.snapshot.output_dir;
        let snapshot: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&result.snapshot_path).unwrap()).unwrap();
        assert_eq!(snapshot["profile_id"], "AAAAAAAAAAAJ");
        assert_eq!(snapshot["metrics"]["citations_by_year"]["2022"], 1005);
        assert_eq!(snapshot["publications"].as_array().unwrap().len(), 6);

        // The summary badge shows the provider's total, not the computed one.
        let badge: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join(SUMMARY_BADGE_FILE)).unwrap())
                .unwrap();
        assert_eq!(badge["message"], "1234");
        assert!(dir.join(WARNINGS_FILE).exists());
        // Summary badge, six publication badges, warning report.
        assert_eq!(result.artifacts.len(), 8);

        let _ = fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn partial_listing_is_refused_by_regression_guard() {
        let config = run_config();
        run(&config, &fetcher(&["profile_first.html", "profile_last.html"]), &SilentProgress)
            .await
            .unwrap();
        let path = config.snapshot.snapshot_path();
        let before = fs::read(&path).unwrap();

        // Only the last page this time: 9 citations against 1132 published.
        let err = run(&config, &fetcher(&["profile_last.html"]), &SilentProgress)
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(fs::read(&path).unwrap(), before);

        let _ = fs::remove_dir_all(&config.snapshot.output_dir);
    }

    #[tokio::test]
    async fn repeated_run_is_stable() {
        let config = run_config();
        let pages = ["profile_first.html", "profile_last.html"];
        let first = run(&config, &fetcher(&pages), &SilentProgress).await.unwrap();
        let second = run(&config, &fetcher(&pages), &SilentProgress).await.unwrap();

        assert_eq!(first.publications, second.publications);
        assert_eq!(first.total_citations, second.total_citations);
        assert_eq!(first.h_index, second.h_index);

        let _ = fs::remove_dir_all(&config.snapshot.output_dir);
    }

    #[tokio::test]
    async fn structural_mismatch_leaves_snapshot_untouched() {
        let config = run_config();
        run(&config, &fetcher(&["profile_last.html"]), &SilentProgress)
            .await
            .unwrap();
        let path = config.snapshot.snapshot_path();
        let before = fs::read(&path).unwrap();

        let err = run(&config, &fetcher(&["no_container.html"]), &SilentProgress)
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Parse);
        assert!(matches!(
            err,
            ScholarSnapError::Parse {
                kind: ParseErrorKind::StructuralMismatch,
                ..
            }
        ));
        assert_eq!(fs::read(&path).unwrap(), before);

        let _ = fs::remove_dir_all(&config.snapshot.output_dir);
    }

    #[tokio::test]
    async fn shields_can_be_disabled() {
        let mut config = run_config();
        config.snapshot.shields = false;

        let result = run(&config, &fetcher(&["profile_last.html"]), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.artifacts.len(), 1);
        assert!(!config.snapshot.output_dir.join(SUMMARY_BADGE_FILE).exists());

        let _ = fs::remove_dir_all(&config.snapshot.output_dir);
    }
}
