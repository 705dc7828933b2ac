//! Summary metrics derived from a publication list.

use tracing::warn;

use scholarsnap_shared::{MetricWarning, ProfileMetrics, Publication, SummaryFigures};

/// Citation threshold of the i10-index.
const I10_THRESHOLD: u64 = 10;

/// Computed metrics together with their disagreements with the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub metrics: ProfileMetrics,
    pub warnings: Vec<MetricWarning>,
}

/// The largest `h` such that at least `h` counts are `>= h`.
pub fn h_index(counts: &[u64]) -> u32 {
    let mut sorted = counts.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let h = sorted
        .iter()
        .enumerate()
        .take_while(|&(rank, &count)| count >= rank as u64 + 1)
        .count();
    u32::try_from(h).unwrap_or(u32::MAX)
}

/// Number of counts `>= 10`.
pub fn i10_index(counts: &[u64]) -> u32 {
    let n = counts.iter().filter(|&&c| c >= I10_THRESHOLD).count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Compute metrics from publications alone. `citations_by_year` stays empty.
pub fn aggregate<'a, I>(publications: I) -> ProfileMetrics
where
    I: IntoIterator<Item = &'a Publication>,
{
    let counts: Vec<u64> = publications.into_iter().map(|p| p.citation_count).collect();
    ProfileMetrics {
        total_citations: counts.iter().sum(),
        h_index: h_index(&counts),
        i10_index: i10_index(&counts),
        citations_by_year: Default::default(),
    }
}

/// Compute metrics and cross-check them against the provider's figures.
///
/// The provider's year series is carried over as is. A provider figure that
/// differs from the computed one yields a [`MetricWarning`]; it never
/// replaces the computed value.
pub fn aggregate_with_summary(publications: &[Publication], summary: &SummaryFigures) -> Aggregation {
    let mut metrics = aggregate(publications);
    metrics.citations_by_year = summary.citations_by_year.clone();

    let mut warnings = Vec::new();
    let checks = [
        ("total_citations", summary.total_citations, metrics.total_citations),
        ("h_index", summary.h_index.map(u64::from), u64::from(metrics.h_index)),
        ("i10_index", summary.i10_index.map(u64::from), u64::from(metrics.i10_index)),
    ];
    for (metric, provider, computed) in checks {
        let Some(provider) = provider else { continue };
        if provider != computed {
            warn!(metric, provider, computed, "provider figure differs from computed value");
            warnings.push(MetricWarning {
                metric: metric.to_string(),
                provider,
                computed,
            });
        }
    }

    Aggregation { metrics, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn pubs(counts: &[u64]) -> Vec<Publication> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &c)| Publication::new(format!("Paper {i}"), vec![], "", Some(2020), c))
            .collect()
    }

    #[test]
    fn h_index_examples() {
        assert_eq!(h_index(&[10, 8, 5, 4, 3]), 4);
        assert_eq!(h_index(&[0, 0, 0]), 0);
        assert_eq!(h_index(&[]), 0);
        assert_eq!(h_index(&[3, 0, 6, 1, 5]), 3);
        assert_eq!(h_index(&[100]), 1);
        assert_eq!(h_index(&[2, 2, 2, 2]), 2);
    }

    #[test]
    fn i10_counts_threshold_inclusive() {
        assert_eq!(i10_index(&[10, 9, 11, 0, 250]), 3);
        assert_eq!(i10_index(&[]), 0);
    }

    #[test]
    fn aggregate_sums_and_indexes() {
        let metrics = aggregate(&pubs(&[10, 8, 5, 4, 3]));
        assert_eq!(metrics.total_citations, 30);
        assert_eq!(metrics.h_index, 4);
        assert_eq!(metrics.i10_index, 1);
        assert!(metrics.citations_by_year.is_empty());
    }

    #[test]
    fn aggregate_is_idempotent() {
        let input = pubs(&[7, 1, 12, 0, 33]);
        assert_eq!(aggregate(&input), aggregate(&input));

        let summary = SummaryFigures {
            total_citations: Some(53),
            ..SummaryFigures::default()
        };
        assert_eq!(
            aggregate_with_summary(&input, &summary),
            aggregate_with_summary(&input, &summary)
        );
    }

    #[test]
    fn matching_summary_yields_no_warnings() {
        let input = pubs(&[10, 8, 5, 4, 3]);
        let summary = SummaryFigures {
            total_citations: Some(30),
            h_index: Some(4),
            i10_index: Some(1),
            citations_by_year: BTreeMap::from([(2023, 12), (2024, 18)]),
        };

        let agg = aggregate_with_summary(&input, &summary);
        assert!(agg.warnings.is_empty());
        assert_eq!(agg.metrics.citations_by_year, summary.citations_by_year);
    }

    #[test]
    fn diverging_summary_warns_but_keeps_computed_values() {
        let input = pubs(&[10, 8, 5, 4, 3]);
        let summary = SummaryFigures {
            total_citations: Some(31),
            h_index: Some(5),
            i10_index: None,
            citations_by_year: BTreeMap::new(),
        };

        let agg = aggregate_with_summary(&input, &summary);
        assert_eq!(agg.metrics.total_citations, 30);
        assert_eq!(agg.metrics.h_index, 4);
        assert_eq!(
            agg.warnings,
            vec![
                MetricWarning {
                    metric: "total_citations".into(),
                    provider: 31,
                    computed: 30,
                },
                MetricWarning {
                    metric: "h_index".into(),
                    provider: 5,
                    computed: 4,
                },
            ]
        );
    }
}
