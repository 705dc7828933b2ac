//! Core domain types for citation snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Number of hex digits kept from the SHA-256 digest for a [`Publication::stable_key`].
const STABLE_KEY_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Publication
// ---------------------------------------------------------------------------

/// A single publication as listed on a citation profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    /// Publication title as displayed by the provider.
    pub title: String,
    /// Author names in listing order.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Journal / conference / publisher string.
    #[serde(default)]
    pub venue: String,
    /// Publication year, when the provider shows one.
    pub year: Option<i32>,
    /// Citation count (0 when the provider shows none).
    #[serde(default)]
    pub citation_count: u64,
    /// Run-independent identity derived from title + year.
    pub stable_key: String,
}

impl Publication {
    /// Build a publication, deriving its stable key from `title` and `year`.
    pub fn new(
        title: impl Into<String>,
        authors: Vec<String>,
        venue: impl Into<String>,
        year: Option<i32>,
        citation_count: u64,
    ) -> Self {
        let title = title.into();
        let stable_key = stable_key(&title, year);
        Self {
            title,
            authors,
            venue: venue.into(),
            year,
            citation_count,
            stable_key,
        }
    }
}

/// Collapse whitespace runs to single spaces and case-fold.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Derive the stable key for a publication.
///
/// Only the title and year take part, so reordered listings and edited author or
/// venue strings map to the same key across runs.
pub fn stable_key(title: &str, year: Option<i32>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_title(title).as_bytes());
    hasher.update([0x1f]);
    if let Some(year) = year {
        hasher.update(year.to_string().as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..STABLE_KEY_LEN].to_string()
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Summary metrics of a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileMetrics {
    pub total_citations: u64,
    pub h_index: u32,
    pub i10_index: u32,
    /// Citations received per calendar year, as reported by the provider.
    #[serde(default)]
    pub citations_by_year: BTreeMap<i32, u64>,
}

/// Summary figures a profile page exposes directly. Every figure is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryFigures {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_citations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub i10_index: Option<u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub citations_by_year: BTreeMap<i32, u64>,
}

/// Disagreement between a figure the provider shows and the one computed locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricWarning {
    /// Metric name (`total_citations`, `h_index`, `i10_index`).
    pub metric: String,
    /// Value shown by the provider.
    pub provider: u64,
    /// Value computed from the publication list.
    pub computed: u64,
}

impl std::fmt::Display for MetricWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: provider shows {}, computed {}",
            self.metric, self.provider, self.computed
        )
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Publications of a snapshot, keyed (and therefore ordered) by stable key.
pub type PublicationSet = BTreeMap<String, Publication>;

/// The persisted, published state of one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When this snapshot was produced.
    pub generated_at: DateTime<Utc>,
    /// The provider-specific profile identifier.
    pub profile_id: String,
    /// Summary metrics over `publications`.
    pub metrics: ProfileMetrics,
    /// Serialized as an array sorted by stable key.
    #[serde(
        serialize_with = "serialize_publications",
        deserialize_with = "deserialize_publications"
    )]
    pub publications: PublicationSet,
}

fn serialize_publications<S: Serializer>(
    set: &PublicationSet,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(set.values())
}

fn deserialize_publications<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<PublicationSet, D::Error> {
    let list = Vec::<Publication>::deserialize(deserializer)?;
    Ok(list
        .into_iter()
        .map(|p| (p.stable_key.clone(), p))
        .collect())
}
