//! Profile page parser.
//!
//! Turns the provider's listing markup into owned [`Publication`] records and
//! [`SummaryFigures`]. Every function here is pure: the same bytes always give
//! the same output, and nothing borrows from the parsed document afterwards.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use scholarsnap_shared::{Publication, Result, ScholarSnapError, SummaryFigures};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("#gsc_a_t"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr.gsc_a_tr"));
static EMPTY_ROW: LazyLock<Selector> = LazyLock::new(|| selector("td.gsc_a_e"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("a.gsc_a_at"));
static GRAY: LazyLock<Selector> = LazyLock::new(|| selector("div.gs_gray"));
static YEAR_SUFFIX: LazyLock<Selector> = LazyLock::new(|| selector("span.gs_oph"));
static CITED_BY: LazyLock<Selector> = LazyLock::new(|| selector("a.gsc_a_ac"));
static YEAR: LazyLock<Selector> = LazyLock::new(|| selector(".gsc_a_h"));
static MORE_BUTTON: LazyLock<Selector> = LazyLock::new(|| selector("#gsc_bpf_more"));
static CAPTCHA_FORM: LazyLock<Selector> = LazyLock::new(|| selector("#gs_captcha_f"));

static SUMMARY_ROW: LazyLock<Selector> = LazyLock::new(|| selector("#gsc_rsb_st tbody tr"));
static SUMMARY_LABEL: LazyLock<Selector> = LazyLock::new(|| selector("td.gsc_rsb_sc1"));
static SUMMARY_VALUE: LazyLock<Selector> = LazyLock::new(|| selector("td.gsc_rsb_std"));

static HIST_YEAR: LazyLock<Selector> = LazyLock::new(|| selector(".gsc_g_t"));
static HIST_BAR: LazyLock<Selector> = LazyLock::new(|| selector(".gsc_g_a"));
static HIST_VALUE: LazyLock<Selector> = LazyLock::new(|| selector(".gsc_g_al"));

/// Text of the provider's interstitial, checked only on pages without a listing.
const BLOCK_MARKERS: [&str; 2] = ["unusual traffic", "/sorry/index"];

static Z_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"z-index:\s*(\d+)").expect("valid regex"));

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

/// Outcome of extracting one field from markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    /// The field was found and parsed.
    Present(T),
    /// The field's element or text is missing.
    Absent,
    /// The field was found but its text could not be interpreted.
    Malformed(String),
}

impl<T> Field<T> {
    /// Interpret optional raw text with `parse`; blank text counts as absent.
    fn from_text(raw: Option<String>, parse: impl FnOnce(&str) -> Option<T>) -> Self {
        match raw {
            Some(text) if !text.trim().is_empty() => match parse(text.trim()) {
                Some(value) => Self::Present(value),
                None => Self::Malformed(text),
            },
            _ => Self::Absent,
        }
    }

    /// The value, logging malformed input under `field` for `context`.
    fn into_option(self, field: &str, context: &str) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
            Self::Malformed(raw) => {
                warn!(field, raw = %raw, context, "malformed field treated as absent");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Listing pages
// ---------------------------------------------------------------------------

/// One parsed listing page.
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// Publications on this page (rows without a title are skipped).
    pub publications: Vec<Publication>,
    /// Listing rows seen, including skipped ones.
    pub rows: usize,
    /// State of the "show more" button: `Present(true)` when enabled.
    pub more: Field<bool>,
    /// Summary figures shown alongside the listing (first page only, in practice).
    pub summary: SummaryFigures,
}

impl ParsedPage {
    /// Whether the provider indicates a further page.
    ///
    /// A missing "show more" button is ambiguous; a full page is then taken to
    /// mean there may be more.
    pub fn has_more(&self, page_size: u32) -> bool {
        if self.rows == 0 {
            return false;
        }
        match self.more {
            Field::Present(enabled) => enabled,
            Field::Absent | Field::Malformed(_) => self.rows >= page_size as usize,
        }
    }
}

/// Parse all publications from a listing page.
pub fn parse(raw: &str) -> Result<Vec<Publication>> {
    Ok(parse_page(raw)?.publications)
}

/// Parse a listing page, including its pagination signal.
pub fn parse_page(raw: &str) -> Result<ParsedPage> {
    let doc = Html::parse_document(raw);
    let table = locate_table(&doc)?;

    let mut publications = Vec::new();
    let mut rows = 0;
    for row in table.select(&ROW) {
        if row.select(&EMPTY_ROW).next().is_some() {
            continue;
        }
        rows += 1;
        match parse_row(row) {
            Some(publication) => publications.push(publication),
            None => warn!(row = rows, "publication row without a title, skipped"),
        }
    }

    let more = match doc.select(&MORE_BUTTON).next() {
        Some(button) => Field::Present(button.value().attr("disabled").is_none()),
        None => Field::Absent,
    };

    Ok(ParsedPage {
        publications,
        rows,
        more,
        summary: summary_from(&doc),
    })
}

/// Whether a page is the captcha interstitial rather than a listing.
///
/// A page that has the publication table is never blocked, whatever its
/// titles say.
pub fn is_block_page(raw: &str) -> bool {
    let doc = Html::parse_document(raw);
    if doc.select(&TABLE).next().is_some() {
        return false;
    }
    doc.select(&CAPTCHA_FORM).next().is_some() || BLOCK_MARKERS.iter().any(|m| raw.contains(m))
}

fn locate_table(doc: &Html) -> Result<ElementRef<'_>> {
    doc.select(&TABLE).next().ok_or_else(|| {
        ScholarSnapError::structural_mismatch(
            "publication table #gsc_a_t not found; the profile layout may have changed",
        )
    })
}

fn parse_row(row: ElementRef<'_>) -> Option<Publication> {
    let title = row
        .select(&TITLE)
        .next()
        .map(collapsed_text)
        .filter(|t| !t.is_empty())?;

    let grays: Vec<ElementRef<'_>> = row.select(&GRAY).collect();
    let authors = grays
        .first()
        .map(|el| split_authors(&collapsed_text(*el)))
        .unwrap_or_default();
    let venue = grays.get(1).map(|el| venue_text(*el)).unwrap_or_default();

    let citations = Field::from_text(row.select(&CITED_BY).next().map(collapsed_text), parse_count)
        .into_option("citation_count", &title)
        .unwrap_or(0);
    let year = Field::from_text(row.select(&YEAR).next().map(collapsed_text), parse_year)
        .into_option("year", &title);

    Some(Publication::new(title, authors, venue, year, citations))
}

fn split_authors(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty() && !a.chars().all(|c| c == '.' || c == '…'))
        .map(String::from)
        .collect()
}

/// Venue text without the trailing ", <year>" span.
fn venue_text(el: ElementRef<'_>) -> String {
    let full = collapsed_text(el);
    let venue = match el.select(&YEAR_SUFFIX).next() {
        Some(suffix) => {
            let suffix = collapsed_text(suffix);
            full.strip_suffix(suffix.as_str()).unwrap_or(&full).to_string()
        }
        None => full,
    };
    venue.trim_end_matches([',', ' ']).to_string()
}

fn collapsed_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '\u{a0}' | ' ' | '*'))
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_year(text: &str) -> Option<i32> {
    text.parse::<i32>()
        .ok()
        .filter(|y| (1000..=2999).contains(y))
}

// ---------------------------------------------------------------------------
// Summary figures
// ---------------------------------------------------------------------------

/// Parse the summary figures a profile page shows inline.
///
/// Figures the page does not show are left as `None`; only a missing
/// publication table is an error.
pub fn parse_summary(raw: &str) -> Result<SummaryFigures> {
    let doc = Html::parse_document(raw);
    locate_table(&doc)?;
    Ok(summary_from(&doc))
}

fn summary_from(doc: &Html) -> SummaryFigures {
    let mut summary = SummaryFigures::default();
    for row in doc.select(&SUMMARY_ROW) {
        let label = row
            .select(&SUMMARY_LABEL)
            .next()
            .map(collapsed_text)
            .unwrap_or_default()
            .to_lowercase();
        // First value column is "All", the second "Since <year>".
        let value = Field::from_text(
            row.select(&SUMMARY_VALUE).next().map(collapsed_text),
            parse_count,
        );

        if label.starts_with("citations") {
            summary.total_citations = value.into_option("total_citations", "summary");
        } else if label.starts_with("h-index") {
            summary.h_index = value
                .into_option("h_index", "summary")
                .and_then(|v| u32::try_from(v).ok());
        } else if label.starts_with("i10-index") {
            summary.i10_index = value
                .into_option("i10_index", "summary")
                .and_then(|v| u32::try_from(v).ok());
        }
    }

    summary.citations_by_year = parse_histogram(doc);
    summary
}

/// Read the citations-per-year bar chart.
///
/// Each bar's `z-index` counts from the newest year label; years without a bar
/// had no citations.
fn parse_histogram(doc: &Html) -> BTreeMap<i32, u64> {
    let years: Vec<i32> = doc
        .select(&HIST_YEAR)
        .filter_map(|el| parse_year(&collapsed_text(el)))
        .collect();

    let mut series = BTreeMap::new();
    if years.is_empty() {
        return series;
    }
    for year in &years {
        series.insert(*year, 0);
    }

    for (position, bar) in doc.select(&HIST_BAR).enumerate() {
        let count = Field::from_text(
            bar.select(&HIST_VALUE).next().map(collapsed_text),
            parse_count,
        );
        let Some(count) = count.into_option("citations_by_year", "histogram") else {
            continue;
        };

        let from_z = bar
            .value()
            .attr("style")
            .and_then(|style| Z_INDEX.captures(style))
            .and_then(|caps| caps[1].parse::<usize>().ok())
            .filter(|z| (1..=years.len()).contains(z))
            .map(|z| years[years.len() - z]);

        match from_z.or_else(|| years.get(position).copied()) {
            Some(year) => {
                series.insert(year, count);
            }
            None => warn!(position, "histogram bar without a matching year, skipped"),
        }
    }

    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use scholarsnap_shared::{ParseErrorKind, stable_key};

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    #[test]
    fn parses_publication_rows() {
        let page = parse_page(&load_fixture("profile_first.html")).unwrap();

        assert_eq!(page.rows, 5);
        assert_eq!(page.publications.len(), 4);

        let first = &page.publications[0];
        assert_eq!(first.title, "Deep Learning for Widgets");
        assert_eq!(first.authors, vec!["A Example", "B Jones", "C Smith"]);
        assert_eq!(first.venue, "Journal of Widgets 12 (3), 45-67");
        assert_eq!(first.year, Some(2019));
        assert_eq!(first.citation_count, 1024);
        assert_eq!(first.stable_key, stable_key("deep learning for widgets", Some(2019)));
    }

    #[test]
    fn missing_counts_and_years_are_kept() {
        let pubs = parse(&load_fixture("profile_first.html")).unwrap();
        let note = pubs
            .iter()
            .find(|p| p.title == "Untitled Workshop Note")
            .expect("row without counts is kept");
        assert_eq!(note.citation_count, 0);
        assert_eq!(note.year, None);
        assert_eq!(note.venue, "");
    }

    #[test]
    fn malformed_values_are_treated_as_absent() {
        let pubs = parse(&load_fixture("profile_last.html")).unwrap();
        assert_eq!(pubs.len(), 2);
        let bench = pubs.iter().find(|p| p.title == "Sprocket Benchmarks").unwrap();
        assert_eq!(bench.citation_count, 0);
        assert_eq!(bench.year, None);
        assert_eq!(bench.venue, "Tech report");
    }

    #[test]
    fn pagination_signal() {
        let first = parse_page(&load_fixture("profile_first.html")).unwrap();
        assert_eq!(first.more, Field::Present(true));
        assert!(first.has_more(100));

        let last = parse_page(&load_fixture("profile_last.html")).unwrap();
        assert_eq!(last.more, Field::Present(false));
        assert!(!last.has_more(2));
    }

    #[test]
    fn missing_button_falls_back_to_row_count() {
        let page = ParsedPage {
            publications: vec![],
            rows: 100,
            more: Field::Absent,
            summary: SummaryFigures::default(),
        };
        assert!(page.has_more(100));
        assert!(!page.has_more(101));
    }

    #[test]
    fn empty_profile_has_no_rows() {
        let page = parse_page(&load_fixture("profile_empty.html")).unwrap();
        assert_eq!(page.rows, 0);
        assert!(page.publications.is_empty());
        assert!(!page.has_more(100));
    }

    #[test]
    fn missing_table_is_structural_mismatch() {
        let err = parse(&load_fixture("no_container.html")).unwrap_err();
        assert!(matches!(
            err,
            ScholarSnapError::Parse {
                kind: ParseErrorKind::StructuralMismatch,
                ..
            }
        ));
        assert!(parse_summary(&load_fixture("no_container.html")).is_err());
    }

    #[test]
    fn parses_summary_figures() {
        let summary = parse_summary(&load_fixture("profile_first.html")).unwrap();
        assert_eq!(summary.total_citations, Some(1234));
        assert_eq!(summary.h_index, Some(12));
        assert_eq!(summary.i10_index, Some(14));
    }

    #[test]
    fn histogram_maps_bars_by_z_index() {
        let summary = parse_summary(&load_fixture("profile_first.html")).unwrap();
        let expected: BTreeMap<i32, u64> =
            [(2019, 101), (2020, 0), (2021, 210), (2022, 1005), (2023, 88)]
                .into_iter()
                .collect();
        assert_eq!(summary.citations_by_year, expected);
    }

    #[test]
    fn page_summary_matches_parse_summary() {
        let raw = load_fixture("profile_first.html");
        assert_eq!(parse_page(&raw).unwrap().summary, parse_summary(&raw).unwrap());
    }

    #[test]
    fn captcha_page_is_blocked() {
        assert!(is_block_page(&load_fixture("captcha.html")));
        assert!(!is_block_page(&load_fixture("profile_first.html")));
        assert!(!is_block_page(&load_fixture("no_container.html")));
    }

    #[test]
    fn listing_mentioning_markers_is_not_blocked() {
        let raw = load_fixture("profile_last.html")
            .replace(
                "On the Theory of Sprockets",
                "Detecting unusual traffic in backbone networks",
            )
            .replace("Tech report", "Tech report, see /sorry/index");
        assert!(!is_block_page(&raw));

        let titles: Vec<String> = parse(&raw).unwrap().into_iter().map(|p| p.title).collect();
        assert!(titles.contains(&"Detecting unusual traffic in backbone networks".to_string()));
    }

    #[test]
    fn summary_absent_when_sidebar_missing() {
        let summary = parse_summary(&load_fixture("profile_last.html")).unwrap();
        assert_eq!(summary, SummaryFigures::default());
    }

    #[test]
    fn parsing_is_deterministic() {
        let raw = load_fixture("profile_first.html");
        assert_eq!(parse(&raw).unwrap(), parse(&raw).unwrap());
    }

    #[test]
    fn count_parsing() {
        assert_eq!(parse_count("1,234"), Some(1234));
        assert_eq!(parse_count("87*"), Some(87));
        assert_eq!(parse_count("n/a"), None);
        assert_eq!(parse_year("20xx"), None);
        assert_eq!(parse_year("0"), None);
    }
}
