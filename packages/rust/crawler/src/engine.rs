//! Sequential, rate-limit-aware profile fetcher.
//!
//! The fetcher walks the provider's paginated listing one page at a time,
//! waits between pages, and sends every request through the [`RetryPolicy`].
//! It performs no disk I/O.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use url::Url;

use scholarsnap_shared::{FetchConfig, FetchErrorKind, ProfileId, Result, ScholarSnapError};

use crate::parser::{self, ParsedPage, is_block_page};
use crate::retry::{RetryPolicy, jitter_sample};
use crate::transport::{
    HttpTransport, RawResponse, Sleeper, TokioSleeper, Transport, TransportError,
};

// ---------------------------------------------------------------------------
// FetchOutcome
// ---------------------------------------------------------------------------

/// One listing page, parsed once on arrival.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Zero-based page number.
    pub index: u32,
    /// Offset of the first row on this page.
    pub cstart: u32,
    /// Publications, pagination signal, and summary figures of the page.
    pub page: ParsedPage,
}

/// Result of a completed fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Pages in listing order; the first one carries the profile summary.
    pub pages: Vec<FetchedPage>,
    /// `true` when `max_pages` was reached while the provider still indicated more.
    pub truncated: bool,
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Profile fetcher over an injected transport and sleeper.
pub struct Fetcher<T = HttpTransport, S = TokioSleeper> {
    config: FetchConfig,
    policy: RetryPolicy,
    transport: T,
    sleeper: S,
    jitter: fn() -> f64,
}

impl Fetcher<HttpTransport, TokioSleeper> {
    /// Create a fetcher that talks HTTP and sleeps in real time.
    pub fn new(config: FetchConfig, policy: RetryPolicy) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_parts(config, policy, transport, TokioSleeper))
    }
}

impl<T: Transport, S: Sleeper> Fetcher<T, S> {
    /// Create a fetcher from explicit parts.
    pub fn with_parts(config: FetchConfig, policy: RetryPolicy, transport: T, sleeper: S) -> Self {
        Self {
            config,
            policy,
            transport,
            sleeper,
            jitter: jitter_sample,
        }
    }

    /// Replace the jitter source (a function returning a sample in `0.0..1.0`).
    pub fn with_jitter(mut self, jitter: fn() -> f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// The fetch configuration in use.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// URL of the listing page starting at row `cstart`.
    pub fn listing_url(&self, profile_id: &ProfileId, cstart: u32) -> Result<Url> {
        let mut url = self.config.base_url.join("citations").map_err(|e| {
            ScholarSnapError::config(format!("invalid base URL {}: {e}", self.config.base_url))
        })?;
        url.query_pairs_mut()
            .append_pair("user", profile_id.as_str())
            .append_pair("hl", "en")
            .append_pair("cstart", &cstart.to_string())
            .append_pair("pagesize", &self.config.page_size.to_string());
        Ok(url)
    }

    /// Fetch every listing page of a profile.
    ///
    /// Stops when the provider signals the end of the list or after
    /// `max_pages`, whichever comes first. The whole fetch, retries and
    /// cooldowns included, is bounded by the configured deadline.
    #[instrument(skip_all, fields(profile_id = %profile_id))]
    pub async fn fetch(&self, profile_id: &ProfileId) -> Result<FetchOutcome> {
        let deadline = self.config.deadline;
        let per_page = self.policy.worst_case_wait()
            + self
                .config
                .timeout
                .saturating_mul(self.policy.max_attempts.saturating_add(1))
            + self.config.request_delay;
        let worst_case = per_page.saturating_mul(self.config.max_pages);
        if worst_case > deadline {
            debug!(
                worst_case_ms = duration_ms(worst_case),
                deadline_ms = duration_ms(deadline),
                "retry budget exceeds the deadline, a slow provider ends the fetch early"
            );
        }

        match tokio::time::timeout(deadline, self.fetch_pages(profile_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(deadline_ms = duration_ms(deadline), "fetch deadline exceeded");
                Err(ScholarSnapError::fetch(
                    FetchErrorKind::Network,
                    format!("fetch did not finish within {}s", deadline.as_secs()),
                ))
            }
        }
    }

    async fn fetch_pages(&self, profile_id: &ProfileId) -> Result<FetchOutcome> {
        let page_size = self.config.page_size;
        let mut pages = Vec::new();

        info!(
            page_size,
            max_pages = self.config.max_pages,
            delay_ms = self.config.request_delay.as_millis() as u64,
            "starting fetch"
        );

        for index in 0..self.config.max_pages {
            if index > 0 && !self.config.request_delay.is_zero() {
                self.sleeper.sleep(self.config.request_delay).await;
            }

            let cstart = index * page_size;
            let url = self.listing_url(profile_id, cstart)?;
            let body = self.get_with_retry(&url).await?;

            let page = parser::parse_page(&body)?;
            let has_more = page.has_more(page_size);
            debug!(index, cstart, rows = page.rows, has_more, "page fetched");

            pages.push(FetchedPage {
                index,
                cstart,
                page,
            });

            if !has_more {
                info!(pages = pages.len(), "fetch completed");
                return Ok(FetchOutcome {
                    pages,
                    truncated: false,
                });
            }
        }

        warn!(
            max_pages = self.config.max_pages,
            "page limit reached while the provider still indicates more results"
        );
        Ok(FetchOutcome {
            pages,
            truncated: true,
        })
    }

    /// GET one URL under the retry policy, returning the page body.
    async fn get_with_retry(&self, url: &Url) -> Result<String> {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0u32;
        let mut cooled_down = false;

        loop {
            attempt += 1;
            debug!(%url, attempt, "requesting");

            match classify(self.transport.get(url).await) {
                Attempt::Page(body) => return Ok(body),
                Attempt::Fatal(err) => return Err(err),
                Attempt::Throttled(kind, reason) if !cooled_down => {
                    cooled_down = true;
                    warn!(
                        %kind,
                        reason = %reason,
                        cooldown_ms = duration_ms(self.policy.cooldown),
                        "provider is throttling, cooling down before a final attempt"
                    );
                    self.sleeper.sleep(self.policy.cooldown).await;
                }
                Attempt::Throttled(kind, reason) => {
                    return Err(ScholarSnapError::fetch(
                        kind,
                        format!("{reason} (still refused after cooldown)"),
                    ));
                }
                Attempt::Transient(reason) if !cooled_down && attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt, (self.jitter)());
                    warn!(
                        reason = %reason,
                        attempt,
                        max_attempts,
                        delay_ms = duration_ms(delay),
                        "transient failure, retrying"
                    );
                    self.sleeper.sleep(delay).await;
                }
                Attempt::Transient(reason) => {
                    return Err(ScholarSnapError::fetch(
                        FetchErrorKind::Network,
                        format!("{reason} (gave up after {attempt} attempts)"),
                    ));
                }
            }
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Response classification
// ---------------------------------------------------------------------------

/// What the retry loop should do with one exchange.
#[derive(Debug)]
enum Attempt {
    Page(String),
    Transient(String),
    Throttled(FetchErrorKind, String),
    Fatal(ScholarSnapError),
}

fn classify(result: std::result::Result<RawResponse, TransportError>) -> Attempt {
    let response = match result {
        Ok(response) => response,
        Err(e) => return Attempt::Transient(e.to_string()),
    };

    if response.final_url.path().starts_with("/sorry") {
        return Attempt::Throttled(
            FetchErrorKind::Blocked,
            "redirected to the captcha interstitial".into(),
        );
    }

    match response.status {
        200..=299 if is_block_page(&response.body) => Attempt::Throttled(
            FetchErrorKind::Blocked,
            "provider served a captcha page".into(),
        ),
        200..=299 if is_truncated(&response.body) => {
            Attempt::Transient("incomplete response body".into())
        }
        200..=299 => Attempt::Page(response.body),
        404 => Attempt::Fatal(ScholarSnapError::fetch(
            FetchErrorKind::NotFound,
            "profile not found (HTTP 404)",
        )),
        429 => Attempt::Throttled(FetchErrorKind::RateLimited, "HTTP 429".into()),
        403 => Attempt::Throttled(FetchErrorKind::Blocked, "HTTP 403".into()),
        408 | 500..=599 => Attempt::Transient(format!("HTTP {}", response.status)),
        status => Attempt::Fatal(ScholarSnapError::fetch(
            FetchErrorKind::Network,
            format!("unexpected HTTP {status}"),
        )),
    }
}

/// An empty body or one cut off before the closing `</html>`.
fn is_truncated(body: &str) -> bool {
    let trimmed = body.trim_end();
    if trimmed.is_empty() {
        return true;
    }
    let tail_start = trimmed
        .char_indices()
        .rev()
        .nth(15)
        .map_or(0, |(i, _)| i);
    !trimmed[tail_start..].to_ascii_lowercase().contains("</html>")
}
