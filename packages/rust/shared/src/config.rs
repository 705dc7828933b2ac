//! Application configuration for scholarsnap.
//!
//! Config is read from `--config`, else `./scholarsnap.toml`, else
//! `~/.scholarsnap/scholarsnap.toml`. CLI flags override config file values,
//! which override defaults. This module and the CLI are the only places that
//! read the process environment.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, ScholarSnapError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "scholarsnap.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".scholarsnap";

/// Google Scholar user ids are short url-safe tokens.
static PROFILE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Config structs (matching scholarsnap.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the profile id comes from.
    #[serde(default)]
    pub profile: ProfileConfig,

    /// HTTP and pagination settings.
    #[serde(default)]
    pub fetch: FetchSection,

    /// Backoff policy settings.
    #[serde(default)]
    pub retry: RetrySection,

    /// Output location and merge policy.
    #[serde(default)]
    pub snapshot: SnapshotSection,
}

/// `[profile]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Name of the env var holding the profile id.
    #[serde(default = "default_id_env")]
    pub id_env: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            id_env: default_id_env(),
        }
    }
}

fn default_id_env() -> String {
    "GOOGLE_SCHOLAR_ID".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// Provider origin.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Publications requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Hard ceiling on listing pages per run.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Delay between consecutive page requests.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Wall-clock limit on the whole fetch, retries and cooldowns included.
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// User-Agent presented for the whole run.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Accept-Language presented for the whole run.
    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Optional HTTP(S) proxy URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            request_delay_ms: default_request_delay(),
            timeout_secs: default_timeout(),
            deadline_secs: default_deadline(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            proxy: None,
        }
    }
}

fn default_base_url() -> String {
    "https://scholar.google.com".into()
}
fn default_deadline() -> u64 {
    3600
}
fn default_page_size() -> u32 {
    100
}
fn default_max_pages() -> u32 {
    20
}
fn default_request_delay() -> u64 {
    3000
}
fn default_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36"
        .into()
}
fn default_accept_language() -> String {
    "en-US,en;q=0.9".into()
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    /// Attempts per request for transient failures (including the first).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles each attempt.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Upper bound for the exponential part of the delay.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Upper bound of the random component added to each delay.
    #[serde(default = "default_jitter")]
    pub jitter_ms: u64,

    /// Pause after a rate-limit/blocked response before the final attempt.
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            jitter_ms: default_jitter(),
            cooldown_ms: default_cooldown(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}
fn default_base_delay() -> u64 {
    2_000
}
fn default_max_delay() -> u64 {
    60_000
}
fn default_jitter() -> u64 {
    1_000
}
fn default_cooldown() -> u64 {
    120_000
}

/// `[snapshot]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSection {
    /// Directory holding the snapshot and its artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Snapshot file name inside `output_dir`.
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Minimum accepted fraction of the previous total citation count.
    #[serde(default = "default_regression_floor")]
    pub regression_floor: f64,

    /// Stable keys that may be dropped from published history.
    #[serde(default)]
    pub removed_keys: Vec<String>,

    /// Whether to write shields.io badge documents.
    #[serde(default = "default_true")]
    pub shields: bool,
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_name: default_file_name(),
            regression_floor: default_regression_floor(),
            removed_keys: Vec::new(),
            shields: true,
        }
    }
}

fn default_output_dir() -> String {
    "results".into()
}
fn default_file_name() -> String {
    "gs_data.json".into()
}
fn default_regression_floor() -> f64 {
    0.9
}
fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: Url,
    pub page_size: u32,
    pub max_pages: u32,
    pub request_delay: Duration,
    pub timeout: Duration,
    /// Upper bound on one whole fetch across all pages.
    pub deadline: Duration,
    pub user_agent: String,
    pub accept_language: String,
    pub proxy: Option<String>,
}

impl TryFrom<&AppConfig> for FetchConfig {
    type Error = ScholarSnapError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let fetch = &config.fetch;
        let base_url = Url::parse(&fetch.base_url).map_err(|e| {
            ScholarSnapError::config(format!("invalid fetch.base_url '{}': {e}", fetch.base_url))
        })?;
        if fetch.page_size == 0 || fetch.max_pages == 0 {
            return Err(ScholarSnapError::config(
                "fetch.page_size and fetch.max_pages must be positive",
            ));
        }
        if fetch.deadline_secs == 0 {
            return Err(ScholarSnapError::config("fetch.deadline_secs must be positive"));
        }
        Ok(Self {
            base_url,
            page_size: fetch.page_size,
            max_pages: fetch.max_pages,
            request_delay: Duration::from_millis(fetch.request_delay_ms),
            timeout: Duration::from_secs(fetch.timeout_secs),
            deadline: Duration::from_secs(fetch.deadline_secs),
            user_agent: fetch.user_agent.clone(),
            accept_language: fetch.accept_language.clone(),
            proxy: fetch.proxy.clone(),
        })
    }
}

/// Runtime snapshot configuration.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Directory holding the snapshot and its artifacts.
    pub output_dir: PathBuf,
    /// Snapshot file name inside `output_dir`.
    pub file_name: String,
    /// Minimum accepted fraction of the previous total citation count.
    pub regression_floor: f64,
    /// Stable keys that may be dropped from published history.
    pub removed_keys: Vec<String>,
    /// Whether to write shields.io badge documents.
    pub shields: bool,
}

impl SnapshotConfig {
    /// Full path of the canonical snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.output_dir.join(&self.file_name)
    }
}

impl TryFrom<&AppConfig> for SnapshotConfig {
    type Error = ScholarSnapError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let s = &config.snapshot;
        if !(0.0..=1.0).contains(&s.regression_floor) {
            return Err(ScholarSnapError::config(format!(
                "snapshot.regression_floor must be within 0.0..=1.0, got {}",
                s.regression_floor
            )));
        }
        if s.file_name.is_empty() || s.file_name.contains(['/', '\\']) {
            return Err(ScholarSnapError::config(format!(
                "snapshot.file_name must be a plain file name, got '{}'",
                s.file_name
            )));
        }
        Ok(Self {
            output_dir: PathBuf::from(&s.output_dir),
            file_name: s.file_name.clone(),
            regression_floor: s.regression_floor,
            removed_keys: s.removed_keys.clone(),
            shields: s.shields,
        })
    }
}

// ---------------------------------------------------------------------------
// Profile id
// ---------------------------------------------------------------------------

/// A validated provider profile identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileId(String);

impl ProfileId {
    /// Validate a raw identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ScholarSnapError::config("profile id is empty"));
        }
        if !PROFILE_ID_RE.is_match(trimmed) {
            return Err(ScholarSnapError::config(format!(
                "profile id '{trimmed}' contains characters outside [A-Za-z0-9_-]"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the profile id: an explicit value wins, else the configured env var.
pub fn resolve_profile_id(config: &AppConfig, explicit: Option<&str>) -> Result<ProfileId> {
    if let Some(raw) = explicit {
        return ProfileId::parse(raw);
    }
    let var_name = &config.profile.id_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => ProfileId::parse(&val),
        _ => Err(ScholarSnapError::config(format!(
            "profile id not found. Pass --profile-id or set the {var_name} environment variable."
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the user config directory (`~/.scholarsnap/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ScholarSnapError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the user config file (`~/.scholarsnap/scholarsnap.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config. Returns defaults if no config file exists.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return load_config_from(path);
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return load_config_from(&local);
    }

    match config_file_path() {
        Ok(path) if path.exists() => load_config_from(&path),
        _ => {
            tracing::debug!("config file not found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ScholarSnapError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ScholarSnapError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Write a default config file at `path` (or the user config path).
/// Returns the path to the created file.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ScholarSnapError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ScholarSnapError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ScholarSnapError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
