//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Report, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use scholarsnap_core::pipeline::{ProgressReporter, RunConfig, RunResult, run_with_http};
use scholarsnap_crawler::{RetryPolicy, is_block_page, parse_page};
use scholarsnap_shared::{
    AppConfig, FetchConfig, ScholarSnapError, SnapshotConfig, init_config, load_config,
    resolve_profile_id,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// scholarsnap: publish citation profile snapshots as versioned JSON.
#[derive(Parser)]
#[command(
    name = "scholarsnap",
    version,
    about = "Scrape a citation profile and publish a stable, diffable JSON snapshot.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ./scholarsnap.toml, then ~/.scholarsnap/scholarsnap.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch the profile, merge with the previous snapshot, and persist it.
    Run {
        /// Profile id (defaults to the env var named by `profile.id_env`).
        #[arg(long)]
        profile_id: Option<String>,

        /// Output directory for the snapshot and badges.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Hard limit on listing pages fetched.
        #[arg(long)]
        max_pages: Option<u32>,

        /// Skip shields.io badge files.
        #[arg(long)]
        no_shields: bool,
    },

    /// Parse a saved profile page and print what was extracted.
    Parse {
        /// HTML file saved from the profile listing.
        file: PathBuf,
    },

    /// Check that a persisted snapshot is internally consistent.
    Verify {
        /// Snapshot file (defaults to the configured snapshot path).
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "scholarsnap=info",
        1 => "scholarsnap=debug",
        _ => "scholarsnap=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Exit status
// ---------------------------------------------------------------------------

/// Exit code for a failed command: the error category when there is one, else 1.
pub(crate) fn exit_code(report: &Report) -> u8 {
    report
        .chain()
        .find_map(|e| e.downcast_ref::<ScholarSnapError>())
        .map_or(1, |e| e.category().exit_code())
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            profile_id,
            out,
            max_pages,
            no_shields,
        } => {
            cmd_run(
                config_path,
                profile_id.as_deref(),
                out,
                max_pages,
                no_shields,
            )
            .await
        }
        Command::Parse { file } => cmd_parse(&file),
        Command::Verify { path } => cmd_verify(config_path, path),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    profile_id: Option<&str>,
    out: Option<PathBuf>,
    max_pages: Option<u32>,
    no_shields: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(out) = out {
        config.snapshot.output_dir = out.to_string_lossy().into_owned();
    }
    if let Some(max_pages) = max_pages {
        config.fetch.max_pages = max_pages;
    }
    if no_shields {
        config.snapshot.shields = false;
    }

    // All configuration is validated before any request goes out.
    let profile_id = resolve_profile_id(&config, profile_id)?;
    let fetch = FetchConfig::try_from(&config)?;
    let snapshot = SnapshotConfig::try_from(&config)?;
    let policy = RetryPolicy::from(&config.retry);

    info!(
        %profile_id,
        out = %snapshot.output_dir.display(),
        max_pages = fetch.max_pages,
        proxy = fetch.proxy.is_some(),
        "starting snapshot run"
    );

    let run_config = RunConfig {
        profile_id,
        snapshot,
    };
    let reporter = CliProgress::new();
    let result = run_with_http(&run_config, fetch, policy, &reporter).await;
    reporter.spinner.finish_and_clear();
    let result = result?;

    println!();
    println!("  Snapshot published.");
    println!("  Path:         {}", result.snapshot_path.display());
    println!("  Pages:        {}", result.pages);
    println!(
        "  Publications: {} ({} fetched)",
        result.publications, result.fetched
    );
    println!("  Citations:    {}", result.total_citations);
    println!("  h-index:      {}", result.h_index);
    println!("  i10-index:    {}", result.i10_index);
    if !result.warnings.is_empty() {
        println!("  Warnings:");
        for w in &result.warnings {
            println!("    - {w}");
        }
    }
    if result.truncated {
        println!("  Note: listing truncated at the page limit");
    }
    println!("  Time:         {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_parse(file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file).map_err(|e| ScholarSnapError::io(file, e))?;
    if is_block_page(&raw) {
        warn!(file = %file.display(), "file looks like a captcha interstitial");
    }

    let page = parse_page(&raw)?;
    info!(
        rows = page.rows,
        publications = page.publications.len(),
        "parsed file"
    );

    let output = serde_json::json!({
        "summary": page.summary,
        "rows": page.rows,
        "publications": page.publications,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn cmd_verify(config_path: Option<&Path>, path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => {
            let config = load_config(config_path)?;
            SnapshotConfig::try_from(&config)?.snapshot_path()
        }
    };

    let report = scholarsnap_core::verify::verify(&path)?;

    println!(
        "{}: ok ({} publications, {} citations, h-index {}, i10-index {}, profile {})",
        report.path.display(),
        report.publications,
        report.total_citations,
        report.h_index,
        report.i10_index,
        report.profile_id
    );
    Ok(())
}

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = init_config(config_path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config: AppConfig = load_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid progress template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_parsed(&self, current: usize, total: usize, publications: usize) {
        self.spinner.set_message(format!(
            "Parsing [{current}/{total}] {publications} publications"
        ));
    }

    fn done(&self, _result: &RunResult) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use color_eyre::eyre::eyre;
    use scholarsnap_shared::FetchErrorKind;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "scholarsnap",
            "-v",
            "run",
            "--profile-id",
            "AAAAAAAAAAAJ",
            "--out",
            "public",
            "--max-pages",
            "3",
            "--no-shields",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Run {
                profile_id,
                out,
                max_pages,
                no_shields,
            } => {
                assert_eq!(profile_id.as_deref(), Some("AAAAAAAAAAAJ"));
                assert_eq!(out, Some(PathBuf::from("public")));
                assert_eq!(max_pages, Some(3));
                assert!(no_shields);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn exit_codes_follow_error_category() {
        let cases = [
            (ScholarSnapError::config("x"), 2),
            (ScholarSnapError::fetch(FetchErrorKind::Blocked, "x"), 3),
            (ScholarSnapError::structural_mismatch("x"), 4),
            (ScholarSnapError::validation("x"), 5),
            (
                ScholarSnapError::io("/tmp/x", std::io::Error::other("x")),
                6,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(exit_code(&Report::new(err)), code);
        }
        assert_eq!(exit_code(&eyre!("something else")), 1);
    }

    #[test]
    fn wrapped_errors_keep_their_code() {
        use color_eyre::eyre::WrapErr;
        let err: std::result::Result<(), ScholarSnapError> =
            Err(ScholarSnapError::validation("regressed"));
        let report = err.wrap_err("run failed").unwrap_err();
        assert_eq!(exit_code(&report), 5);
    }
}
