//! Error types for scholarsnap.
//!
//! Library crates use [`ScholarSnapError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` and maps [`ErrorCategory`] to an exit code.

use std::path::PathBuf;

/// Terminal failure kinds of the fetch stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Connection, timeout, or server errors that outlived the retry ceiling.
    Network,
    /// The provider answered 429 and kept doing so after the cooldown.
    RateLimited,
    /// The profile does not exist.
    NotFound,
    /// The provider served a captcha/forbidden page instead of the profile.
    Blocked,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::RateLimited => "rate limited",
            Self::NotFound => "not found",
            Self::Blocked => "blocked",
        };
        f.write_str(s)
    }
}

/// Failure kinds of the parse stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The page's top-level container is missing; the provider layout changed.
    StructuralMismatch,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StructuralMismatch => f.write_str("structural mismatch"),
        }
    }
}

/// Top-level error type for all scholarsnap operations.
#[derive(Debug, thiserror::Error)]
pub enum ScholarSnapError {
    /// Configuration loading or validation error. Raised before any network I/O.
    #[error("config error: {message}")]
    Config { message: String },

    /// Terminal fetch failure (retries already exhausted).
    #[error("fetch error ({kind}): {message}")]
    Fetch {
        kind: FetchErrorKind,
        message: String,
    },

    /// Markup could not be mapped onto the expected structure.
    #[error("parse error ({kind}): {message}")]
    Parse {
        kind: ParseErrorKind,
        message: String,
    },

    /// New data failed a sanity check; previously published data was kept.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScholarSnapError>;

/// Coarse failure category reported to the scheduler through the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Network,
    Parse,
    Validation,
    Io,
}

impl ErrorCategory {
    /// Process exit code for this category. `0` and `1` are never returned.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Config => 2,
            Self::Network => 3,
            Self::Parse => 4,
            Self::Validation => 5,
            Self::Io => 6,
        }
    }
}

impl ScholarSnapError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a fetch error of the given kind.
    pub fn fetch(kind: FetchErrorKind, msg: impl Into<String>) -> Self {
        Self::Fetch {
            kind,
            message: msg.into(),
        }
    }

    /// Create a structural-mismatch parse error.
    pub fn structural_mismatch(msg: impl Into<String>) -> Self {
        Self::Parse {
            kind: ParseErrorKind::StructuralMismatch,
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The category used for exit-status reporting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::Config,
            Self::Fetch { .. } => ErrorCategory::Network,
            Self::Parse { .. } => ErrorCategory::Parse,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Io { .. } => ErrorCategory::Io,
        }
    }

    /// The fetch kind, if this is a fetch error.
    pub fn fetch_kind(&self) -> Option<FetchErrorKind> {
        match self {
            Self::Fetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
