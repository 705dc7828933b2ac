//! Profile fetching and markup parsing.
//!
//! This crate provides:
//! - [`parser`]: pure extraction of publications and summary figures from profile markup
//! - [`engine`]: the sequential, paginating [`Fetcher`]
//! - [`retry`]: the [`RetryPolicy`] applied to every request
//! - [`transport`]: the [`Transport`] / [`Sleeper`] seams and their real implementations

pub mod engine;
pub mod parser;
pub mod retry;
pub mod transport;

pub use engine::{FetchOutcome, FetchedPage, Fetcher};
pub use parser::{Field, ParsedPage, is_block_page, parse, parse_page, parse_summary};
pub use retry::{RetryPolicy, jitter_sample};
pub use transport::{HttpTransport, RawResponse, Sleeper, TokioSleeper, Transport, TransportError};
