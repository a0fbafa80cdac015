//! Compiled regex patterns for tolerant parsing of transcript content.

use once_cell::sync::Lazy;
use regex::Regex;

/// Recovers a record's timestamp without a full JSON parse. Used as a
/// fallback when a transcript line fails to parse structurally (e.g. read
/// mid-flush by a concurrent writer).
pub static RE_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""timestamp":"(\d{4}-\d{2}-\d{2}T[^"]+)""#).unwrap());
