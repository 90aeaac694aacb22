//! Runner output classification
//!
//! The external runner writes a free-form textual stream. Lines are
//! ANSI-stripped and bucketed into coarse levels so the dashboard can color
//! them without understanding the reporter format.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Severity bucket for one output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineLevel {
    Success,
    Error,
    Warn,
    Info,
    Normal,
}

static ANSI_CSI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid regex"));
static ANSI_BARE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b[^\[]").expect("valid regex"));

static SUCCESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)passed|\u{2713}|\u{2714}|\bok\b").expect("valid regex"));
static ERROR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)failed|\u{2718}|\u{d7}|error").expect("valid regex"));
static WARN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)warn|\u{26a0}").expect("valid regex"));
static INFO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)running|\u{25b6}|worker").expect("valid regex"));

/// Remove terminal control sequences (cursor moves, colors) from a chunk
pub fn strip_ansi(text: &str) -> String {
    let stripped = ANSI_CSI_RE.replace_all(text, "");
    ANSI_BARE_RE.replace_all(&stripped, "").into_owned()
}

/// Bucket a line by its markers. Success markers win over failure markers,
/// matching how the reporter writes verdict lines.
pub fn classify_line(text: &str) -> LineLevel {
    if SUCCESS_RE.is_match(text) {
        LineLevel::Success
    } else if ERROR_RE.is_match(text) {
        LineLevel::Error
    } else if WARN_RE.is_match(text) {
        LineLevel::Warn
    } else if INFO_RE.is_match(text) {
        LineLevel::Info
    } else {
        LineLevel::Normal
    }
}
