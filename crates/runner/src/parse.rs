//! Per-test verdict reconstruction
//!
//! The reporter's line format is not contractually stable, so verdicts are
//! recovered with an ordered chain of strategies, first conclusive wins:
//!
//! 1. The first output line that matches the test's own grep expression and
//!    carries an explicit pass/fail glyph. The grep doubles as the
//!    line-attribution key, the same expression that filtered the run.
//! 2. The subprocess exit code, with the duration recovered from the
//!    reporter's trailing summary line when one exists.
//!
//! The chain never fails: exactly one result per known test comes out, in
//! request order, no matter how mangled the output is.

use once_cell::sync::Lazy;
use regex::Regex;

use testpilot_common::{RunResult, TestDescriptor, NO_DURATION};

/// Pass glyphs the list reporter prints on a verdict line
static PASS_MARK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{2713}\u{2714}]").expect("valid regex"));
/// Fail glyphs
static FAIL_MARK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{2718}\u{d7}]").expect("valid regex"));
/// Trailing parenthesised duration token, e.g. "... (3.2s)"
static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]+)\)\s*$").expect("valid regex"));
/// Suite summary, e.g. "1 passed (8.2s)" or "2 failed, 1 passed (12s)"
static SUMMARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\s+(?:passed|failed)[^(]*\(([^)]+)\)").expect("valid regex"));

/// Recover one verdict per known test from the accumulated runner output
pub fn parse_results(raw: &str, known: &[&TestDescriptor], exit_ok: bool) -> Vec<RunResult> {
    let lines: Vec<&str> = raw.lines().collect();
    known
        .iter()
        .map(|desc| {
            let (passed, duration) = marker_line_verdict(&lines, &desc.grep)
                .unwrap_or_else(|| exit_code_verdict(&lines, exit_ok));
            RunResult {
                id: desc.id,
                passed,
                duration: duration.unwrap_or_else(|| NO_DURATION.to_string()),
            }
        })
        .collect()
}

/// Strategy 1: first line matching the grep with an explicit verdict glyph
fn marker_line_verdict(lines: &[&str], grep: &str) -> Option<(bool, Option<String>)> {
    // A selector that doesn't compile can't attribute lines; fall through
    let grep_re = Regex::new(grep).ok()?;

    for line in lines {
        if !grep_re.is_match(line) {
            continue;
        }
        let is_passed = PASS_MARK_RE.is_match(line);
        let is_failed = FAIL_MARK_RE.is_match(line);
        if is_passed || is_failed {
            let duration = DURATION_RE
                .captures(line)
                .map(|c| c[1].to_string());
            return Some((is_passed, duration));
        }
    }
    None
}

/// Strategy 2: trust the exit code, scavenge a duration from the summary
fn exit_code_verdict(lines: &[&str], exit_ok: bool) -> (bool, Option<String>) {
    let duration = lines
        .iter()
        .find_map(|line| SUMMARY_RE.captures(line).map(|c| c[1].to_string()));
    (exit_ok, duration)
}
