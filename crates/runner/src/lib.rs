//! TestPilot run coordination
//!
//! This crate owns one run of the external test runner:
//! - resolves requested logical test ids against the static registry
//! - batches them into a single combined `--grep` filter so one subprocess
//!   (and one generated report) covers the whole request
//! - streams the subprocess's merged stdout/stderr as leveled line events
//! - reconstructs per-test verdicts from the accumulated output
//! - archives the results and report bundle on the way out
//!
//! Consumers receive the run as an ordered stream of [`RunEvent`]s ending in
//! a terminal `done` event. Dropping the receiver cancels the run: the
//! subprocess is killed and nothing is archived.

pub mod coordinator;
pub mod output;
pub mod parse;

pub use coordinator::{combined_grep, RunCoordinator, RunEvent, RunnerConfig};
pub use output::{classify_line, strip_ansi, LineLevel};
pub use parse::parse_results;
