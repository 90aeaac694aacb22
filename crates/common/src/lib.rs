//! TestPilot Common Library
//!
//! Shared types and stores for the TestPilot dashboard: the static test
//! registry, the report archive, and the environment list.

pub mod envs;
pub mod error;
pub mod registry;
pub mod report;

// Re-export commonly used types
pub use envs::{EnvStore, Environment, EnvironmentUpsert};
pub use error::{Error, Result};
pub use registry::{InputKind, TestDescriptor, TestRegistry, TestVariable};
pub use report::{ReportEntry, ReportRecord, ReportStore, RunResult, NO_DURATION};

/// TestPilot version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
