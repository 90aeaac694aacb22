//! TestPilot Dashboard Server
//!
//! Serves the run API: selects logical tests, streams live runner progress
//! over SSE, and exposes the archived report history.

pub mod server;

pub use server::{WebServer, WebServerConfig};
