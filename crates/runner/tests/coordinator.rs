//! End-to-end coordinator tests against a stub runner command
//!
//! The runner command is configurable, so these tests substitute small
//! shell scripts for Playwright and assert on the emitted event stream and
//! the archive side effects.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use testpilot_common::{ReportStore, TestRegistry, NO_DURATION};
use testpilot_runner::{LineLevel, RunCoordinator, RunEvent, RunnerConfig};

fn stub_coordinator(tmp: &TempDir, command: &str, script: &str) -> RunCoordinator {
    let reports = tmp.path().join("reports");
    let html_source = tmp.path().join("playwright-report");
    let config = RunnerConfig {
        command: command.to_string(),
        // Everything the coordinator appends lands in $0.. and is ignored
        base_args: vec!["-c".to_string(), script.to_string()],
        work_dir: tmp.path().to_path_buf(),
        ..Default::default()
    };
    RunCoordinator::new(
        Arc::new(TestRegistry::builtin()),
        ReportStore::new(reports, html_source),
        config,
    )
}

fn store_for(tmp: &TempDir) -> ReportStore {
    ReportStore::new(tmp.path().join("reports"), tmp.path().join("playwright-report"))
}

async fn collect(mut rx: mpsc::Receiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn starts(events: &[RunEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Start { id, .. } => Some(*id),
            _ => None,
        })
        .collect()
}

fn results(events: &[RunEvent]) -> Vec<(u32, bool, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Result {
                id,
                passed,
                duration,
            } => Some((*id, *passed, duration.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn unknown_ids_only_launch_nothing() {
    let tmp = TempDir::new().unwrap();
    // A broken command proves no subprocess is attempted
    let coordinator = stub_coordinator(&tmp, "/definitely/not/a/runner", "");

    let events = collect(coordinator.start_run(vec![99, 100], HashMap::new())).await;

    assert!(matches!(
        &events[0],
        RunEvent::Line { text, level: LineLevel::Warn } if text.contains("[99, 100]")
    ));
    assert!(matches!(
        events.last(),
        Some(RunEvent::Done { results, total_ms: 0, report_id: None }) if results.is_empty()
    ));
    // No spawn error surfaced, nothing archived
    assert!(!events
        .iter()
        .any(|e| matches!(e, RunEvent::Line { level: LineLevel::Error, .. })));
    assert!(store_for(&tmp).list().is_empty());
}

#[tokio::test]
async fn passing_run_streams_and_archives() {
    let tmp = TempDir::new().unwrap();
    let script = "printf '  \u{2713}  1 [chromium] \u{203a} search.spec.ts \u{203a} searching by title (3.2s)\n  1 passed (4.1s)\n'";
    let coordinator = stub_coordinator(&tmp, "sh", script);

    let events = collect(coordinator.start_run(vec![1], HashMap::new())).await;

    // Start precedes every subprocess line; done is terminal
    assert!(matches!(events[0], RunEvent::Start { id: 1, .. }));
    assert_eq!(starts(&events), vec![1]);
    assert_eq!(
        results(&events),
        vec![(1, true, "3.2s".to_string())]
    );
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::Line { text, level: LineLevel::Success } if text.contains("searching by title")
    )));

    let Some(RunEvent::Done {
        results: done_results,
        report_id,
        ..
    }) = events.last()
    else {
        panic!("missing done event");
    };
    assert_eq!(done_results.len(), 1);
    let report_id = report_id.clone().expect("run should be archived");

    let listed = store_for(&tmp).list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, report_id);
    assert!(listed[0].all_passed);
    assert!(!listed[0].has_html);
    assert_eq!(listed[0].results[0].label, "Search by book title");
}

#[tokio::test]
async fn mixed_known_and_unknown_ids() {
    let tmp = TempDir::new().unwrap();
    let script = "printf '  \u{2713}  1 [chromium] \u{203a} searching by title (2.0s)\n  \u{2718}  2 [chromium] \u{203a} invalid credentials error (1.5s)\n'";
    let coordinator = stub_coordinator(&tmp, "sh", script);

    let events = collect(coordinator.start_run(vec![1, 2, 99], HashMap::new())).await;

    let placeholder_lines: Vec<_> = events
        .iter()
        .filter(|e| {
            matches!(e, RunEvent::Line { text, level: LineLevel::Warn } if text.contains("99"))
        })
        .collect();
    assert_eq!(placeholder_lines.len(), 1);

    assert_eq!(starts(&events), vec![1, 2]);
    assert_eq!(
        results(&events),
        vec![
            (1, true, "2.0s".to_string()),
            (2, false, "1.5s".to_string())
        ]
    );
}

#[tokio::test]
async fn launch_failure_reports_and_terminates() {
    let tmp = TempDir::new().unwrap();
    let coordinator = stub_coordinator(&tmp, "/definitely/not/a/runner", "");

    let events = collect(coordinator.start_run(vec![1], HashMap::new())).await;

    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::Line { text, level: LineLevel::Error } if text.contains("Process error")
    )));
    assert!(matches!(
        events.last(),
        Some(RunEvent::Done { results, report_id: None, .. }) if results.is_empty()
    ));
    assert!(store_for(&tmp).list().is_empty());
}

#[tokio::test]
async fn unmatched_output_falls_back_to_exit_code() {
    let tmp = TempDir::new().unwrap();
    let script = "echo 'reporter format nobody promised'; exit 1";
    let coordinator = stub_coordinator(&tmp, "sh", script);

    let events = collect(coordinator.start_run(vec![2], HashMap::new())).await;

    assert_eq!(
        results(&events),
        vec![(2, false, NO_DURATION.to_string())]
    );
    // Summary line reflects the failure
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::Line { text, level: LineLevel::Error } if text.contains("0/1 passed")
    )));
    // Failed runs still archive
    let listed = store_for(&tmp).list();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].all_passed);
}

#[tokio::test]
async fn disconnect_kills_runner_and_skips_archive() {
    let tmp = TempDir::new().unwrap();
    let coordinator = stub_coordinator(&tmp, "sh", "sleep 5");

    let mut rx = coordinator.start_run(vec![1], HashMap::new());
    // Wait for the run to be underway, then walk away
    let first = rx.recv().await;
    assert!(matches!(first, Some(RunEvent::Start { id: 1, .. })));
    drop(rx);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(store_for(&tmp).list().is_empty());
    let reports_dir = tmp.path().join("reports");
    let archived: Vec<PathBuf> = reports_dir
        .read_dir()
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    assert!(archived.is_empty());
}

#[tokio::test]
async fn run_variables_reach_the_subprocess() {
    let tmp = TempDir::new().unwrap();
    // The stub echoes the variable back as a verdict line for test 1
    let script = "printf '  \u{2713}  searching by title for %s (1.0s)\n' \"$SEARCH_QUERY\"";
    let coordinator = stub_coordinator(&tmp, "sh", script);

    let mut vars = HashMap::new();
    vars.insert("SEARCH_QUERY".to_string(), "Don Quijote".to_string());
    let events = collect(coordinator.start_run(vec![1], vars)).await;

    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::Line { text, .. } if text.contains("Don Quijote")
    )));
    assert_eq!(results(&events), vec![(1, true, "1.0s".to_string())]);
}
