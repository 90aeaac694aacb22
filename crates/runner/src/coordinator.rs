//! Run coordination: one request, one subprocess, one report

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use testpilot_common::{ReportStore, RunResult, TestRegistry};

use crate::output::{classify_line, strip_ansi, LineLevel};
use crate::parse::parse_results;

const RULE_WIDTH: usize = 56;

/// One event on a run's push channel. Serializes to the dashboard wire
/// format, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RunEvent {
    Line {
        text: String,
        level: LineLevel,
    },
    Start {
        id: u32,
        label: String,
    },
    Result {
        id: u32,
        passed: bool,
        duration: String,
    },
    Done {
        results: Vec<RunResult>,
        #[serde(rename = "reportId", skip_serializing_if = "Option::is_none")]
        report_id: Option<String>,
        #[serde(rename = "totalMs")]
        total_ms: u64,
    },
}

/// Configuration for launching the external runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Program used to launch the runner
    pub command: String,

    /// Arguments placed before the generated flags
    pub base_args: Vec<String>,

    /// Browser project the runner targets
    pub project: String,

    /// Reporter mode: a line-oriented stream plus an HTML bundle
    pub reporter: String,

    /// Directory the runner is launched from (holds its config and specs)
    pub work_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: "npx".to_string(),
            base_args: vec!["playwright".to_string(), "test".to_string()],
            project: "chromium".to_string(),
            reporter: "list,html".to_string(),
            work_dir: PathBuf::from("."),
        }
    }
}

/// Compose one filter expression covering every requested test, so a single
/// runner invocation (and a single generated report) satisfies the request.
/// A lone selector is used verbatim; several become an alternation.
pub fn combined_grep<'a, I>(greps: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let parts: Vec<&str> = greps.into_iter().collect();
    match parts.as_slice() {
        [] => String::new(),
        [single] => (*single).to_string(),
        many => format!("({})", many.join("|")),
    }
}

/// Maps run requests onto single combined runner invocations and streams
/// their lifecycle as [`RunEvent`]s.
#[derive(Clone)]
pub struct RunCoordinator {
    registry: Arc<TestRegistry>,
    store: ReportStore,
    config: RunnerConfig,
}

impl RunCoordinator {
    pub fn new(registry: Arc<TestRegistry>, store: ReportStore, config: RunnerConfig) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    pub fn registry(&self) -> &TestRegistry {
        &self.registry
    }

    /// Start one run. Events arrive on the returned channel in emission
    /// order, ending with a terminal `done`. Dropping the receiver cancels
    /// the run: the subprocess is killed and nothing is archived.
    pub fn start_run(
        &self,
        ids: Vec<u32>,
        vars: HashMap<String, String>,
    ) -> mpsc::Receiver<RunEvent> {
        let (tx, rx) = mpsc::channel(64);
        let registry = self.registry.clone();
        let store = self.store.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            run_task(registry, store, config, ids, vars, tx).await;
        });

        rx
    }
}

async fn run_task(
    registry: Arc<TestRegistry>,
    store: ReportStore,
    config: RunnerConfig,
    ids: Vec<u32>,
    vars: HashMap<String, String>,
    tx: mpsc::Sender<RunEvent>,
) {
    let started = Instant::now();
    let (known, unknown) = registry.resolve(&ids);

    if !unknown.is_empty() {
        let list = unknown
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let event = RunEvent::Line {
            text: format!("\u{26a0}  Tests [{}] are placeholders, skipping.", list),
            level: LineLevel::Warn,
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }

    if known.is_empty() {
        let _ = tx
            .send(RunEvent::Line {
                text: "No runnable tests selected.".to_string(),
                level: LineLevel::Warn,
            })
            .await;
        let _ = tx
            .send(RunEvent::Done {
                results: Vec::new(),
                report_id: None,
                total_ms: 0,
            })
            .await;
        return;
    }

    // Let the client render every requested row as pending before any
    // subprocess output can arrive
    for desc in &known {
        let event = RunEvent::Start {
            id: desc.id,
            label: desc.label.clone(),
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }

    let grep = combined_grep(known.iter().map(|d| d.grep.as_str()));
    info!("Running {} test(s), grep: {}", known.len(), grep);

    let banner = format!(
        "\u{25b6}  Running {} test{}\u{2026}\n{}",
        known.len(),
        if known.len() > 1 { "s" } else { "" },
        "\u{2500}".repeat(RULE_WIDTH)
    );
    if tx
        .send(RunEvent::Line {
            text: banner,
            level: LineLevel::Info,
        })
        .await
        .is_err()
    {
        return;
    }

    let mut cmd = Command::new(&config.command);
    cmd.args(&config.base_args)
        .arg(format!("--grep={}", grep))
        .arg(format!("--project={}", config.project))
        .arg(format!("--reporter={}", config.reporter))
        .current_dir(&config.work_dir)
        .env("FORCE_COLOR", "0")
        .envs(&vars)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Runner command: {:?}", cmd);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to spawn runner: {}", e);
            let _ = tx
                .send(RunEvent::Line {
                    text: format!("Process error: {}", e),
                    level: LineLevel::Error,
                })
                .await;
            let _ = tx
                .send(RunEvent::Done {
                    results: Vec::new(),
                    report_id: None,
                    total_ms: 0,
                })
                .await;
            return;
        }
    };

    // Merge stdout and stderr into one ordered line stream
    let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, line_tx.clone()));
    }
    drop(line_tx);

    let mut full_output = String::new();
    loop {
        tokio::select! {
            maybe_line = line_rx.recv() => {
                let Some(line) = maybe_line else {
                    break; // both pipes closed
                };
                let text = strip_ansi(&line);
                full_output.push_str(&text);
                full_output.push('\n');
                if text.trim().is_empty() {
                    continue;
                }
                let level = classify_line(&text);
                if tx.send(RunEvent::Line { text, level }).await.is_err() {
                    cancel(&mut child).await;
                    return;
                }
            }
            _ = tx.closed() => {
                cancel(&mut child).await;
                return;
            }
        }
    }

    let exit_ok = match child.wait().await {
        Ok(status) => status.success(),
        Err(e) => {
            warn!("Failed to reap runner: {}", e);
            false
        }
    };

    let results = parse_results(&full_output, &known, exit_ok);

    for result in &results {
        let event = RunEvent::Result {
            id: result.id,
            passed: result.passed,
            duration: result.duration.clone(),
        };
        if tx.send(event).await.is_err() {
            return;
        }
    }

    let pass_count = results.iter().filter(|r| r.passed).count();
    let summary = RunEvent::Line {
        text: format!(
            "{}\n{}/{} passed",
            "\u{2500}".repeat(RULE_WIDTH),
            pass_count,
            results.len()
        ),
        level: if pass_count == results.len() {
            LineLevel::Success
        } else {
            LineLevel::Error
        },
    };
    if tx.send(summary).await.is_err() {
        return;
    }

    let total_ms = elapsed_ms(started);
    let report_id = match store.archive(&results, total_ms, &registry) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("Failed to archive report: {}", e);
            None
        }
    };

    let _ = tx
        .send(RunEvent::Done {
            results,
            report_id,
            total_ms,
        })
        .await;
}

/// Client went away: kill the runner immediately. The run archives nothing.
async fn cancel(child: &mut Child) {
    info!("Client disconnected, killing runner");
    let _ = child.kill().await;
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
