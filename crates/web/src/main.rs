use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::info;

use testpilot_runner::RunnerConfig;
use testpilot_web::{WebServer, WebServerConfig};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let addr: SocketAddr = env_or("TESTPILOT_ADDR", "127.0.0.1:3001").parse()?;

    // Where the Playwright project lives; the runner is launched from here
    // and leaves its HTML report at <project>/playwright-report
    let project_dir = PathBuf::from(env_or("TESTPILOT_PROJECT_DIR", "."));
    let reports_dir = PathBuf::from(env_or("TESTPILOT_REPORTS_DIR", "reports"));
    let envs_file = PathBuf::from(env_or("TESTPILOT_ENVS_FILE", "environments.json"));

    let config = WebServerConfig {
        reports_dir,
        envs_file,
        runner: RunnerConfig {
            command: env_or("TESTPILOT_RUNNER", "npx"),
            work_dir: project_dir,
            ..Default::default()
        },
    };

    info!("TestPilot server is running");
    info!("  API run  ->  http://{}/api/run?ids=3", addr);
    info!("  Reports  ->  http://{}/api/reports", addr);

    WebServer::new(config).serve(addr).await
}
