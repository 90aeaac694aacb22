//! Web server implementation

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use testpilot_common::{EnvStore, EnvironmentUpsert, Error, ReportStore, TestRegistry};
use testpilot_runner::{RunCoordinator, RunnerConfig};

/// Web server configuration
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Root of the report archive
    pub reports_dir: PathBuf,

    /// Persisted environment list
    pub envs_file: PathBuf,

    /// How the external runner is launched. Its freshly generated HTML
    /// report is expected at `<work_dir>/playwright-report`.
    pub runner: RunnerConfig,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("reports"),
            envs_file: PathBuf::from("environments.json"),
            runner: RunnerConfig::default(),
        }
    }
}

/// Web server state
#[derive(Clone)]
pub struct WebServer {
    state: Arc<AppState>,
}

struct AppState {
    registry: Arc<TestRegistry>,
    coordinator: RunCoordinator,
    reports: ReportStore,
    envs: EnvStore,
    /// One run at a time: a second run request while one is active is
    /// rejected up front instead of queued
    run_gate: Arc<Semaphore>,
    reports_dir: PathBuf,
}

impl WebServer {
    pub fn new(config: WebServerConfig) -> Self {
        let registry = Arc::new(TestRegistry::builtin());
        let reports = ReportStore::new(
            &config.reports_dir,
            config.runner.work_dir.join("playwright-report"),
        );
        let coordinator =
            RunCoordinator::new(registry.clone(), reports.clone(), config.runner.clone());

        Self {
            state: Arc::new(AppState {
                registry,
                coordinator,
                reports,
                envs: EnvStore::new(&config.envs_file),
                run_gate: Arc::new(Semaphore::new(1)),
                reports_dir: config.reports_dir,
            }),
        }
    }

    /// Create router
    pub fn router(&self) -> Router {
        Router::new()
            // Run endpoint: SSE stream of run lifecycle events
            .route("/api/run", get(run_handler))

            // Test registry listing
            .route("/api/tests", get(list_tests_handler))

            // Archived report history
            .route("/api/reports", get(list_reports_handler))
            .route("/api/reports/:report_id", delete(delete_report_handler))

            // Target environments
            .route(
                "/api/environments",
                get(list_environments_handler).post(create_environment_handler),
            )
            .route(
                "/api/environments/:env_id",
                put(update_environment_handler).delete(delete_environment_handler),
            )

            // Liveness
            .route("/api/health", get(health_handler))

            // Archived bundles (HTML reports) served as-is
            .nest_service("/reports", ServeDir::new(&self.state.reports_dir))

            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("TestPilot server starting on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RunParams {
    #[serde(default)]
    ids: Option<String>,
    #[serde(default)]
    vars: Option<String>,
}

/// `GET /api/run?ids=1,2,3&vars={"KEY":"value"}` -> SSE event stream.
///
/// Dropping the connection cancels the run. The one-permit gate travels
/// inside the stream, so it releases when the stream is closed or the
/// client disconnects.
async fn run_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunParams>,
) -> Response {
    let ids = parse_ids(params.ids.as_deref().unwrap_or(""));
    let vars = params
        .vars
        .as_deref()
        .map(parse_vars)
        .unwrap_or_default();

    let Ok(permit) = state.run_gate.clone().try_acquire_owned() else {
        return error_response(StatusCode::CONFLICT, "a run is already in progress");
    };

    let rx = state.coordinator.start_run(ids, vars);
    let stream = ReceiverStream::new(rx).map(move |event| {
        let _held = &permit;
        Ok::<Event, Infallible>(
            Event::default().data(serde_json::to_string(&event).unwrap_or_default()),
        )
    });

    Sse::new(stream).into_response()
}

async fn list_tests_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.all().to_vec())
}

async fn list_reports_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.reports.list())
}

async fn delete_report_handler(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> Response {
    match state.reports.delete(&report_id) {
        Ok(true) => Json(serde_json::json!({"ok": true})).into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "report not found"),
        Err(Error::InvalidReportId(_)) => {
            error_response(StatusCode::BAD_REQUEST, "invalid report id")
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn list_environments_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.envs.load())
}

async fn create_environment_handler(
    State(state): State<Arc<AppState>>,
    Json(upsert): Json<EnvironmentUpsert>,
) -> Response {
    match state.envs.add(upsert) {
        Ok(env) => (StatusCode::CREATED, Json(env)).into_response(),
        Err(Error::InvalidInput(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn update_environment_handler(
    State(state): State<Arc<AppState>>,
    Path(env_id): Path<String>,
    Json(upsert): Json<EnvironmentUpsert>,
) -> Response {
    match state.envs.update(&env_id, upsert) {
        Ok(env) => Json(env).into_response(),
        Err(Error::NotFound { .. }) => error_response(StatusCode::NOT_FOUND, "environment not found"),
        Err(Error::InvalidInput(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn delete_environment_handler(
    State(state): State<Arc<AppState>>,
    Path(env_id): Path<String>,
) -> Response {
    match state.envs.remove(&env_id) {
        Ok(()) => Json(serde_json::json!({"ok": true})).into_response(),
        Err(Error::NotFound { .. }) => error_response(StatusCode::NOT_FOUND, "environment not found"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "testpilot-web",
        "version": testpilot_common::VERSION,
    }))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({"error": message}))).into_response()
}

/// Parse the CSV id list. Malformed or zero tokens are dropped; unknown ids
/// are kept and handled downstream as placeholders.
fn parse_ids(raw: &str) -> Vec<u32> {
    raw.split(',')
        .filter_map(|token| token.trim().parse::<u32>().ok())
        .filter(|&id| id != 0)
        .collect()
}

/// Parse the `vars` payload. Anything but a flat string-to-string object is
/// ignored and treated as "no overrides".
fn parse_vars(raw: &str) -> HashMap<String, String> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_server(tmp: &TempDir) -> WebServer {
        WebServer::new(WebServerConfig {
            reports_dir: tmp.path().join("reports"),
            envs_file: tmp.path().join("environments.json"),
            runner: RunnerConfig {
                command: "sh".to_string(),
                base_args: vec!["-c".to_string(), "sleep 2".to_string()],
                work_dir: tmp.path().to_path_buf(),
                ..Default::default()
            },
        })
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_parse_ids_drops_malformed_tokens() {
        assert_eq!(parse_ids("1,2,3"), vec![1, 2, 3]);
        assert_eq!(parse_ids("1, oops,3,0,-4"), vec![1, 3]);
        assert_eq!(parse_ids(""), Vec::<u32>::new());
    }

    #[test]
    fn test_parse_vars_ignores_malformed_payload() {
        let vars = parse_vars(r#"{"SEARCH_QUERY":"El Quijote"}"#);
        assert_eq!(vars.get("SEARCH_QUERY").map(String::as_str), Some("El Quijote"));

        assert!(parse_vars("not json").is_empty());
        assert!(parse_vars(r#"{"nested":{"x":1}}"#).is_empty());
        assert!(parse_vars("[1,2,3]").is_empty());
    }

    #[tokio::test]
    async fn test_health_and_listings_respond() {
        let tmp = TempDir::new().unwrap();
        let app = test_server(&tmp).router();

        for uri in ["/api/health", "/api/tests", "/api/reports", "/api/environments"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "GET {}", uri);
        }
    }

    #[tokio::test]
    async fn test_delete_report_validates_before_storage() {
        let tmp = TempDir::new().unwrap();
        let app = test_server(&tmp).router();

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/reports/not-a-timestamp")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        // The rejected delete must not create the archive root
        assert!(!tmp.path().join("reports").exists());

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/reports/2026-01-01_00-00-00")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_second_concurrent_run_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let app = test_server(&tmp).router();

        let first = app.clone().oneshot(get("/api/run?ids=1")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        // While the first stream is open, a second run is refused
        let second = app.clone().oneshot(get("/api/run?ids=1")).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);

        // Releasing the first stream frees the gate
        drop(first);
        let third = app.clone().oneshot(get("/api/run?ids=1")).await.unwrap();
        assert_eq!(third.status(), StatusCode::OK);
    }
}
