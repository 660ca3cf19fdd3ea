#![allow(dead_code)] // Test helpers appear unused when compiled independently

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use injector::config::Config;
use injector::{build_router, AppState, ServiceRecord};
use reqwest::Client;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const WAIT_ATTEMPTS: usize = 50;
const WAIT_DELAY: Duration = Duration::from_millis(100);

/// Body returned by the mock downstream service.
pub const MOCK_SERVICE_BODY: &str = "hello from the mock service";

#[derive(Clone)]
struct ServiceState {
    hits: Arc<AtomicUsize>,
}

pub struct MockService {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    hits: Arc<AtomicUsize>,
}

impl MockService {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

/// Find an available TCP port
pub async fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Best-effort check for whether binding to loopback is permitted in the current sandbox.
pub async fn can_bind_loopback() -> bool {
    match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => false,
        Err(_) => true, // treat other errors as non-fatal for skipping
    }
}

/// Spawn a downstream service that answers `GET /` and `/health`.
/// `GET /fail` returns 503. `POST /services` refuses every record with 400,
/// so the service can also stand in for a registry that rejects input.
pub async fn spawn_mock_service(port: u16) -> (MockService, String) {
    let state = ServiceState {
        hits: Arc::new(AtomicUsize::new(0)),
    };
    let hits = state.hits.clone();

    let app = Router::new()
        .route("/", get(service_root))
        .route("/fail", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route(
            "/services",
            post(|| async { (StatusCode::BAD_REQUEST, "address not allowed") }),
        )
        .route("/health", get(|| async { "ok" }))
        .with_state(state);

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("failed to bind mock service listener");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(err) = server.await {
            eprintln!("mock service server error: {}", err);
        }
    });

    (
        MockService {
            shutdown_tx,
            handle,
            hits,
        },
        format!("http://127.0.0.1:{}", port),
    )
}

async fn service_root(State(state): State<ServiceState>) -> &'static str {
    state.hits.fetch_add(1, Ordering::SeqCst);
    MOCK_SERVICE_BODY
}

/// Start an injector with the given config on a free port, return its base URL.
pub async fn spawn_injector(config: Config) -> String {
    let state = AppState::from_config(&config).expect("failed to build app state");
    let app = build_router(state);

    let port = free_port().await;
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("failed to bind injector listener");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{}", port)
}

/// Config with an in-memory registry seeded with `services`.
pub fn config_with(services: Vec<ServiceRecord>, targets: &[&str]) -> Config {
    Config {
        targets: targets.iter().map(|t| t.to_string()).collect(),
        services,
        forward_timeout_ms: 2000,
        ..Config::default()
    }
}

/// Current epoch millis as the invoke payload expects it.
pub fn invoke_body() -> String {
    format!(
        r#"{{"message": "{}"}}"#,
        chrono::Utc::now().timestamp_millis()
    )
}

/// Wait for a server to respond to /health
pub async fn wait_for_health(client: &Client, base_url: &str) {
    poll_until(|| async {
        client
            .get(format!("{}/health", base_url))
            .send()
            .await
            .ok()
            .map(|_| ())
    })
    .await
    .unwrap_or_else(|| panic!("timed out waiting for {} to be healthy", base_url));
}

async fn poll_until<T, F, Fut>(mut f: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for _ in 0..WAIT_ATTEMPTS {
        if let Some(result) = f().await {
            return Some(result);
        }
        tokio::time::sleep(WAIT_DELAY).await;
    }
    None
}
