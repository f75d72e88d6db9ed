use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dotenvy::dotenv;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, TextEncoder};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use firebridge_firebase::{FirebaseConfig, FirebaseStore, StateStore};
use firebridge_serial::{DeviceLink, SerialConfig, SerialLink};

mod config;
mod models;
mod reconciler;
mod services;
#[cfg(test)]
mod testing;

use config::BridgeConfig;
use models::CommandPayload;
use reconciler::ReconcileError;
use services::{run_poll_loop, BridgeService};

struct AppState<S, D> {
    bridge: BridgeService<S, D>,
}

impl<S: Clone, D> Clone for AppState<S, D> {
    fn clone(&self) -> Self {
        Self { bridge: self.bridge.clone() }
    }
}

pub(crate) struct Metrics {
    device_connected: IntGauge,
    ticks_total: IntCounter,
    dispatches_total: IntCounterVec, // label: command
    store_errors_total: IntCounter,
    malformed_records_total: IntCounter,
    device_errors_total: IntCounter,
}

impl Metrics {
    pub(crate) fn new() -> prometheus::Result<Arc<Self>> {
        let device_connected = IntGauge::new("firebridge_device_connected", "Serial device status (1 connected, 0 otherwise)")?;
        let ticks_total = IntCounter::new("firebridge_poll_ticks_total", "Total reads of the command record")?;
        let dispatches_total = IntCounterVec::new(
            prometheus::Opts::new("firebridge_dispatches_total", "Commands applied, by command"),
            &["command"],
        )?;
        let store_errors_total = IntCounter::new("firebridge_store_errors_total", "Failed requests to the realtime database")?;
        let malformed_records_total = IntCounter::new("firebridge_malformed_records_total", "Command records that could not be decoded")?;
        let device_errors_total = IntCounter::new("firebridge_device_errors_total", "Failed writes to the serial device")?;

        // Registration only fails for duplicates, e.g. when tests build several instances
        let registry = prometheus::default_registry();
        let _ = registry.register(Box::new(device_connected.clone()));
        let _ = registry.register(Box::new(ticks_total.clone()));
        let _ = registry.register(Box::new(dispatches_total.clone()));
        let _ = registry.register(Box::new(store_errors_total.clone()));
        let _ = registry.register(Box::new(malformed_records_total.clone()));
        let _ = registry.register(Box::new(device_errors_total.clone()));

        Ok(Arc::new(Self {
            device_connected,
            ticks_total,
            dispatches_total,
            store_errors_total,
            malformed_records_total,
            device_errors_total,
        }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let bridge_cfg = BridgeConfig::from_env();
    let serial_cfg = SerialConfig::from_env();
    let firebase_cfg = FirebaseConfig::from_env();

    info!(url = %firebase_cfg.database_url, "Configuring realtime database client");
    let store = FirebaseStore::new(firebase_cfg).context("failed to build database client")?;

    // A missing board is not fatal: the bridge keeps serving status and refuses dispatches
    let device = match SerialLink::open(&serial_cfg).await {
        Ok(link) => Some(link),
        Err(err) => {
            warn!(error = %err, "No serial device available; dispatch disabled");
            None
        }
    };

    let metrics = Metrics::new().context("failed to create metrics")?;
    let bridge: BridgeService<FirebaseStore, SerialLink> = BridgeService::new(store, device, serial_cfg.read, metrics);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let poller = tokio::spawn(run_poll_loop(bridge.clone(), bridge_cfg.poll_interval, shutdown_rx.clone()));
    let app = router(bridge);

    let listener = tokio::net::TcpListener::bind(&bridge_cfg.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", bridge_cfg.http_addr))?;
    info!(addr = %bridge_cfg.http_addr, "Starting HTTP server");

    let mut http_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = http_shutdown.changed().await;
        })
        .await
        .context("HTTP server failed")?;

    poller.await.context("poll loop panicked")?;
    info!("Bridge stopped");
    Ok(())
}

fn router<S, D>(bridge: BridgeService<S, D>) -> Router
where
    S: StateStore + Clone + 'static,
    D: DeviceLink + 'static,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz::<S, D>))
        .route("/version", get(version))
        .route("/metrics", get(metrics_handler))
        // Control API
        .route("/api/command", post(api_issue_command::<S, D>))
        .route("/api/response", get(api_get_response::<S, D>))
        .route("/api/status", get(api_get_status::<S, D>))
        .with_state(AppState { bridge })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=info,reqwest=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(?err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                warn!(?err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown requested");
}

async fn healthz() -> &'static str { "ok" }

async fn readyz<S, D>(State(state): State<AppState<S, D>>) -> StatusCode
where
    S: StateStore + Clone,
    D: DeviceLink,
{
    // Board must be attached and the database reachable
    let device_ok = state.bridge.is_connected().await;
    let store_ok = state.bridge.response().await.is_ok();
    if device_ok && store_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE }
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(?err, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())], buf).into_response()
}

// ----- Control API handlers -----

async fn api_issue_command<S, D>(State(state): State<AppState<S, D>>, Json(body): Json<CommandPayload>) -> Response
where
    S: StateStore + Clone,
    D: DeviceLink,
{
    if body.command.is_empty() {
        return (StatusCode::BAD_REQUEST, "command must not be empty").into_response();
    }
    match state.bridge.issue(&body.command).await {
        Ok(dispatch) => Json(dispatch).into_response(),
        Err(err @ ReconcileError::Disconnected(_)) => (StatusCode::CONFLICT, err.to_string()).into_response(),
        Err(err @ ReconcileError::Store(_)) => {
            tracing::warn!(error = %err, "Command could not be published");
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
        Err(err @ ReconcileError::Link(_)) => {
            tracing::error!(error = %err, "Command could not be sent to the device");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn api_get_response<S, D>(State(state): State<AppState<S, D>>) -> Response
where
    S: StateStore + Clone,
    D: DeviceLink,
{
    match state.bridge.response().await {
        Ok(record) => Json(record).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to read response record");
            (StatusCode::BAD_GATEWAY, "Failed to read response record").into_response()
        }
    }
}

async fn api_get_status<S, D>(State(state): State<AppState<S, D>>) -> Response
where
    S: StateStore + Clone,
    D: DeviceLink,
{
    Json(state.bridge.status().await).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use firebridge_core::{CommandRecord, LED_ON, UNKNOWN_COMMAND};
    use firebridge_serial::ReadPolicy;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::testing::{FakeDevice, FakeStore};

    fn app(store: &FakeStore, device: Option<&FakeDevice>) -> Router {
        let metrics = Metrics::new().unwrap();
        router(BridgeService::new(store.clone(), device.cloned(), ReadPolicy::default(), metrics))
    }

    fn post_command(command: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/command")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "command": command }).to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let store = FakeStore::default();
        let device = FakeDevice::default();
        let resp = app(&store, Some(&device)).oneshot(post_command("")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.command(), None);
    }

    #[tokio::test]
    async fn command_is_dispatched_and_summarized() {
        let store = FakeStore::default();
        let device = FakeDevice::default();
        let resp = app(&store, Some(&device)).oneshot(post_command("on")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({"command": "on", "sent": "1", "response": {"led": "LED is ON"}})
        );
        assert_eq!(device.sent(), vec![b'1']);
        assert_eq!(store.command(), Some(CommandRecord::new("on")));
    }

    #[tokio::test]
    async fn disconnected_device_answers_conflict() {
        let store = FakeStore::default();
        let resp = app(&store, None).oneshot(post_command("temp")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(store.updates().is_empty());
    }

    #[tokio::test]
    async fn store_failure_answers_bad_gateway() {
        let store = FakeStore::default();
        store.fail_writes(true);
        let device = FakeDevice::default();
        let resp = app(&store, Some(&device)).oneshot(post_command("on")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert!(device.sent().is_empty());
    }

    #[tokio::test]
    async fn status_reports_last_outcome() {
        let store = FakeStore::default();
        let device = FakeDevice::default();
        let app = app(&store, Some(&device));
        app.clone().oneshot(post_command("ON")).await.unwrap();

        let resp = app.oneshot(get_request("/api/status")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let status = body_json(resp).await;
        assert_eq!(status["connected"], json!(true));
        assert_eq!(status["port"], json!("fake0"));
        assert_eq!(status["last_executed"], json!("on"));
        assert_eq!(status["last_outcome"]["source"], json!("api"));
        assert_eq!(status["last_outcome"]["command"], json!("on"));
        assert_eq!(status["last_outcome"]["sent"], json!("1"));
        assert_eq!(status["last_outcome"]["response"]["led"], json!(LED_ON));
        assert!(status["last_outcome"]["at"].is_string());
        assert_eq!(status["last_error"], Value::Null);
    }

    #[tokio::test]
    async fn status_without_device_omits_port() {
        let store = FakeStore::default();
        let resp = app(&store, None).oneshot(get_request("/api/status")).await.unwrap();
        let status = body_json(resp).await;
        assert_eq!(status["connected"], json!(false));
        assert!(status.get("port").is_none());
        assert_eq!(status["last_executed"], Value::Null);
    }

    #[tokio::test]
    async fn response_record_is_returned_as_stored() {
        let store = FakeStore::default();
        let device = FakeDevice::default();
        let app = app(&store, Some(&device));
        app.clone().oneshot(post_command("blink")).await.unwrap();

        let resp = app.oneshot(get_request("/api/response")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({ "error": UNKNOWN_COMMAND })
        );
    }

    #[tokio::test]
    async fn unreadable_response_record_answers_bad_gateway() {
        let store = FakeStore::default();
        store.fail_reads(true);
        let resp = app(&store, None).oneshot(get_request("/api/response")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn readiness_needs_a_device() {
        let store = FakeStore::default();
        let device = FakeDevice::default();
        let resp = app(&store, None).oneshot(get_request("/readyz")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let resp = app(&store, Some(&device)).oneshot(get_request("/readyz")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
