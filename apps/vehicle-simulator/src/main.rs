//! Rover Vehicle Simulator
//!
//! Stand-in for the embedded controller: accepts the operator's control link
//! over WebSocket, applies records to simulated actuators, and serves the
//! camera endpoint the operator derives from the same host.

mod vehicle;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    Json, Router,
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use control_link::{CAMERA_PATH, DEFAULT_CAMERA_PORT, DEFAULT_CONTROL_PORT};
use control_protocol::{ControlMessage, decode};
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::vehicle::VehicleState;

const CONTROL_PORT_ENV: &str = "ROVER_CONTROL_PORT";
const CAMERA_PORT_ENV: &str = "ROVER_CAMERA_PORT";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vehicle_simulator=debug".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    info!("Starting Rover Vehicle Simulator");

    let ports = Ports::from_lookup(|name| std::env::var(name).ok())?;
    let state = AppState::new();

    let control_addr = SocketAddr::from(([0, 0, 0, 0], ports.control));
    let control_listener = tokio::net::TcpListener::bind(control_addr).await?;
    info!("Control link on ws://{}", control_addr);

    let control = control_router(state, ports.shared())
        .into_make_service_with_connect_info::<SocketAddr>();

    if ports.shared() {
        info!("Camera on http://{}{}", control_addr, CAMERA_PATH);
        axum::serve(control_listener, control).await?;
        return Ok(());
    }

    let camera_addr = SocketAddr::from(([0, 0, 0, 0], ports.camera));
    let camera_listener = tokio::net::TcpListener::bind(camera_addr).await?;
    info!("Camera on http://{}{}", camera_addr, CAMERA_PATH);

    tokio::try_join!(
        axum::serve(control_listener, control).into_future(),
        axum::serve(camera_listener, camera_router()).into_future(),
    )?;

    Ok(())
}

/// Listening ports.
///
/// Setting only the control port puts the camera on it too, the layout an
/// operator endpoint with an explicit `host:port` expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ports {
    control: u16,
    camera: u16,
}

impl Ports {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let parse = |name: &str| -> anyhow::Result<Option<u16>> {
            lookup(name)
                .map(|text| {
                    text.trim()
                        .parse::<u16>()
                        .map_err(|e| anyhow::anyhow!("{name}={text:?} is not a port: {e}"))
                })
                .transpose()
        };

        let ports = match (parse(CONTROL_PORT_ENV)?, parse(CAMERA_PORT_ENV)?) {
            (None, None) => Self {
                control: DEFAULT_CONTROL_PORT,
                camera: DEFAULT_CAMERA_PORT,
            },
            (Some(control), None) => Self {
                control,
                camera: control,
            },
            (None, Some(camera)) => Self {
                control: DEFAULT_CONTROL_PORT,
                camera,
            },
            (Some(control), Some(camera)) => Self { control, camera },
        };
        Ok(ports)
    }

    fn shared(&self) -> bool {
        self.control == self.camera
    }
}

fn control_router(state: AppState, with_camera: bool) -> Router {
    let router = Router::new()
        .route("/", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler));

    let router = if with_camera {
        router.route(CAMERA_PATH, get(camera_handler))
    } else {
        router
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn camera_router() -> Router {
    Router::new()
        .route(CAMERA_PATH, get(camera_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Application state
#[derive(Clone)]
struct AppState {
    vehicle: Arc<Mutex<VehicleState>>,
    /// Connected operators: client id -> remote address
    clients: Arc<DashMap<u64, SocketAddr>>,
    next_client: Arc<AtomicU64>,
}

impl AppState {
    fn new() -> Self {
        Self {
            vehicle: Arc::new(Mutex::new(VehicleState::new())),
            clients: Arc::new(DashMap::new()),
            next_client: Arc::new(AtomicU64::new(1)),
        }
    }
}

#[derive(Serialize)]
struct StatusReport {
    clients: usize,
    vehicle: VehicleState,
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusReport> {
    Json(StatusReport {
        clients: state.clients.len(),
        vehicle: state.vehicle.lock().clone(),
    })
}

// No camera hardware behind the simulator
async fn camera_handler() -> Response {
    warn!("Camera stream requested but camera not available");
    (StatusCode::SERVICE_UNAVAILABLE, "Camera not available").into_response()
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, addr, state))
}

/// Handle one operator connection
async fn handle_websocket(mut socket: WebSocket, addr: SocketAddr, state: AppState) {
    let client_id = state.next_client.fetch_add(1, Ordering::Relaxed);
    state.clients.insert(client_id, addr);
    info!("Client {} connected from {}", client_id, addr);

    while let Some(result) = socket.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => {
                debug!("Ignoring {} byte binary frame", data.len());
                continue;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!("WebSocket error: {}", e);
                break;
            }
        };

        match decode(text.as_str()) {
            Ok(decoded) => {
                if let ControlMessage::Unrecognized { kind } = &decoded.message {
                    debug!("Unhandled record type {:?}", kind);
                    continue;
                }
                state.vehicle.lock().apply(&decoded);
            }
            Err(e) => warn!("Invalid record from client {}: {}", client_id, e),
        }
    }

    state.clients.remove(&client_id);
    state.vehicle.lock().safe_state();
    info!("Client {} disconnected, actuators reset", client_id);
}
