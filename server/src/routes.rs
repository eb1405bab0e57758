use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use badge_common::{
    Command, ENDPOINT_BUTTON, ENDPOINT_CONFIRM_COMMAND, ENDPOINT_GET_CREDENTIALS, ENDPOINT_KNOB,
    ENDPOINT_POLL_COMMANDS, ENDPOINT_SWITCH,
};

use crate::state::{BadgeRegistry, InputKind};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Mutex<BadgeRegistry>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct Ack {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct EventBody {
    data: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    queued: String,
    #[serde(rename = "queueLength")]
    queue_length: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(&route(ENDPOINT_GET_CREDENTIALS), get(handle_get_credentials))
        .route(&route(ENDPOINT_POLL_COMMANDS), get(handle_poll_commands))
        .route(&route(ENDPOINT_CONFIRM_COMMAND), get(handle_confirm_command))
        .route(&route(ENDPOINT_KNOB), post(handle_knob))
        .route(&route(ENDPOINT_BUTTON), post(handle_button))
        .route(&route(ENDPOINT_SWITCH), post(handle_switch))
        .route("/api/provision", post(handle_provision))
        .route("/api/commands", post(handle_enqueue_command))
        .route("/api/status", get(handle_get_status))
        .route("/api/events", get(handle_get_events))
        .route("/api/confirmations", get(handle_get_confirmations))
        .with_state(state)
}

fn route(endpoint: &str) -> String {
    format!("/{endpoint}")
}

async fn handle_get_credentials(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry.lock().await;
    match registry.credentials() {
        Some(credentials) => {
            info!("credentials requested");
            Json(credentials.clone()).into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "device not provisioned"),
    }
}

async fn handle_poll_commands(State(state): State<AppState>) -> impl IntoResponse {
    let next = state.registry.lock().await.next_command(Utc::now());
    match next {
        Some(command) => {
            info!("dispatching `{}`", command.name());
            Json(command).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn handle_confirm_command(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(command) = params.get("command") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'command' parameter");
    };

    state.registry.lock().await.confirm(command, Utc::now());
    info!("badge confirmed `{command}`");
    Json(Ack {
        status: "confirmed",
    })
    .into_response()
}

async fn handle_knob(
    State(state): State<AppState>,
    Json(body): Json<EventBody>,
) -> impl IntoResponse {
    record(&state, InputKind::Knob, body).await
}

async fn handle_button(
    State(state): State<AppState>,
    Json(body): Json<EventBody>,
) -> impl IntoResponse {
    record(&state, InputKind::Button, body).await
}

async fn handle_switch(
    State(state): State<AppState>,
    Json(body): Json<EventBody>,
) -> impl IntoResponse {
    record(&state, InputKind::Switch, body).await
}

async fn record(state: &AppState, kind: InputKind, body: EventBody) -> axum::response::Response {
    info!("{kind:?} event: {}", body.data);
    state
        .registry
        .lock()
        .await
        .record_event(kind, body.data, Utc::now());
    Json(Ack { status: "ok" }).into_response()
}

async fn handle_provision(State(state): State<AppState>) -> impl IntoResponse {
    let mut registry = state.registry.lock().await;
    let credentials = registry.provision(Utc::now()).clone();
    info!("badge provisioned");
    Json(credentials)
}

async fn handle_enqueue_command(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let command = Command::parse(&body.to_string());
    let name = command.name().to_string();

    match state.registry.lock().await.enqueue(command) {
        Ok(queue_length) => {
            info!("queued `{name}` ({queue_length} pending)");
            Json(EnqueueResponse {
                queued: name,
                queue_length,
            })
            .into_response()
        }
        Err(err) => {
            warn!("rejected command: {err}");
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.lock().await.status())
}

async fn handle_get_events(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.lock().await.events())
}

async fn handle_get_confirmations(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.lock().await.confirmations())
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
