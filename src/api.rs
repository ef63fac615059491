//! HTTP API for controlling the reader from scripts and `headline-ctl`.
//!
//! Every mutating route is a fire-and-forget post into the service's command
//! queue; `/status` reads the last published report.
//! Runs on 127.0.0.1:8768 (configurable) using axum.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::command::{Command, PlaybackCommand};
use crate::gesture::GestureEvent;
use crate::service::{ServiceHandle, StatusReport};

#[derive(Deserialize)]
struct HeadlinesRequest {
    headlines: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct QueuedResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueuedResponse {
    fn queued(command: &str) -> Self {
        Self {
            status: "queued".into(),
            command: Some(command.into()),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            command: None,
            error: Some(message.into()),
        }
    }
}

/// Build the axum router.
pub fn router(service: ServiceHandle) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/start", post(handle_start))
        .route("/toggle", post(handle_toggle))
        .route("/next", post(handle_next))
        .route("/previous", post(handle_previous))
        .route("/stop", post(handle_stop))
        .route("/headlines", post(handle_append).delete(handle_clear))
        .route("/bubble/pointer", post(handle_pointer))
        .route("/overlay/request", post(handle_request_overlay))
        .with_state(service)
}

/// Start the API server as a background tokio task.
pub async fn start_api(service: ServiceHandle, port: u16) -> Result<(), String> {
    let app = router(service);
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind API on {addr}: {e}"))?;
    info!("API server listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("API server error: {e}");
        }
    });
    Ok(())
}

// --- Handlers ---

async fn handle_status(State(service): State<ServiceHandle>) -> Json<StatusReport> {
    Json(service.status())
}

fn queue_playback(service: &ServiceHandle, command: PlaybackCommand) -> Json<QueuedResponse> {
    service.post(command);
    Json(QueuedResponse::queued(command.name()))
}

async fn handle_start(State(service): State<ServiceHandle>) -> Json<QueuedResponse> {
    queue_playback(&service, PlaybackCommand::Start)
}

async fn handle_toggle(State(service): State<ServiceHandle>) -> Json<QueuedResponse> {
    queue_playback(&service, PlaybackCommand::Toggle)
}

async fn handle_next(State(service): State<ServiceHandle>) -> Json<QueuedResponse> {
    queue_playback(&service, PlaybackCommand::Next)
}

async fn handle_previous(State(service): State<ServiceHandle>) -> Json<QueuedResponse> {
    queue_playback(&service, PlaybackCommand::Previous)
}

async fn handle_stop(State(service): State<ServiceHandle>) -> Json<QueuedResponse> {
    queue_playback(&service, PlaybackCommand::Stop)
}

async fn handle_append(
    State(service): State<ServiceHandle>,
    Json(req): Json<HeadlinesRequest>,
) -> Json<QueuedResponse> {
    let headlines: Vec<String> = req
        .headlines
        .into_iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect();
    if headlines.is_empty() {
        return Json(QueuedResponse::err("no headlines"));
    }
    service.post(Command::AppendHeadlines(headlines));
    Json(QueuedResponse::queued("append"))
}

async fn handle_clear(State(service): State<ServiceHandle>) -> Json<QueuedResponse> {
    service.post(Command::ClearHeadlines);
    Json(QueuedResponse::queued("clear"))
}

async fn handle_pointer(
    State(service): State<ServiceHandle>,
    Json(event): Json<GestureEvent>,
) -> Json<QueuedResponse> {
    service.post(Command::Pointer(event));
    Json(QueuedResponse::queued("pointer"))
}

async fn handle_request_overlay(State(service): State<ServiceHandle>) -> Json<QueuedResponse> {
    service.post(Command::RequestOverlay);
    Json(QueuedResponse::queued("request_overlay"))
}
