use crate::advisor::AdvisorSession;
use crate::config::Config;
use axum::{
    Router,
    extract::State,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
    routing::get,
};
use rehearse_core::advisory::{ClientMessage, ServerMessage};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub interview_duration: Duration,
    pub tick_interval: Duration,
}

impl From<&Config> for AppState {
    fn from(config: &Config) -> Self {
        Self {
            interview_duration: config.interview_duration,
            tick_interval: config.tick_interval,
        }
    }
}

/// Builds the Axum router with the `/ws` advisory endpoint.
pub fn router(state: AppState) -> Router {
    // The interview client may run from a browser on another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_all(socket: &mut WebSocket, messages: Vec<ServerMessage>) -> bool {
    for message in messages {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("failed to serialize advisor message: {}", e);
                continue;
            }
        };
        if socket.send(Message::Text(json.into())).await.is_err() {
            return false;
        }
    }
    true
}

/// Runs one advisory connection until the client goes away.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("WebSocket connection established");
    let mut advisor = AdvisorSession::new(state.interview_duration);
    let mut ticker = tokio::time::interval(state.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        let replies = tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(message) => advisor.handle(message, Instant::now()),
                    Err(e) => {
                        tracing::warn!("malformed client message: {}", e);
                        vec![ServerMessage::Error {
                            message: format!("malformed message: {e}"),
                        }]
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    info!("WebSocket error: {}", e);
                    break;
                }
            },
            _ = ticker.tick() => advisor.tick(Instant::now()),
        };
        if !send_all(&mut socket, replies).await {
            break;
        }
    }

    info!("WebSocket connection closed");
}
