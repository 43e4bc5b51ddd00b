//! WebSocket front end
//!
//! Every `/ws` connection gets its own [`Session`]. Frames are JSON text
//! carrying [`ClientEvent`]s in and [`ServerEvent`]s out.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use codeplay::{ClientEvent, Config, ServerEvent, Session, event_channel};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
}

#[derive(Serialize)]
struct LanguageInfo {
    id: String,
    name: String,
    compiled: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub fn router(config: Arc<Config>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/languages", get(languages_handler))
        .route(
            "/health",
            get(|| async {
                Json(HealthResponse {
                    status: "healthy",
                    version: env!("CARGO_PKG_VERSION"),
                })
            }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { config })
}

/// Serve until Ctrl-C
pub async fn serve(config: Config, bind: SocketAddr) -> Result<()> {
    tokio::fs::create_dir_all(&config.workspace_root)
        .await
        .with_context(|| {
            format!(
                "failed to create workspace root '{}'",
                config.workspace_root.display()
            )
        })?;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(addr = %bind, languages = config.languages.len(), "listening");

    axum::serve(listener, router(Arc::new(config)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn languages_handler(State(state): State<AppState>) -> Json<Vec<LanguageInfo>> {
    let languages = state
        .config
        .language_ids()
        .into_iter()
        .filter_map(|id| {
            let language = state.config.languages.get(id)?;
            Some(LanguageInfo {
                id: id.to_string(),
                name: language.name.clone(),
                compiled: language.is_compiled(),
            })
        })
        .collect();
    Json(languages)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.config))
}

async fn handle_socket(socket: WebSocket, config: Arc<Config>) {
    let (tx, mut rx) = event_channel(config.event_buffer);
    let session = match Session::open(config, tx).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "failed to open session");
            return;
        }
    };
    let session_id = session.id().to_string();

    let (mut sink, mut stream) = socket.split();

    let forward = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "failed to encode event");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
            if matches!(event, ServerEvent::TermStop { .. }) {
                debug!("run ended");
            }
        }
    });

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                debug!(session = %session_id, error = %e, "socket error");
                break;
            }
        };

        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => session.handle(event).await,
                Err(e) => warn!(session = %session_id, error = %e, "ignoring malformed event"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // receiver goes first so the final stop event never waits on a dead client
    forward.abort();
    if let Err(e) = forward.await {
        if !e.is_cancelled() {
            warn!(session = %session_id, error = %e, "event forwarder failed");
        }
    }
    session.close().await;
    info!(session = %session_id, "client disconnected");
}
