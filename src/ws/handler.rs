//! WebSocket upgrade handler

use std::fmt::Display;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::util::rate_limit::SessionRateLimiter;
use crate::ws::protocol::ClientMsg;
use crate::ws::registry::OutboundRx;
use crate::ws::session;

/// Refuse new connections once the player cap is reached.
///
/// Runs before the upgrade extractor so the client gets a plain 503.
pub async fn require_capacity(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let connected = state.sessions.len();
    if connected >= state.config.max_players {
        warn!(connected, max_players = state.config.max_players, "Server full, rejecting connection");
        return (StatusCode::SERVICE_UNAVAILABLE, "Server full").into_response();
    }
    next.run(req).await
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sink, ws_stream) = socket.split();
    run_session(state, ws_sink, ws_stream).await;
}

/// Drive one session from open to close over any message transport.
///
/// A writer task drains the session's outbound queue into `sink` while this
/// task reads `stream` until it fails, ends, or yields a frame that is not an
/// envelope.
pub async fn run_session<S, R, E>(state: AppState, sink: S, stream: R)
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let session = session::open(&state);
    let player_id = session.id;

    let writer_handle = tokio::spawn(write_loop(player_id.clone(), sink, session.outbound));

    read_loop(&state, &player_id, stream).await;

    writer_handle.abort();
    session::close(&state, &player_id);
}

/// Outbound queue -> socket
async fn write_loop<S>(player_id: String, mut sink: S, mut outbound: OutboundRx)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
            debug!(player_id = %player_id, error = %e, "WebSocket send failed");
            return;
        }
    }
    // Queue closed: the session was unregistered
    let _ = sink.close().await;
}

/// Socket -> state store
async fn read_loop<R, E>(state: &AppState, player_id: &str, mut stream: R)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let rate_limiter = SessionRateLimiter::new(state.config.input_rate_limit);

    while let Some(result) = stream.next().await {
        let parsed = match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }
                ClientMsg::parse(&text)
            }
            Ok(Message::Binary(bytes)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }
                ClientMsg::parse_slice(&bytes)
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        };

        match parsed {
            Ok(msg) => session::dispatch(state, player_id, msg),
            Err(e) if e.is_fatal() => {
                warn!(player_id = %player_id, error = %e, "Unreadable frame, closing session");
                break;
            }
            Err(e) => {
                debug!(player_id = %player_id, error = %e, "Ignoring client message");
            }
        }
    }
}
