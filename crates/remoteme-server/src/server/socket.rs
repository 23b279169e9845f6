//! WebSocket connection handler.
//!
//! Each connection runs three pieces:
//! - a reader loop decoding client frames,
//! - a writer task serializing `ServerEvent`s onto the socket,
//! - a command worker draining the connection's FIFO and running each
//!   command through the executor, one at a time.
//!
//! Commands on one connection are serialized so their result streams never
//! interleave. Rejected requests go through the same queue so their
//! `command_exit` stays in order. `stop_command` bypasses the queue and is
//! only acknowledged. Every received command runs even if the client has
//! disconnected; only delivery of its events stops.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use remoteme_core::protocol::{ClientEvent, CommandRequest, FeedbackKind, ProtocolError, ServerEvent};

use super::AppState;
use crate::executor::FALLBACK_EXIT_CODE;
use crate::registry::Connection;

/// Capacity of the per-connection outbound event channel.
const EVENT_BUFFER: usize = 64;

/// Work item on a connection's command queue.
#[derive(Debug)]
enum Job {
    Run(CommandRequest),
    Reject(String),
}

/// `GET /ws`: upgrade to the dispatch protocol.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

/// Drive one client connection until it closes.
pub async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let conn = state.registry.register(peer).await;
    let (mut sink, mut stream) = socket.split();
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(EVENT_BUFFER);

    let client_id = conn.id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let frame = match event.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(client_id = %client_id, error = %e, "Failed to encode event");
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                debug!(client_id = %client_id, "Socket closed while sending");
                break;
            }
        }
    });

    if event_tx.send(ServerEvent::confirmed(conn.id.clone())).await.is_err() {
        warn!(client_id = %conn.id, "Connection closed before confirmation");
    }

    let (command_tx, command_rx) = mpsc::unbounded_channel::<Job>();
    let worker = tokio::spawn(run_commands(
        Arc::clone(&conn),
        state.clone(),
        command_rx,
        event_tx.clone(),
    ));

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(client_id = %conn.id, error = %e, "WebSocket receive error");
                break;
            }
        };

        match ClientEvent::parse(text.as_str()) {
            Ok(ClientEvent::RunCursorCommand(request)) => {
                info!(
                    client_id = %conn.id,
                    mode = %request.mode,
                    command = %request.message,
                    "Command received"
                );
                if command_tx.send(Job::Run(request)).is_err() {
                    warn!(client_id = %conn.id, "Command worker stopped");
                    break;
                }
            }
            Ok(ClientEvent::StopCommand) => {
                info!(
                    client_id = %conn.id,
                    running = conn.in_flight().is_some(),
                    "Stop command requested"
                );
                send(
                    &event_tx,
                    ServerEvent::feedback(FeedbackKind::Info, "Command stop requested"),
                )
                .await;
            }
            Err(ProtocolError::InvalidCommand(reason)) => {
                warn!(client_id = %conn.id, %reason, "Rejected command request");
                if command_tx.send(Job::Reject(reason)).is_err() {
                    warn!(client_id = %conn.id, "Command worker stopped");
                    break;
                }
            }
            Err(e) => {
                warn!(client_id = %conn.id, error = %e, "Ignoring client frame");
            }
        }
    }

    state.registry.unregister(&conn.id).await;
    info!(client_id = %conn.id, peer = %peer, "Client disconnected");

    // The worker keeps draining the queue on its own; its events are
    // dropped once the writer is gone.
    drop(command_tx);
    drop(event_tx);
    writer.abort();
    drop(worker);
}

/// Run queued commands for one connection, in arrival order.
async fn run_commands(
    conn: Arc<Connection>,
    state: AppState,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    events: mpsc::Sender<ServerEvent>,
) {
    while let Some(job) = jobs.recv().await {
        if events.is_closed() {
            debug!(client_id = %conn.id, "Running queued command for disconnected client");
        }
        match job {
            Job::Run(request) => {
                let exit_code = state
                    .executor
                    .execute(&request, &events, |handle| conn.begin_execution(handle))
                    .await;
                conn.finish_execution();
                debug!(client_id = %conn.id, exit_code, "Command completed");
            }
            Job::Reject(reason) => {
                send(
                    &events,
                    ServerEvent::feedback(
                        FeedbackKind::Error,
                        format!("Invalid command request: {reason}"),
                    ),
                )
                .await;
                send(&events, ServerEvent::exit(FALLBACK_EXIT_CODE)).await;
            }
        }
    }
}

async fn send(events: &mpsc::Sender<ServerEvent>, event: ServerEvent) {
    if events.send(event).await.is_err() {
        debug!("Event channel closed");
    }
}
