#![allow(clippy::unwrap_used, clippy::panic)] // Integration tests use unwrap for brevity

//! End-to-end tests of the WebSocket dispatch protocol against a real
//! listener.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use remoteme_core::config::ExecutorConfig;
use remoteme_core::protocol::{ClientEvent, CommandRequest, Feedback, FeedbackKind, Mode, ServerEvent};
use remoteme_core::ServerConfig;
use remoteme_server::{AppState, Server};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    dir: tempfile::TempDir,
}

async fn start() -> TestServer {
    let dir = tempfile::TempDir::new().unwrap();
    let config = ServerConfig {
        port: 0,
        project_root: dir.path().to_path_buf(),
        executor: ExecutorConfig {
            shell: PathBuf::from("sh"),
            ..ExecutorConfig::default()
        },
        ..ServerConfig::default()
    };
    let server = Server::new(config);
    let state = server.state().clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.run(listener, std::future::pending()));
    TestServer {
        addr,
        state,
        dir,
    }
}

async fn connect(server: &TestServer) -> (Client, String) {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.addr))
        .await
        .unwrap();
    match next_event(&mut ws).await {
        ServerEvent::ConnectionConfirmed(confirmed) => (ws, confirmed.client_id),
        other => panic!("expected connection_confirmed, got {other:?}"),
    }
}

async fn next_event(ws: &mut Client) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(EVENT_TIMEOUT, ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn next_feedback(ws: &mut Client) -> Feedback {
    match next_event(ws).await {
        ServerEvent::CommandFeedback(feedback) => feedback,
        other => panic!("expected command_feedback, got {other:?}"),
    }
}

async fn next_exit(ws: &mut Client) -> i32 {
    match next_event(ws).await {
        ServerEvent::CommandExit(code) => code,
        other => panic!("expected command_exit, got {other:?}"),
    }
}

async fn send_raw(ws: &mut Client, frame: &str) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

async fn wait_for_file(path: &Path) {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !path.exists() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} was never created",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn run(ws: &mut Client, message: &str, mode: Mode) {
    let frame = ClientEvent::RunCursorCommand(CommandRequest::new(message, mode)).to_frame();
    send_raw(ws, &frame).await;
}

#[tokio::test]
async fn connect_confirms_and_registers_client() {
    let server = start().await;
    let (_ws, client_id) = connect(&server).await;

    assert!(!client_id.is_empty());
    assert!(server.state.registry.is_connected(&client_id).await);
}

#[tokio::test]
async fn echo_hi_returns_output_then_zero() {
    let server = start().await;
    let (mut ws, _) = connect(&server).await;

    run(&mut ws, "echo hi", Mode::Terminal).await;

    let feedback = next_feedback(&mut ws).await;
    assert_eq!(feedback.kind, FeedbackKind::TerminalOutput);
    assert_eq!(feedback.message, "hi\n");
    assert_eq!(next_exit(&mut ws).await, 0);
}

#[tokio::test]
async fn exit_7_returns_error_then_7() {
    let server = start().await;
    let (mut ws, _) = connect(&server).await;

    run(&mut ws, "exit 7", Mode::Terminal).await;

    assert_eq!(next_feedback(&mut ws).await.kind, FeedbackKind::Error);
    assert_eq!(next_exit(&mut ws).await, 7);
}

#[tokio::test]
async fn unknown_or_missing_mode_runs_in_terminal() {
    let server = start().await;
    let (mut ws, _) = connect(&server).await;

    send_raw(
        &mut ws,
        r#"{"event":"run_cursor_command","data":{"message":"echo a","mode":"zsh"}}"#,
    )
    .await;
    let feedback = next_feedback(&mut ws).await;
    assert_eq!(feedback.kind, FeedbackKind::TerminalOutput);
    assert_eq!(feedback.message, "a\n");
    assert_eq!(next_exit(&mut ws).await, 0);

    send_raw(
        &mut ws,
        r#"{"event":"run_cursor_command","data":{"message":"echo b"}}"#,
    )
    .await;
    let feedback = next_feedback(&mut ws).await;
    assert_eq!(feedback.kind, FeedbackKind::TerminalOutput);
    assert_eq!(feedback.message, "b\n");
    assert_eq!(next_exit(&mut ws).await, 0);
}

#[tokio::test]
async fn malformed_request_is_rejected_with_exit_1() {
    let server = start().await;
    let (mut ws, _) = connect(&server).await;

    send_raw(
        &mut ws,
        r#"{"event":"run_cursor_command","data":{"mode":"Terminal"}}"#,
    )
    .await;

    let feedback = next_feedback(&mut ws).await;
    assert_eq!(feedback.kind, FeedbackKind::Error);
    assert!(feedback.message.contains("missing `message`"));
    assert_eq!(next_exit(&mut ws).await, 1);
}

#[tokio::test]
async fn stop_is_acknowledged_only() {
    let server = start().await;
    let (mut ws, _) = connect(&server).await;

    send_raw(&mut ws, r#"{"event":"stop_command"}"#).await;
    let ack = next_feedback(&mut ws).await;
    assert_eq!(ack.kind, FeedbackKind::Info);
    assert_eq!(ack.message, "Command stop requested");

    // No exit event follows the acknowledgement.
    run(&mut ws, "echo after", Mode::Terminal).await;
    let feedback = next_feedback(&mut ws).await;
    assert_eq!(feedback.message, "after\n");
    assert_eq!(next_exit(&mut ws).await, 0);
}

#[tokio::test]
async fn unknown_events_and_garbage_are_ignored() {
    let server = start().await;
    let (mut ws, _) = connect(&server).await;

    send_raw(&mut ws, r#"{"event":"ping","data":{}}"#).await;
    send_raw(&mut ws, "definitely not json").await;
    run(&mut ws, "echo still-here", Mode::Terminal).await;

    let feedback = next_feedback(&mut ws).await;
    assert_eq!(feedback.message, "still-here\n");
    assert_eq!(next_exit(&mut ws).await, 0);
}

#[tokio::test]
async fn back_to_back_commands_do_not_interleave() {
    let server = start().await;
    let (mut ws, _) = connect(&server).await;

    run(&mut ws, "sleep 0.5; echo first", Mode::Terminal).await;
    run(&mut ws, "echo second", Mode::Terminal).await;

    assert_eq!(next_feedback(&mut ws).await.message, "first\n");
    assert_eq!(next_exit(&mut ws).await, 0);
    assert_eq!(next_feedback(&mut ws).await.message, "second\n");
    assert_eq!(next_exit(&mut ws).await, 0);
}

#[tokio::test]
async fn connections_run_independently() {
    let server = start().await;
    let (mut slow, _) = connect(&server).await;
    let (mut fast, _) = connect(&server).await;

    run(&mut slow, "sleep 2; echo slow", Mode::Terminal).await;
    run(&mut fast, "echo fast", Mode::Terminal).await;

    let started = tokio::time::Instant::now();
    assert_eq!(next_feedback(&mut fast).await.message, "fast\n");
    assert_eq!(next_exit(&mut fast).await, 0);
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(next_feedback(&mut slow).await.message, "slow\n");
    assert_eq!(next_exit(&mut slow).await, 0);
}

#[tokio::test]
async fn disconnect_removes_connection_record() {
    let server = start().await;
    let (mut ws, client_id) = connect(&server).await;
    assert_eq!(server.state.registry.connection_count().await, 1);

    ws.close(None).await.unwrap();

    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while server.state.registry.is_connected(&client_id).await {
        assert!(tokio::time::Instant::now() < deadline, "record not removed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.state.registry.connection_count().await, 0);
}

#[tokio::test]
async fn rejection_waits_for_running_command() {
    let server = start().await;
    let (mut ws, _) = connect(&server).await;

    run(&mut ws, "sleep 0.3; echo done", Mode::Terminal).await;
    send_raw(&mut ws, r#"{"event":"run_cursor_command","data":"oops"}"#).await;

    assert_eq!(next_feedback(&mut ws).await.message, "done\n");
    assert_eq!(next_exit(&mut ws).await, 0);
    assert_eq!(next_feedback(&mut ws).await.kind, FeedbackKind::Error);
    assert_eq!(next_exit(&mut ws).await, 1);
}

#[tokio::test]
async fn running_command_finishes_after_disconnect() {
    let server = start().await;
    let (mut ws, _) = connect(&server).await;

    run(&mut ws, "sleep 0.3; touch done", Mode::Terminal).await;
    ws.close(None).await.unwrap();

    wait_for_file(&server.dir.path().join("done")).await;
}

#[tokio::test]
async fn queued_commands_run_after_disconnect() {
    let server = start().await;
    let (mut ws, _) = connect(&server).await;

    run(&mut ws, "sleep 0.3; touch first", Mode::Terminal).await;
    run(&mut ws, "touch second", Mode::Terminal).await;
    ws.close(None).await.unwrap();

    wait_for_file(&server.dir.path().join("first")).await;
    wait_for_file(&server.dir.path().join("second")).await;
}
