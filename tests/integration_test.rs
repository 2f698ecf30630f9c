//! Integration tests for the record-replay cycle over real websockets

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use wsvcr::cassette::{Cassette, Direction, Frame, Mode};
use wsvcr::transport::{live, WsSocket};
use wsvcr::{Config, Payload, ReplayScheduling, SessionController, Socket, VcrError};

/// Start a websocket server that greets, then echoes data messages
async fn spawn_echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                ws.send(Message::Text("welcome".to_string())).await.unwrap();
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_close() {
                        break;
                    }
                    if (msg.is_text() || msg.is_binary()) && ws.send(msg).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    format!("ws://{addr}/socket")
}

fn message_channel<S: Socket>(socket: &S) -> mpsc::UnboundedReceiver<Payload> {
    let (tx, rx) = mpsc::unbounded_channel();
    socket.on_message(move |payload| {
        let _ = tx.send(payload.clone());
    });
    rx
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<Payload>) -> Payload {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("message channel closed")
}

async fn no_connect(_url: String) -> wsvcr::Result<WsSocket> {
    Err(VcrError::Transport("replay must not open a socket".to_string()))
}

#[tokio::test]
async fn test_record_then_replay_over_websocket() {
    let temp_dir = TempDir::new().unwrap();
    let url = spawn_echo_server().await;
    let config = Config::new(temp_dir.path(), &["127.0.0.1"]);

    // Phase 1: record against the live server
    {
        let mut vcr = SessionController::new(config.clone());
        assert_eq!(vcr.begin("echo").unwrap(), Mode::Recording);

        let conn = vcr.connect(&url, live::connect).await.unwrap();
        assert!(conn.is_intercepted());
        assert!(conn.as_client().unwrap().is_live());

        let mut rx = message_channel(&conn);
        assert_eq!(next_message(&mut rx).await, Payload::from("welcome"));

        conn.send(Payload::from("ping")).unwrap();
        assert_eq!(next_message(&mut rx).await, Payload::from("ping"));

        conn.send(Payload::from(vec![1u8, 2, 3])).unwrap();
        assert_eq!(next_message(&mut rx).await, Payload::from(vec![1u8, 2, 3]));

        conn.close().unwrap();
        let saved = vcr.end().unwrap().expect("recording should be saved");
        assert_eq!(saved, temp_dir.path().join("echo.json"));
    }

    let recorded = Cassette::open(temp_dir.path(), "echo").unwrap();
    assert_eq!(
        recorded.entries(),
        &[
            Frame::new(Direction::Received, "welcome"),
            Frame::new(Direction::Sent, "ping"),
            Frame::new(Direction::Received, "ping"),
            Frame::new(Direction::Sent, vec![1u8, 2, 3]),
            Frame::new(Direction::Received, vec![1u8, 2, 3]),
        ]
    );

    // Phase 2: replay with no network at all
    {
        let mut vcr = SessionController::new(config);
        assert_eq!(vcr.begin("echo").unwrap(), Mode::Replaying);

        let conn = vcr.connect(&url, no_connect).await.unwrap();
        assert!(!conn.as_client().unwrap().is_live());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        conn.on_message(move |payload| sink.lock().unwrap().push(payload.clone()));
        let closed = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&closed);
        conn.on_close(move |_| *flag.lock().unwrap() = true);

        conn.send(Payload::from("ping")).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Payload::from("welcome"),
                Payload::from("ping"),
                Payload::from(vec![1u8, 2, 3]),
            ]
        );
        assert!(*closed.lock().unwrap());
        assert_eq!(vcr.end().unwrap(), None);
    }

    // Replay leaves the cassette untouched
    let replayed = Cassette::open(temp_dir.path(), "echo").unwrap();
    assert_eq!(replayed.entries(), recorded.entries());
}

#[tokio::test]
async fn test_unhooked_url_uses_real_socket() {
    let temp_dir = TempDir::new().unwrap();
    let url = spawn_echo_server().await;
    let mut vcr = SessionController::new(Config::new(temp_dir.path(), &["example.com"]));
    vcr.begin("unused").unwrap();

    let conn = vcr.connect(&url, live::connect).await.unwrap();
    assert!(!conn.is_intercepted());

    let mut rx = message_channel(&conn);
    assert_eq!(next_message(&mut rx).await, Payload::from("welcome"));
    conn.send(Payload::from("direct")).unwrap();
    assert_eq!(next_message(&mut rx).await, Payload::from("direct"));
    conn.close().unwrap();

    assert_eq!(vcr.end().unwrap(), None);
    assert!(!temp_dir.path().join("unused.json").exists());
}

#[tokio::test]
async fn test_lazy_replay_reports_exhaustion() {
    let temp_dir = TempDir::new().unwrap();
    let url = spawn_echo_server().await;
    let config = Config::new(temp_dir.path(), &["127.0.0.1"]);

    {
        let mut vcr = SessionController::new(config.clone());
        vcr.begin("lazy").unwrap();
        let conn = vcr.connect(&url, live::connect).await.unwrap();
        let mut rx = message_channel(&conn);
        assert_eq!(next_message(&mut rx).await, Payload::from("welcome"));
        conn.close().unwrap();
        vcr.end().unwrap();
    }

    let mut vcr = SessionController::new(config.with_replay(ReplayScheduling::Lazy));
    vcr.begin("lazy").unwrap();
    let conn = vcr.connect(&url, no_connect).await.unwrap();
    let client = conn.as_client().unwrap();

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    conn.on_error(move |message| sink.lock().unwrap().push(message.to_string()));

    assert_eq!(client.deliver_next().unwrap(), Payload::from("welcome"));
    assert!(matches!(
        client.deliver_next(),
        Err(VcrError::CassetteExhausted { position: 1, .. })
    ));
    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_corrupt_cassette_aborts_session_start() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("corrupt.json"),
        r#"{"frames":[{"direction":"sent"}]}"#,
    )
    .unwrap();

    let mut vcr = SessionController::new(Config::new(temp_dir.path(), &["127.0.0.1"]));
    assert!(matches!(
        vcr.begin("corrupt"),
        Err(VcrError::Storage { .. })
    ));
    assert!(!vcr.is_active());
}
