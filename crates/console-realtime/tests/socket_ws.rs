use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use console_realtime::prelude::*;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

const WAIT: Duration = Duration::from_secs(5);

/// Serves two connections: the first pushes one message and closes with
/// 4000, the second pushes one message and reports the client's close code.
async fn flaky_server(
    listener: TcpListener,
    paths: Arc<Mutex<Vec<String>>>,
    client_close: mpsc::UnboundedSender<u16>,
) {
    let pushes = [
        r#"{"type":"job_started","job_id":11,"status":"processing","progress":5}"#,
        r#"{"type":"job_completed","job_id":11,"status":"completed","progress":100}"#,
    ];
    for (index, push) in pushes.into_iter().enumerate() {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let paths = paths.clone();
        let record_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            paths.lock().expect("paths").push(req.uri().path().to_string());
            Ok(resp)
        };
        let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, record_path).await else {
            return;
        };
        let _ = ws.send(Message::text(push.to_string())).await;

        if index == 0 {
            let _ = ws
                .close(Some(CloseFrame {
                    code: CloseCode::from(4000),
                    reason: "server restart".to_string().into(),
                }))
                .await;
            while let Some(Ok(_)) = ws.next().await {}
            continue;
        }

        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Close(frame) = msg {
                let code = frame.map_or(1005, |f| u16::from(f.code));
                let _ = client_close.send(code);
                break;
            }
        }
    }
}

#[tokio::test]
async fn reconnects_after_abnormal_close_and_disconnects_normally() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let paths = Arc::new(Mutex::new(Vec::new()));
    let (close_tx, mut close_rx) = mpsc::unbounded_channel();
    tokio::spawn(flaky_server(listener, paths.clone(), close_tx));

    let config = ConsoleConfig::new(format!("http://{addr}"))
        .token("abc")
        .reconnect(Backoff::exponential(5, Duration::from_millis(50)));
    let client = SocketClient::new(&config);
    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    client.on_status_change(move |job_id, status, progress| {
        let _ = status_tx.send((job_id, status.to_string(), progress));
    });

    client.connect().await.expect("connect");

    let first = timeout(WAIT, status_rx.recv()).await.expect("first push");
    assert_eq!(first, Some((11, "processing".to_string(), 5.0)));
    let second = timeout(WAIT, status_rx.recv()).await.expect("push after reconnect");
    assert_eq!(second, Some((11, "completed".to_string(), 100.0)));
    assert_eq!(client.state(), ConnectionState::Connected);

    client.disconnect();
    let code = timeout(WAIT, close_rx.recv()).await.expect("close frame");
    assert_eq!(code, Some(1000));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(*paths.lock().expect("paths"), vec!["/ws/abc", "/ws/abc"]);
}

#[tokio::test]
async fn gives_up_when_server_stays_down() {
    // bind then drop so the port refuses connections
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().expect("addr")
    };
    let config = ConsoleConfig::new(format!("http://{addr}"))
        .token("abc")
        .reconnect(Backoff::exponential(2, Duration::from_millis(10)));
    let client = SocketClient::new(&config);

    let err = client.connect().await.expect_err("nothing listening");
    assert!(matches!(err, ConsoleError::Socket(SocketError::Connect(_))));

    let mut states = client.watch_state();
    timeout(
        WAIT,
        states.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .expect("settles")
    .expect("state channel");
}

#[tokio::test]
async fn stalled_handshake_times_out_and_retries() {
    // accepts TCP but never answers the upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let accepted = Arc::new(AtomicUsize::new(0));
    let count = accepted.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            count.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    let config = ConsoleConfig::new(format!("http://{addr}"))
        .token("abc")
        .request_timeout(Duration::from_millis(200))
        .reconnect(Backoff::exponential(1, Duration::from_millis(10)));
    let client = SocketClient::new(&config);

    let err = timeout(Duration::from_secs(3), client.connect())
        .await
        .expect("bounded by the handshake timeout")
        .expect_err("upgrade never completes");
    assert!(matches!(err, ConsoleError::Socket(SocketError::Connect(_))));

    let mut states = client.watch_state();
    timeout(
        WAIT,
        states.wait_for(|s| *s == ConnectionState::Disconnected),
    )
    .await
    .expect("settles")
    .expect("state channel");
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}
