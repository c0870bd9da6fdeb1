#![allow(clippy::unwrap_used)]

use std::time::Duration;

use emslink_api::{Connection, Error, LinkEvent, LinkState, ReconnectConfig};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        max_retries: None,
    }
}

async fn bind() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = Url::parse(&format!("ws://{addr}")).unwrap();
    (listener, url)
}

async fn next_event(link: &mut emslink_api::Link) -> LinkEvent {
    timeout(WAIT, link.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn text_frames_round_trip_through_the_link() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_text() {
                ws.send(msg).await.unwrap();
            }
        }
    });

    let mut link = Connection::spawn(url, fast_reconnect(), CancellationToken::new()).unwrap();
    assert_eq!(next_event(&mut link).await, LinkEvent::Opened);
    assert!(link.is_open());

    link.send(r#"{"jsonrpc":"2.0","method":"ping"}"#.into()).unwrap();
    assert_eq!(
        next_event(&mut link).await,
        LinkEvent::Frame(r#"{"jsonrpc":"2.0","method":"ping"}"#.into())
    );
}

#[tokio::test]
async fn reconnects_after_server_drops_the_socket() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        // First connection: accept and close right away.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        drop(ws);

        // Second connection: stay open.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::text("hello again")).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let mut link = Connection::spawn(url, fast_reconnect(), CancellationToken::new()).unwrap();
    assert_eq!(next_event(&mut link).await, LinkEvent::Opened);
    assert!(matches!(next_event(&mut link).await, LinkEvent::Closed { .. }));
    assert_eq!(next_event(&mut link).await, LinkEvent::Opened);
    assert_eq!(next_event(&mut link).await, LinkEvent::Frame("hello again".into()));
}

#[tokio::test]
async fn peer_close_code_is_reported() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "maintenance".into(),
        }))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    });

    let mut link = Connection::spawn(url, fast_reconnect(), CancellationToken::new()).unwrap();
    assert_eq!(next_event(&mut link).await, LinkEvent::Opened);
    assert_eq!(
        next_event(&mut link).await,
        LinkEvent::Closed {
            reason: "WebSocket closed (code 1001): maintenance".into()
        }
    );
}

#[tokio::test]
async fn failed_attempts_are_reported_and_retried() {
    // Bind to learn a free port, then release it so the first attempts fail.
    let (listener, url) = bind().await;
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut link = Connection::spawn(url, fast_reconnect(), CancellationToken::new()).unwrap();
    assert!(matches!(next_event(&mut link).await, LinkEvent::Closed { .. }));

    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    loop {
        match next_event(&mut link).await {
            LinkEvent::Opened => break,
            LinkEvent::Closed { .. } => {}
            LinkEvent::Frame(f) => panic!("unexpected frame {f}"),
        }
    }
}

#[tokio::test]
async fn gives_up_after_max_retries() {
    let (listener, url) = bind().await;
    drop(listener);

    let reconnect = ReconnectConfig {
        max_retries: Some(1),
        ..fast_reconnect()
    };
    let mut link = Connection::spawn(url, reconnect, CancellationToken::new()).unwrap();

    let mut closed = 0;
    while let Some(event) = timeout(WAIT, link.recv()).await.unwrap() {
        assert!(matches!(event, LinkEvent::Closed { .. }));
        closed += 1;
    }
    assert_eq!(closed, 2);
    assert!(matches!(*link.state().borrow(), LinkState::Closed { .. }));
}

#[tokio::test]
async fn invalid_endpoint_fails_immediately() {
    let url = Url::parse("http://127.0.0.1:1/ws").unwrap();
    let err = Connection::spawn(url, fast_reconnect(), CancellationToken::new()).unwrap_err();
    assert!(matches!(err, Error::InvalidEndpoint { .. }));
}

#[tokio::test]
async fn shutdown_ends_the_event_stream() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let mut link = Connection::spawn(url, fast_reconnect(), CancellationToken::new()).unwrap();
    assert_eq!(next_event(&mut link).await, LinkEvent::Opened);

    link.shutdown();
    assert_eq!(timeout(WAIT, link.recv()).await.unwrap(), None);
    assert_eq!(
        *link.state().borrow(),
        LinkState::Closed {
            reason: "shut down".into()
        }
    );
}
