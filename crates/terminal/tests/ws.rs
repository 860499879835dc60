//! The axum route, driven by a real WebSocket client.

mod support;

use std::net::SocketAddr;
use std::sync::Arc;

use common::{Target, TargetSource};
use futures::{SinkExt, StreamExt};
use protocol::{MessageKind, TerminalMessage};
use terminal::TerminalService;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::support::{spawn_echo, FailAt, FakeOpener};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Inventory;

impl TargetSource for Inventory {
    fn resolve(&self, group: &str) -> common::Result<Vec<Target>> {
        match group {
            "web" => Ok(vec![Target::new("127.0.0.1", 22, "root", "pw")?]),
            other => Err(common::Error::UnknownGroup(other.to_string())),
        }
    }
}

async fn serve(opener: FakeOpener) -> SocketAddr {
    let service = TerminalService::new(Arc::new(opener), Arc::new(Inventory));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, service.router()).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, path: &str) -> tungstenite::Result<Client> {
    let (socket, _response) = connect_async(format!("ws://{addr}{path}")).await?;
    Ok(socket)
}

async fn recv_message(socket: &mut Client) -> TerminalMessage {
    match socket.next().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

/// Read until the server's close frame arrives.
async fn expect_close(socket: &mut Client) {
    loop {
        match socket.next().await {
            Some(Ok(Message::Close(_))) => return,
            Some(Ok(Message::Text(text))) => panic!("unexpected text frame before close: {text}"),
            Some(Ok(_)) => continue,
            other => panic!("connection ended without a close frame: {other:?}"),
        }
    }
}

fn not_found(result: tungstenite::Result<Client>) {
    match result {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 404),
        Err(e) => panic!("expected an HTTP rejection, got {e}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }
}

#[tokio::test]
#[ntest::timeout(10000)]
async fn websocket_round_trip() {
    let (opener, remote) = FakeOpener::new(FailAt::Nowhere);
    let echo = spawn_echo(remote);
    let addr = serve(opener).await;

    let mut socket = connect(addr, "/terminal/web/127.0.0.1").await.unwrap();
    assert_eq!(recv_message(&mut socket).await, TerminalMessage::connected(""));

    socket
        .send(Message::text(r#"{"type":"resize","data":"oops"}"#))
        .await
        .unwrap();
    socket
        .send(Message::text(r#"{"type":"input","data":"pwd\r"}"#))
        .await
        .unwrap();
    assert_eq!(recv_message(&mut socket).await, TerminalMessage::data("pwd\r"));

    // Binary frames are read as text.
    socket
        .send(Message::binary(br#"{"type":"input","data":"ls"}"#.to_vec()))
        .await
        .unwrap();
    assert_eq!(recv_message(&mut socket).await, TerminalMessage::data("ls"));

    socket.send(Message::Close(None)).await.unwrap();
    expect_close(&mut socket).await;

    let received = echo.await.unwrap();
    assert_eq!(received.len(), 2);
}

#[tokio::test]
#[ntest::timeout(10000)]
async fn client_close_gets_a_close_reply() {
    let (opener, remote) = FakeOpener::new(FailAt::Nowhere);
    let _echo = spawn_echo(remote);
    let addr = serve(opener).await;

    let mut socket = connect(addr, "/terminal/web/127.0.0.1").await.unwrap();
    assert_eq!(recv_message(&mut socket).await, TerminalMessage::connected(""));

    socket.close(None).await.unwrap();
    expect_close(&mut socket).await;
    assert!(socket.next().await.is_none());
}

#[tokio::test]
#[ntest::timeout(10000)]
async fn websocket_reports_establish_failure() {
    let (opener, _remote) = FakeOpener::new(FailAt::Shell);
    let addr = serve(opener).await;

    let mut socket = connect(addr, "/terminal/web/127.0.0.1").await.unwrap();
    let msg = recv_message(&mut socket).await;
    assert_eq!(msg.kind, MessageKind::Error);
    assert!(msg.data.starts_with("SSH connection failed: "));
    expect_close(&mut socket).await;
}

#[tokio::test]
#[ntest::timeout(10000)]
async fn unknown_group_is_not_found() {
    let (opener, _remote) = FakeOpener::new(FailAt::Nowhere);
    let addr = serve(opener).await;
    not_found(connect(addr, "/terminal/db/127.0.0.1").await);
}

#[tokio::test]
#[ntest::timeout(10000)]
async fn unknown_host_is_not_found() {
    let (opener, _remote) = FakeOpener::new(FailAt::Nowhere);
    let addr = serve(opener).await;
    not_found(connect(addr, "/terminal/web/10.9.9.9").await);
}
