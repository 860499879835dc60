use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use common::{Target, TargetSource};
use futures::{SinkExt, StreamExt};
use protocol::codec;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bridge::{self, BridgeExit, ClientChannel, ClientFrame, ShellOpener, CLIENT_QUEUE};

/// Shared state behind the terminal route.
pub struct TerminalService<O> {
    opener: Arc<O>,
    targets: Arc<dyn TargetSource>,
}

impl<O> Clone for TerminalService<O> {
    fn clone(&self) -> Self {
        Self {
            opener: Arc::clone(&self.opener),
            targets: Arc::clone(&self.targets),
        }
    }
}

impl<O: ShellOpener + 'static> TerminalService<O> {
    pub fn new(opener: Arc<O>, targets: Arc<dyn TargetSource>) -> Self {
        Self { opener, targets }
    }

    /// `GET /terminal/{group}/{address}` upgrading to a bridged WebSocket.
    pub fn router(self) -> Router {
        Router::new()
            .route("/terminal/{group}/{address}", get(terminal_handler::<O>))
            .with_state(self)
    }

    fn lookup(&self, group: &str, address: &str) -> Result<Target, (StatusCode, String)> {
        match self.targets.resolve_addresses(group, &[address.to_string()]) {
            Ok(found) => found.into_iter().next().ok_or_else(|| {
                (
                    StatusCode::NOT_FOUND,
                    format!("host '{address}' is not in group '{group}'"),
                )
            }),
            Err(common::Error::UnknownGroup(g)) => {
                Err((StatusCode::NOT_FOUND, format!("unknown group '{g}'")))
            }
            Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        }
    }
}

async fn terminal_handler<O: ShellOpener + 'static>(
    State(service): State<TerminalService<O>>,
    Path((group, address)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    let target = match service.lookup(&group, &address) {
        Ok(target) => target,
        Err(rejection) => {
            debug!(%group, %address, reason = %rejection.1, "rejecting terminal request");
            return rejection.into_response();
        }
    };

    info!(%group, host = %target.endpoint(), "terminal upgrade");
    ws.on_upgrade(move |socket| async move {
        let exit = bridge_websocket(socket, service.opener.as_ref(), &target).await;
        info!(host = %target.endpoint(), ?exit, "terminal WebSocket finished");
    })
}

/// Run a bridge over an upgraded WebSocket.
///
/// Text frames carry JSON messages; binary frames are read as UTF-8 text.
pub async fn bridge_websocket<O>(socket: WebSocket, opener: &O, target: &Target) -> BridgeExit
where
    O: ShellOpener + ?Sized,
{
    let (mut sink, mut stream) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel(CLIENT_QUEUE);
    let (outbound_tx, mut outbound_rx) = mpsc::channel(CLIENT_QUEUE);

    let reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(Message::Text(text)) => ClientFrame::Text(text.as_str().to_owned()),
                Ok(Message::Binary(data)) => {
                    ClientFrame::Text(String::from_utf8_lossy(&data).into_owned())
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => ClientFrame::Failed(e.to_string()),
            };
            let failed = matches!(frame, ClientFrame::Failed(_));
            if inbound_tx.send(frame).await.is_err() || failed {
                break;
            }
        }
    });

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let text = match codec::encode(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!(%e, "failed to encode terminal message");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text.into())).await {
                debug!(%e, "WebSocket send failed");
                return;
            }
        }
        // Fails after the client closed first; its queued reply goes out below.
        if let Err(e) = sink.send(Message::Close(None)).await {
            debug!(%e, "WebSocket close frame not sent");
        }
        if let Err(e) = sink.close().await {
            debug!(%e, "WebSocket close not flushed");
        }
    });

    let exit = bridge::run(
        opener,
        target,
        ClientChannel {
            inbound: inbound_rx,
            outbound: outbound_tx,
        },
    )
    .await;

    reader.abort();
    if let Err(e) = writer.await {
        debug!(%e, "WebSocket writer ended abnormally");
    }
    exit
}
