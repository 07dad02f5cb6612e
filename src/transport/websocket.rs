use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::config::ServerSettings;
use crate::protocol::ConnectionId;
use crate::router::Router;
use crate::utils::error::ServerError;

/// A running relay server.
///
/// Owns the accept loop and a shared [`Router`]; exposes a read-only view of
/// the subscription registry and the validated-packet event stream.
pub struct Server {
    router: Arc<Router>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl Server {
    /// Binds the configured address and starts accepting connections.
    pub async fn listen(settings: &ServerSettings) -> Result<Self, ServerError> {
        let addr = format!("{}:{}", settings.host, settings.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let router = Arc::new(Router::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let accept_router = router.clone();
        let accept_task = tokio::spawn(async move {
            let mut shutdown = shutdown_rx;
            loop {
                let conn_shutdown = shutdown.clone();
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!("accepted connection from {peer}");
                            tokio::spawn(handle_connection(
                                accept_router.clone(),
                                stream,
                                conn_shutdown,
                            ));
                        }
                        Err(e) => warn!("accept failed: {e}"),
                    },
                    _ = shutdown.changed() => break,
                }
            }
        });

        info!("relay listening on ws://{local_addr}");
        Ok(Self {
            router,
            local_addr,
            shutdown,
            accept_task,
        })
    }

    /// Runs the WebSocket handshake and a relay session on a connection
    /// accepted elsewhere, for callers that do their own listening or
    /// protocol upgrading.
    pub fn accept(&self, stream: TcpStream) {
        tokio::spawn(handle_connection(
            self.router.clone(),
            stream,
            self.shutdown.subscribe(),
        ));
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Topics with at least one subscriber.
    pub fn topics(&self) -> Vec<String> {
        self.router.topics()
    }

    /// Current subscribers of a topic, in no particular order.
    pub fn members(&self, topic: &str) -> Vec<ConnectionId> {
        self.router.members(topic)
    }

    pub fn member_count(&self, topic: &str) -> usize {
        self.router.member_count(topic)
    }

    /// Stream of shallow copies of every packet that passes validation.
    pub fn packets(&self) -> broadcast::Receiver<Value> {
        self.router.subscribe_events()
    }

    /// Stops accepting and signals every connection task to shut down.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
        self.accept_task.abort();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// One accepted connection: WebSocket handshake, then a writer task that
/// drains the per-connection channel into the socket while this task feeds
/// inbound messages to the dispatcher. Ends on socket error/close or server
/// shutdown; either way the connection is removed from the router, which
/// closes the channel and lets the writer finish.
async fn handle_connection(
    router: Arc<Router>,
    stream: TcpStream,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("websocket handshake error: {e}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let id = router.register(tx);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
        debug!("send loop closed for connection {id}");
    });

    loop {
        tokio::select! {
            message = ws_receiver.next() => match message {
                Some(Ok(message)) if message.is_text() => {
                    if let Ok(text) = message.to_text() {
                        router.handle_message(id, text);
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("connection {id} errored: {e}");
                    break;
                }
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }

    debug!("connection {id} disconnected");
    router.disconnect(id);
    let _ = writer.await;
}
