use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::AbortHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::client::correlator::Correlator;
use crate::client::handlers::{Handler, HandlerId, HandlerMap};
use crate::client::keep_alive;
use crate::config::ClientSettings;
use crate::protocol::{ConnectionId, Packet, PacketType};
use crate::utils::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

/// Topic of the idle no-op packet sent by the keep-alive timer.
const KEEP_ALIVE_TOPIC: &str = "keep-alive";

/// Connection lifecycle of a client.
///
/// `Closed` is the terminal state entered only by an explicit `close()`;
/// folding it into the enum keeps the "closed" and "disconnected" flags from
/// drifting apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    /// The supervised retry loop is re-establishing the connection.
    Reconnecting,
    Disconnected,
    Closed,
}

/// What to do when the transport drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Once disconnected, every further send fails.
    #[default]
    Never,
    /// Retry forever with a fixed delay between attempts, replaying all
    /// active subscriptions before resuming.
    FixedDelay(Duration),
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Prepended to every topic sent and stripped from every topic
    /// received, so multiple logical namespaces can share one relay.
    pub prefix: String,
    /// Idle interval after which a keep-alive packet is sent.
    pub keep_alive: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            keep_alive: Duration::from_secs(60),
            reconnect: ReconnectPolicy::Never,
        }
    }
}

impl From<&ClientSettings> for ClientOptions {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            prefix: String::new(),
            keep_alive: Duration::from_secs(settings.keep_alive_secs),
            reconnect: ReconnectPolicy::FixedDelay(Duration::from_secs(
                settings.reconnect_delay_secs,
            )),
        }
    }
}

/// State shared between the client handle and its background tasks.
pub(crate) struct ClientShared {
    endpoint: String,
    prefix: String,
    pub(crate) keep_alive: Duration,
    reconnect: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    sink: Mutex<Option<WsSink>>,
    correlator: StdMutex<Correlator>,
    handlers: StdMutex<HandlerMap>,
    pub(crate) keep_alive_reset: Notify,
}

impl ClientShared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Stores the sink half of a freshly connected stream and spawns the
    /// reader for the other half.
    ///
    /// Boxed (rather than `async fn`) to break the `Send` auto-trait cycle
    /// between the mutually recursive async fns in this connection
    /// lifecycle.
    fn attach<'a>(
        self: &'a Arc<Self>,
        stream: WsStream,
    ) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let (sink, source) = stream.split();
            *self.sink.lock().await = Some(sink);

            let shared = self.clone();
            tokio::spawn(async move {
                shared.read_loop(source).await;
            });
        })
    }

    async fn read_loop(self: Arc<Self>, mut source: SplitStream<WsStream>) {
        loop {
            match source.next().await {
                Some(Ok(message)) if message.is_text() => {
                    if let Ok(text) = message.to_text() {
                        self.handle_incoming(text);
                    }
                }
                Some(Ok(message)) if message.is_close() => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("connection error: {e}");
                    break;
                }
                None => break,
            }
        }
        self.handle_disconnect().await;
    }

    fn handle_incoming(&self, text: &str) {
        let packet: Packet = match serde_json::from_str(text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("ignoring unparseable packet: {e}");
                return;
            }
        };

        match packet.kind {
            PacketType::Message | PacketType::Broadcast => {
                let topic = packet
                    .topic
                    .strip_prefix(&self.prefix)
                    .unwrap_or(&packet.topic)
                    .to_string();
                let handlers: Vec<Handler> = self.handlers.lock().unwrap().handlers_for(&topic);
                for handler in handlers {
                    handler(&packet);
                }
            }
            PacketType::Subscribe => {
                if let Some(id) = packet.id {
                    let mut correlator = self.correlator.lock().unwrap();
                    match packet.error.clone() {
                        Some(error) => correlator.reject(id, ClientError::Rejected(error)),
                        None => correlator.resolve(id, packet),
                    }
                }
            }
            _ => {}
        }
    }

    /// Reacts to the transport dropping out from under us. Only the
    /// `Connected` state transitions; a reader dying while a reconnect is
    /// already in flight is the retry loop's problem.
    async fn handle_disconnect(self: &Arc<Self>) {
        *self.sink.lock().await = None;
        self.correlator.lock().unwrap().reject_all();

        if self.state() != ConnectionState::Connected {
            return;
        }
        match self.reconnect {
            ReconnectPolicy::Never => {
                debug!("disconnected from {}", self.endpoint);
                self.state.send_replace(ConnectionState::Disconnected);
            }
            ReconnectPolicy::FixedDelay(delay) => {
                self.state.send_replace(ConnectionState::Reconnecting);
                let shared = self.clone();
                tokio::spawn(async move {
                    shared.reconnect_loop(delay).await;
                });
            }
        }
    }

    /// Supervised retry loop: wait the fixed delay, re-dial, replay every
    /// active subscription, then resume. Failures within one attempt are
    /// swallowed and the loop tries again; there is no attempt bound.
    async fn reconnect_loop(self: Arc<Self>, delay: Duration) {
        loop {
            debug!(
                "disconnected from {}, reconnecting in {:?}",
                self.endpoint, delay
            );
            tokio::time::sleep(delay).await;
            if self.state() == ConnectionState::Closed {
                return;
            }

            let stream = match connect_async(&self.endpoint).await {
                Ok((stream, _)) => stream,
                Err(_) => continue,
            };
            self.attach(stream).await;

            if self.replay_subscriptions().await.is_ok() {
                if self.state() == ConnectionState::Closed {
                    return;
                }
                self.state.send_replace(ConnectionState::Connected);
                debug!("reconnected to {}", self.endpoint);
                return;
            }

            // Replay failed; drop this socket and start over.
            *self.sink.lock().await = None;
        }
    }

    async fn replay_subscriptions(&self) -> Result<(), ClientError> {
        let topics = self.handlers.lock().unwrap().topics();
        for topic in topics {
            self.send_operation(PacketType::Subscribe, &topic, None, false)
                .await?;
        }
        Ok(())
    }

    /// Blocks until the state machine reaches `Connected`, failing fast on
    /// terminal states. This is where a reconnecting client's sends pick up
    /// their implicit backpressure.
    async fn wait_until_connected(&self) -> Result<(), ClientError> {
        let mut rx = self.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected | ConnectionState::Closed => {
                    return Err(ClientError::Disconnected);
                }
                ConnectionState::Reconnecting => {
                    if rx.changed().await.is_err() {
                        return Err(ClientError::Disconnected);
                    }
                }
            }
        }
    }

    fn build_packet(
        &self,
        kind: PacketType,
        topic: &str,
        body: Option<Value>,
        forbidden: &[&'static str],
    ) -> Result<Packet, ClientError> {
        Packet::new(kind, format!("{}{}", self.prefix, topic)).with_body(body, forbidden)
    }

    /// Serializes and writes one packet. `gated` sends go through the state
    /// machine first; the replay and keep-alive paths skip it.
    async fn send_packet(&self, packet: &Packet, gated: bool) -> Result<(), ClientError> {
        if gated {
            self.wait_until_connected().await?;
        }

        let text = serde_json::to_string(packet)?;
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(ClientError::Disconnected)?;
        sink.send(WsMessage::text(text)).await?;
        self.keep_alive_reset.notify_one();
        Ok(())
    }

    async fn send(
        &self,
        kind: PacketType,
        topic: &str,
        body: Option<Value>,
    ) -> Result<(), ClientError> {
        let packet = self.build_packet(kind, topic, body, &[])?;
        self.send_packet(&packet, true).await
    }

    /// Sends a request that expects a correlated response and awaits it.
    async fn send_operation(
        &self,
        kind: PacketType,
        topic: &str,
        body: Option<Value>,
        gated: bool,
    ) -> Result<Packet, ClientError> {
        let mut packet = self.build_packet(kind, topic, body, &["id"])?;
        let (id, response) = self.correlator.lock().unwrap().add();
        packet.id = Some(id);

        if let Err(e) = self.send_packet(&packet, gated).await {
            self.correlator.lock().unwrap().forget(id);
            return Err(e);
        }

        match response.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Disconnected),
        }
    }

    /// Idle ping. Fails instead of suspending when the connection is down,
    /// so the keep-alive task never stalls behind a reconnect.
    pub(crate) async fn send_keep_alive(&self) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Connected {
            return Err(ClientError::Disconnected);
        }
        let packet = Packet::new(
            PacketType::Error,
            format!("{}{}", self.prefix, KEEP_ALIVE_TOPIC),
        );
        self.send_packet(&packet, false).await
    }
}

/// A relay client over one persistent WebSocket connection.
///
/// The client keeps a logical "subscribed" view of topics in its handler
/// map; with a `FixedDelay` reconnect policy that view survives transient
/// network failures, with subscriptions replayed transparently before
/// traffic resumes.
pub struct Client {
    shared: Arc<ClientShared>,
    keep_alive_task: AbortHandle,
}

impl Client {
    /// Connects with default options: no prefix, 60 s keep-alive, no
    /// reconnection.
    pub async fn connect(endpoint: &str) -> Result<Self, ClientError> {
        Self::connect_with(endpoint, ClientOptions::default()).await
    }

    pub async fn connect_with(endpoint: &str, options: ClientOptions) -> Result<Self, ClientError> {
        debug!("connecting to {endpoint}");
        let (stream, _) = connect_async(endpoint).await?;
        debug!("connection to {endpoint} established");

        let (state, _) = watch::channel(ConnectionState::Connected);
        let shared = Arc::new(ClientShared {
            endpoint: endpoint.to_string(),
            prefix: options.prefix,
            keep_alive: options.keep_alive,
            reconnect: options.reconnect,
            state,
            sink: Mutex::new(None),
            correlator: StdMutex::new(Correlator::default()),
            handlers: StdMutex::new(HandlerMap::default()),
            keep_alive_reset: Notify::new(),
        });
        shared.attach(stream).await;

        let keep_alive_task = tokio::spawn(keep_alive::run(shared.clone())).abort_handle();
        Ok(Self {
            shared,
            keep_alive_task,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.shared.prefix
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn disconnected(&self) -> bool {
        self.shared.state() != ConnectionState::Connected
    }

    /// Registers a handler for a topic.
    ///
    /// The first handler for a topic triggers a network subscribe which is
    /// awaited before the handler is registered, so local registration
    /// always reflects server-confirmed subscription state. Further
    /// handlers for the same topic skip the network round trip.
    pub async fn subscribe<F>(&self, topic: &str, handler: F) -> Result<HandlerId, ClientError>
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        let first = !self.shared.handlers.lock().unwrap().has_handlers(topic);
        if first {
            self.shared
                .send_operation(PacketType::Subscribe, topic, None, true)
                .await?;
        }
        Ok(self
            .shared
            .handlers
            .lock()
            .unwrap()
            .add(topic, Arc::new(handler)))
    }

    /// Drops every handler for the topic and tells the server, without
    /// awaiting a response.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ClientError> {
        self.shared.handlers.lock().unwrap().clear(topic);
        self.shared.send(PacketType::Unsubscribe, topic, None).await
    }

    /// Drops one handler; the network unsubscribe is only sent once the
    /// topic has no handlers left.
    pub async fn unsubscribe_handler(
        &self,
        topic: &str,
        handler: HandlerId,
    ) -> Result<(), ClientError> {
        let now_empty = {
            let mut handlers = self.shared.handlers.lock().unwrap();
            handlers.remove(topic, handler);
            !handlers.has_handlers(topic)
        };
        if now_empty {
            self.shared.send(PacketType::Unsubscribe, topic, None).await
        } else {
            Ok(())
        }
    }

    /// Relays `body` to every other subscriber of the topic.
    pub async fn broadcast(&self, topic: &str, body: Option<Value>) -> Result<(), ClientError> {
        self.shared.send(PacketType::Broadcast, topic, body).await
    }

    /// Sends `body` to a single subscriber of the topic.
    pub async fn message(
        &self,
        topic: &str,
        destination: ConnectionId,
        body: Option<Value>,
    ) -> Result<(), ClientError> {
        let mut packet = self
            .shared
            .build_packet(PacketType::Message, topic, body, &["dst"])?;
        packet.dst = Some(destination);
        self.shared.send_packet(&packet, true).await
    }

    /// Terminal shutdown: no reconnection will follow, the keep-alive timer
    /// stops, and pending operations are rejected.
    pub async fn close(&self) {
        self.shared.state.send_replace(ConnectionState::Closed);
        self.keep_alive_task.abort();
        if let Some(mut sink) = self.shared.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.shared.correlator.lock().unwrap().reject_all();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.keep_alive_task.abort();
    }
}
