use crate::channel::{Channel, ChannelBuilder};
use crate::error::RealtimeError;
use crate::message::{RealtimeMessage, HEARTBEAT, PHX_CLOSE, PHX_ERROR, PHX_LEAVE, PHX_REPLY};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, Notify, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct RealtimeClientOptions {
    pub heartbeat_interval: Duration,
}

impl Default for RealtimeClientOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
struct SocketHandle {
    tx: mpsc::Sender<Message>,
    shutdown: Arc<Notify>,
}

/// Realtime client. Clones share the same socket and channel table.
#[derive(Clone)]
pub struct RealtimeClient {
    pub(crate) url: String,
    pub(crate) key: String,
    pub(crate) options: RealtimeClientOptions,
    next_ref: Arc<AtomicU32>,
    // topic -> channel
    pub(crate) channels: Arc<RwLock<HashMap<String, Arc<Channel>>>>,
    socket: Arc<RwLock<Option<SocketHandle>>>,
    // held from the state check until the socket slot is filled
    connect_lock: Arc<Mutex<()>>,
    state: Arc<RwLock<ConnectionState>>,
    state_change: broadcast::Sender<ConnectionState>,
    pub(crate) access_token: Arc<RwLock<Option<String>>>,
}

impl RealtimeClient {
    pub fn new(url: &str, key: &str) -> Self {
        Self::new_with_options(url, key, RealtimeClientOptions::default())
    }

    pub fn new_with_options(url: &str, key: &str, options: RealtimeClientOptions) -> Self {
        let (state_change, _) = broadcast::channel(16);
        Self {
            url: url.to_string(),
            key: key.to_string(),
            options,
            next_ref: Arc::new(AtomicU32::new(1)),
            channels: Arc::new(RwLock::new(HashMap::new())),
            socket: Arc::new(RwLock::new(None)),
            connect_lock: Arc::new(Mutex::new(())),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            state_change,
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    /// User token sent with every subsequent channel join
    pub async fn set_auth(&self, token: Option<String>) {
        debug!("Setting realtime auth token (is_some: {})", token.is_some());
        *self.access_token.write().await = token;
    }

    pub fn on_state_change(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_change.subscribe()
    }

    pub async fn get_connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Start building a subscription on channel `name`
    pub fn channel(&self, name: &str) -> ChannelBuilder<'_> {
        ChannelBuilder::new(self, name)
    }

    pub(crate) fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Websocket endpoint derived from the project URL
    pub fn endpoint(&self) -> Result<Url, RealtimeError> {
        let mut url = Url::parse(&self.url)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(RealtimeError::ConnectionError(format!(
                    "Unsupported URL scheme: {}",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| RealtimeError::ConnectionError("Cannot set websocket scheme".into()))?;
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/realtime/v1/websocket", base));
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }

    async fn set_state(&self, state: ConnectionState) {
        let mut current = self.state.write().await;
        if *current != state {
            debug!("Realtime state {:?} -> {:?}", *current, state);
            *current = state;
            let _ = self.state_change.send(state);
        }
    }

    /// Open the socket and spawn the reader/writer tasks. No-op when already connected.
    ///
    /// Concurrent callers share one socket: later callers wait for the first handshake.
    pub async fn connect(&self) -> Result<(), RealtimeError> {
        let _connecting = self.connect_lock.lock().await;
        if self.get_connection_state().await == ConnectionState::Connected {
            return Ok(());
        }

        let endpoint = self.endpoint()?;
        info!("Connecting to realtime endpoint {}", endpoint.path());
        self.set_state(ConnectionState::Connecting).await;

        let ws_stream = match connect_async(endpoint.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
                self.set_state(ConnectionState::Disconnected).await;
                return Err(RealtimeError::ConnectionError(format!(
                    "WebSocket connection failed: {}",
                    e
                )));
            }
        };

        let (mut write, mut read) = ws_stream.split();
        let (socket_tx, mut socket_rx) = mpsc::channel::<Message>(100);
        let shutdown = Arc::new(Notify::new());
        *self.socket.write().await = Some(SocketHandle {
            tx: socket_tx.clone(),
            shutdown: shutdown.clone(),
        });
        self.set_state(ConnectionState::Connected).await;

        // writer
        tokio::spawn(async move {
            while let Some(message) = socket_rx.recv().await {
                trace!("Sending frame: {:?}", message);
                if let Err(e) = write.send(message).await {
                    error!("WebSocket send error: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
            debug!("Writer task finished");
        });

        // reader + heartbeat
        let client = self.clone();
        let heartbeat_tx = socket_tx;
        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(client.options.heartbeat_interval);
            heartbeat.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    frame = read.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => client.route(&text).await,
                            Some(Ok(Message::Close(reason))) => {
                                debug!("Socket closed by server: {:?}", reason);
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!("WebSocket read error: {}", e);
                                break;
                            }
                            None => break,
                        }
                    }
                    _ = heartbeat.tick() => {
                        let beat = RealtimeMessage::new("phoenix", HEARTBEAT, serde_json::json!({}), Some(client.next_ref()));
                        let frame = match serde_json::to_string(&beat) {
                            Ok(frame) => frame,
                            Err(e) => {
                                error!("Cannot encode heartbeat: {}", e);
                                break;
                            }
                        };
                        if heartbeat_tx.send(Message::Text(frame)).await.is_err() {
                            debug!("Heartbeat skipped, writer gone");
                            break;
                        }
                    }
                }
            }
            let mut guard = client.socket.write().await;
            // a newer connection may already own the slot
            let ours = guard
                .as_ref()
                .map_or(false, |handle| Arc::ptr_eq(&handle.shutdown, &shutdown));
            if ours {
                *guard = None;
                drop(guard);
                client.set_state(ConnectionState::Disconnected).await;
            }
            debug!("Reader task finished");
        });

        Ok(())
    }

    async fn route(&self, text: &str) {
        let message = match serde_json::from_str::<RealtimeMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Unparseable realtime frame ({}): {}", e, text);
                return;
            }
        };

        match message.event.as_str() {
            PHX_REPLY => {
                let status = message.payload.get("status").and_then(|s| s.as_str());
                if status != Some("ok") {
                    warn!("Reply on '{}' not ok: {}", message.topic, message.payload);
                }
                return;
            }
            PHX_ERROR | PHX_CLOSE => {
                warn!("Channel '{}' got {}", message.topic, message.event);
                return;
            }
            _ => {}
        }

        let channel = self.channels.read().await.get(&message.topic).cloned();
        match channel {
            Some(channel) => channel.handle_message(&message).await,
            None => trace!("Frame for unknown topic '{}'", message.topic),
        }
    }

    /// Drop `topic` from the channel table and tell the server
    pub(crate) async fn leave_channel(&self, topic: &str) -> Result<(), RealtimeError> {
        self.channels.write().await.remove(topic);
        let leave = RealtimeMessage::new(
            topic,
            PHX_LEAVE,
            serde_json::json!({}),
            Some(self.next_ref()),
        );
        match self.send_message(&leave).await {
            Ok(()) => {
                info!("Left {}", topic);
                Ok(())
            }
            // socket already gone, nothing left to leave
            Err(RealtimeError::ConnectionError(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn send_message(&self, message: &RealtimeMessage) -> Result<(), RealtimeError> {
        let frame = serde_json::to_string(message)?;
        let guard = self.socket.read().await;
        match guard.as_ref() {
            Some(handle) => handle
                .tx
                .send(Message::Text(frame))
                .await
                .map_err(RealtimeError::from),
            None => Err(RealtimeError::ConnectionError(
                "Client socket unavailable".to_string(),
            )),
        }
    }

    /// Drop the socket; background tasks wind down on their own
    pub async fn disconnect(&self) -> Result<(), RealtimeError> {
        if let Some(handle) = self.socket.write().await.take() {
            handle.shutdown.notify_one();
            info!("Realtime socket closed");
        }
        self.channels.write().await.clear();
        self.set_state(ConnectionState::Disconnected).await;
        Ok(())
    }
}
