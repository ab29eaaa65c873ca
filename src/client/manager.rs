use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::relay::events::{ClientEvent, RelayEvent};

use super::policy::{ConnectionState, ReconnectPolicy};

/// Capacity of the inbound event broadcast. Subscribers that fall behind
/// skip events (RecvError::Lagged).
const EVENT_CHANNEL_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// The process-wide shared connection to the relay. The application root
/// creates exactly one of these and hands out `subscribe`/`state` handles to
/// whatever needs them — UI components never open their own transport, which
/// is what keeps room joins and event delivery from duplicating.
///
/// The manager runs the reconnection state machine in a background task:
/// probe liveness, open the transport with bounded fixed-delay attempts,
/// re-identify, and start over from probing whenever the transport drops.
pub struct ConnectionManager {
    outbound: mpsc::UnboundedSender<ClientEvent>,
    events: broadcast::Sender<RelayEvent>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Start the connection loop against `base_url` (e.g. "http://host:8080"),
    /// identifying as `user_id` on every (re)connect.
    pub fn start(base_url: String, user_id: String, policy: ReconnectPolicy) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Probing);
        let cancel = CancellationToken::new();

        let worker = Worker {
            base_url,
            user_id,
            policy,
            outbound_rx,
            events: events_tx.clone(),
            state: state_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(worker.run());

        Self {
            outbound: outbound_tx,
            events: events_tx,
            state_rx,
            cancel,
        }
    }

    /// Queue an event for the server. Events queued while disconnected are
    /// flushed once the connection is re-established.
    pub fn send(&self, event: ClientEvent) {
        let _ = self.outbound.send(event);
    }

    /// Subscribe to events delivered by the server.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Watch the connection lifecycle (the "connected" flag for UI code).
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.state_rx.borrow() == ConnectionState::Connected
    }

    /// Stop the background task. Also happens on drop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker {
    base_url: String,
    user_id: String,
    policy: ReconnectPolicy,
    outbound_rx: mpsc::UnboundedReceiver<ClientEvent>,
    events: broadcast::Sender<RelayEvent>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        let http = reqwest::Client::new();

        loop {
            // Probing: don't open the transport against an unreachable
            // backend; retry the cheap health request instead.
            self.set_state(ConnectionState::Probing);
            loop {
                if self.cancel.is_cancelled() {
                    return;
                }
                if self.probe(&http).await {
                    break;
                }
                debug!("liveness probe failed, retrying");
                if self.wait(self.policy.probe_retry_delay).await {
                    return;
                }
            }

            // Connecting: bounded attempts with a fixed delay.
            self.set_state(ConnectionState::Connecting);
            let stream = self.try_connect().await;

            match stream {
                Some(stream) => {
                    if self.run_session(stream).await {
                        return;
                    }
                    // Transport dropped; fall through to Disconnected.
                }
                None => {
                    warn!("transport connect attempts exhausted");
                }
            }

            self.set_state(ConnectionState::Disconnected);
            if self.wait(self.policy.reconnect_delay).await {
                return;
            }
        }
    }

    async fn probe(&self, http: &reqwest::Client) -> bool {
        let url = format!("{}/api/health", self.base_url);
        match http
            .get(&url)
            .timeout(self.policy.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn try_connect(&mut self) -> Option<WsStream> {
        let ws_url = ws_url(&self.base_url);
        for attempt in 1..=self.policy.connect_attempts {
            if self.cancel.is_cancelled() {
                return None;
            }
            match connect_async(ws_url.as_str()).await {
                Ok((stream, _)) => return Some(stream),
                Err(e) => {
                    warn!(attempt, error = %e, "transport connect failed");
                    if attempt < self.policy.connect_attempts
                        && self.wait(self.policy.connect_retry_delay).await
                    {
                        return None;
                    }
                }
            }
        }
        None
    }

    /// Drive one live connection until it drops. Returns true on shutdown.
    async fn run_session(&mut self, stream: WsStream) -> bool {
        let (mut write, mut read) = stream.split();

        // Room membership does not survive a transport reconnect, so
        // re-identify before anything else is expected to be delivered.
        let identify = ClientEvent::JoinUserRoom {
            user_id: self.user_id.clone(),
        };
        let frame = match serde_json::to_string(&identify) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize identify event");
                return false;
            }
        };
        if write.send(Message::Text(frame.into())).await.is_err() {
            return false;
        }

        self.set_state(ConnectionState::Connected);
        info!(user_id = %self.user_id, "connected and identified");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return true;
                }
                outbound = self.outbound_rx.recv() => {
                    let Some(event) = outbound else { return true };
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            if write.send(Message::Text(json.into())).await.is_err() {
                                return false;
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to serialize outbound event"),
                    }
                }
                inbound = read.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<RelayEvent>(&text) {
                                // send() errs only when nobody subscribes.
                                Ok(event) => { let _ = self.events.send(event); }
                                Err(e) => warn!(error = %e, "unrecognized server event"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return false,
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state.send(state);
    }

    /// Sleep unless cancelled. Returns true on shutdown.
    async fn wait(&self, delay: std::time::Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = sleep(delay) => false,
        }
    }
}

/// Derive the WebSocket endpoint from the HTTP base URL.
fn ws_url(base_url: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{base_url}")
    };
    format!("{}/ws", ws_base.trim_end_matches('/'))
}
