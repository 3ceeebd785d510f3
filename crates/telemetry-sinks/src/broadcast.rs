//! Live WebSocket broadcaster.
//!
//! Frames and session events are serialized once and fanned out through a
//! bounded `tokio::sync::broadcast` channel. Subscribers that lag skip the
//! messages they missed; only the latest state matters for a live dashboard.
//!
//! The latest `status` and `capabilities` events are kept in a [`StickyCache`]
//! and replayed, status first, to every new subscriber before live traffic.
//! Publishing an event and subscribing both happen under the cache lock, so a
//! late joiner never misses nor duplicates a transition.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use parking_lot::Mutex;
use ssp_telemetry_core::{BridgeEvent, EventKind, TelemetryFrame};
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, trace};

use crate::{SinkResult, TelemetrySink};

/// Messages buffered per subscriber before it starts skipping.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Latest event per sticky kind, with its serialized form.
#[derive(Debug, Default, Clone)]
pub struct StickyCache {
    status: Option<(BridgeEvent, Arc<str>)>,
    capabilities: Option<(BridgeEvent, Arc<str>)>,
}

impl StickyCache {
    pub fn update(&mut self, event: BridgeEvent, message: Arc<str>) {
        let slot = match event.kind() {
            EventKind::Status => &mut self.status,
            EventKind::Capabilities => &mut self.capabilities,
        };
        *slot = Some((event, message));
    }

    pub fn get(&self, kind: EventKind) -> Option<&BridgeEvent> {
        let slot = match kind {
            EventKind::Status => &self.status,
            EventKind::Capabilities => &self.capabilities,
        };
        slot.as_ref().map(|(event, _)| event)
    }

    /// Serialized events to send a new subscriber, status then capabilities.
    pub fn replay(&self) -> Vec<Arc<str>> {
        [&self.status, &self.capabilities]
            .into_iter()
            .flatten()
            .map(|(_, message)| Arc::clone(message))
            .collect()
    }
}

/// A new subscriber: sticky replay followed by the live stream.
#[derive(Debug)]
pub struct Subscription {
    pub replay: Vec<Arc<str>>,
    pub live: broadcast::Receiver<Arc<str>>,
}

#[derive(Debug)]
struct Shared {
    tx: broadcast::Sender<Arc<str>>,
    sticky: Mutex<StickyCache>,
}

/// Cloneable handle: one clone feeds frames from the bridge loop, another
/// serves WebSocket clients.
#[derive(Debug, Clone)]
pub struct LiveBroadcaster {
    shared: Arc<Shared>,
}

impl Default for LiveBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl LiveBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                tx,
                sticky: Mutex::new(StickyCache::default()),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let sticky = self.shared.sticky.lock();
        Subscription {
            replay: sticky.replay(),
            live: self.shared.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.tx.receiver_count()
    }

    pub fn sticky(&self, kind: EventKind) -> Option<BridgeEvent> {
        self.shared.sticky.lock().get(kind).cloned()
    }

    /// Broadcast a frame. Frames are never sticky.
    pub fn broadcast_frame(&self, frame: &TelemetryFrame) -> SinkResult<()> {
        if self.subscriber_count() == 0 {
            return Ok(());
        }
        let message: Arc<str> = serde_json::to_string(frame)?.into();
        self.send(message);
        Ok(())
    }

    /// Retain `event` as the sticky value for its kind and broadcast it.
    pub fn publish_event(&self, event: &BridgeEvent) -> SinkResult<()> {
        let message: Arc<str> = serde_json::to_string(event)?.into();
        let mut sticky = self.shared.sticky.lock();
        sticky.update(event.clone(), Arc::clone(&message));
        self.send(message);
        Ok(())
    }

    fn send(&self, message: Arc<str>) {
        if self.shared.tx.send(message).is_err() {
            trace!("no live subscribers");
        }
    }

    /// Router serving the live stream at `/`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(ws_handler))
            .with_state(self.clone())
    }

    /// Serve WebSocket clients on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "live WebSocket server listening");
        }
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

impl TelemetrySink for LiveBroadcaster {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn record_frame(&mut self, frame: &TelemetryFrame) -> SinkResult<()> {
        self.broadcast_frame(frame)
    }

    fn publish_event(&mut self, event: &BridgeEvent) -> SinkResult<()> {
        LiveBroadcaster::publish_event(self, event)
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(broadcaster): State<LiveBroadcaster>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let subscription = broadcaster.subscribe();
        serve_subscriber(socket, subscription).await;
    })
}

async fn serve_subscriber(mut socket: WebSocket, subscription: Subscription) {
    let Subscription { replay, mut live } = subscription;
    debug!(replayed = replay.len(), "WebSocket subscriber connected");

    for message in replay {
        if send_text(&mut socket, &message).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            received = live.recv() => match received {
                Ok(message) => {
                    if send_text(&mut socket, &message).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    trace!(skipped, "WebSocket subscriber lagging");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("WebSocket subscriber dropped");
}

async fn send_text(socket: &mut WebSocket, message: &str) -> Result<(), axum::Error> {
    socket.send(Message::Text(message.to_string().into())).await
}
