//! # Event Bus & Dispatcher
//!
//! Asynchronous notifications of the native network bridge, published on a
//! `tokio::sync::broadcast` bus and delivered to host listeners.
//!
//! ## Overview
//!
//! - **Event Types**: [`TransferEvent`] (HTTP progress) and [`SocketEvent`]
//!   (socket data, errors and disconnects), wrapped in [`BridgeEvent`]
//! - **EventBus**: what producers publish to. Fans out to a bounded broadcast
//!   channel and to lossless per-listener taps
//! - **EventStream**: broadcast receiver with filtering, used by in-process consumers
//! - **EventTap**: unbounded queue of one channel's events
//! - **EventDispatcher**: per-channel forwarding tasks that drain a tap and hand
//!   serialized payloads to a host [`EventListener`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐    emit     ┌───────────┐             ┌──────────────────┐
//! │ HTTP engine ├────────────>│           │  Transfer   │ forwarding task  ├──> listener
//! └─────────────┘             │ EventBus  ├──── tap ───>│ (one per channel)│
//! ┌─────────────┐    emit     │           │   Socket    ├──────────────────┤
//! │  Sessions   ├────────────>│           ├──── tap ───>│ forwarding task  ├──> listener
//! └─────────────┘             └───────────┘             └──────────────────┘
//! ```
//!
//! Events published while nothing is attached are dropped: `emit` reports that
//! to the producer, which ignores it.
//!
//! ## Wire Shapes
//!
//! ```text
//! {"type": "d-p", "requestId": "...", "transferred": 1024, "total": 4096}
//! {"type": "u-p", "requestId": "...", "transferred": 4096, "total": 4096}
//! {"socketId": "printer", "type": "data", "data": [104, 105]}
//! {"socketId": "printer", "type": "error", "message": "..."}
//! {"socketId": "printer", "type": "disconnected"}
//! ```
//!
//! ## Error Handling
//!
//! A tap is unbounded, so a slow listener delays its own events but never loses
//! them. Only `EventStream`s can lag: past the broadcast capacity they get
//! `RecvError::Lagged`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use bridge_traits::listener::EventListener;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Bounds the broadcast side only. `EventStream`s falling behind by more
/// than this many events receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 1024;

// ============================================================================
// Event Types
// ============================================================================

/// Delivery channel toward the managed layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventChannel {
    /// HTTP transfer progress
    Transfer,
    /// Socket data, errors and disconnects
    Socket,
}

impl EventChannel {
    /// Channel name as registered with the host messenger.
    pub fn name(&self) -> &'static str {
        match self {
            EventChannel::Transfer => "native_network/event",
            EventChannel::Socket => "native_network/socket_event",
        }
    }
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Top-level event published on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Transfer(TransferEvent),
    Socket(SocketEvent),
}

impl BridgeEvent {
    pub fn channel(&self) -> EventChannel {
        match self {
            BridgeEvent::Transfer(_) => EventChannel::Transfer,
            BridgeEvent::Socket(_) => EventChannel::Socket,
        }
    }

    /// Serialize into the payload handed to host listeners.
    pub fn to_payload(&self) -> serde_json::Result<Value> {
        match self {
            BridgeEvent::Transfer(event) => serde_json::to_value(event),
            BridgeEvent::Socket(event) => serde_json::to_value(event),
        }
    }
}

impl From<TransferEvent> for BridgeEvent {
    fn from(event: TransferEvent) -> Self {
        BridgeEvent::Transfer(event)
    }
}

impl From<SocketEvent> for BridgeEvent {
    fn from(event: SocketEvent) -> Self {
        BridgeEvent::Socket(event)
    }
}

/// HTTP transfer progress. `total` is -1 when the length is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransferEvent {
    #[serde(rename = "d-p", rename_all = "camelCase")]
    Download {
        request_id: String,
        transferred: u64,
        total: i64,
    },
    #[serde(rename = "u-p", rename_all = "camelCase")]
    Upload {
        request_id: String,
        transferred: u64,
        total: i64,
    },
}

impl TransferEvent {
    pub fn request_id(&self) -> &str {
        match self {
            TransferEvent::Download { request_id, .. } | TransferEvent::Upload { request_id, .. } => {
                request_id
            }
        }
    }

    pub fn transferred(&self) -> u64 {
        match self {
            TransferEvent::Download { transferred, .. }
            | TransferEvent::Upload { transferred, .. } => *transferred,
        }
    }

    pub fn total(&self) -> i64 {
        match self {
            TransferEvent::Download { total, .. } | TransferEvent::Upload { total, .. } => *total,
        }
    }
}

/// Notification about one socket session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketEvent {
    pub socket_id: String,
    #[serde(flatten)]
    pub kind: SocketEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SocketEventKind {
    /// Bytes exactly as one read returned them
    Data { data: Bytes },
    Error { message: String },
    Disconnected,
}

impl SocketEvent {
    pub fn data(socket_id: impl Into<String>, data: Bytes) -> Self {
        Self {
            socket_id: socket_id.into(),
            kind: SocketEventKind::Data { data },
        }
    }

    pub fn error(socket_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            socket_id: socket_id.into(),
            kind: SocketEventKind::Error {
                message: message.into(),
            },
        }
    }

    pub fn disconnected(socket_id: impl Into<String>) -> Self {
        Self {
            socket_id: socket_id.into(),
            kind: SocketEventKind::Disconnected,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to bridge events.
///
/// Cloning is cheap; every clone publishes to the same channel and taps.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
    taps: Arc<Mutex<Vec<TapSender>>>,
}

struct TapSender {
    channel: EventChannel,
    sender: mpsc::UnboundedSender<BridgeEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0. `BridgeConfig::validate` rejects that value.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            taps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Publishes an event to every tap of its channel and every subscriber.
    ///
    /// Returns how many receivers got the event, or an error if nobody is
    /// listening (the event is dropped).
    pub fn emit(&self, event: impl Into<BridgeEvent>) -> std::result::Result<usize, SendError<BridgeEvent>> {
        let event = event.into();
        let channel = event.channel();

        let mut tapped = 0;
        {
            let mut taps = self.lock_taps();
            taps.retain(|tap| !tap.sender.is_closed());
            for tap in taps.iter().filter(|tap| tap.channel == channel) {
                if tap.sender.send(event.clone()).is_ok() {
                    tapped += 1;
                }
            }
        }

        match self.sender.send(event) {
            Ok(subscribers) => Ok(subscribers + tapped),
            Err(_) if tapped > 0 => Ok(tapped),
            Err(unsent) => Err(unsent),
        }
    }

    /// Open a lossless queue of `channel` events, closed when the returned
    /// tap is dropped.
    pub fn tap(&self, channel: EventChannel) -> EventTap {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock_taps().push(TapSender { channel, sender });
        EventTap { channel, receiver }
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to a single channel.
    pub fn stream(&self, channel: EventChannel) -> EventStream {
        EventStream::new(self.subscribe()).filter(move |event| event.channel() == channel)
    }

    /// Broadcast subscribers plus open taps.
    pub fn subscriber_count(&self) -> usize {
        let taps = self
            .lock_taps()
            .iter()
            .filter(|tap| !tap.sender.is_closed())
            .count();
        self.sender.receiver_count() + taps
    }

    fn lock_taps(&self) -> std::sync::MutexGuard<'_, Vec<TapSender>> {
        self.taps.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&BridgeEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<BridgeEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<BridgeEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&BridgeEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> std::result::Result<BridgeEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

/// Unbounded, in-order queue of one channel's events.
pub struct EventTap {
    channel: EventChannel,
    receiver: mpsc::UnboundedReceiver<BridgeEvent>,
}

impl EventTap {
    pub fn channel(&self) -> EventChannel {
        self.channel
    }

    /// Next event, or `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        self.receiver.recv().await
    }

    /// Events queued but not yet received.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl fmt::Debug for EventTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTap")
            .field("channel", &self.channel)
            .field("pending", &self.pending())
            .finish()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

struct ForwardingTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Attaches host listeners to event channels.
///
/// Each attached channel owns one forwarding task, so a listener never sees
/// two payloads concurrently and sees one channel's events in publish order.
pub struct EventDispatcher {
    bus: EventBus,
    tasks: Mutex<HashMap<EventChannel, ForwardingTask>>,
}

impl EventDispatcher {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Start delivering `channel` events to `listener`, replacing any listener
    /// already attached to that channel.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn listen(&self, channel: EventChannel, listener: Arc<dyn EventListener>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::NoRuntime("EventDispatcher::listen must run inside a Tokio runtime".to_string())
        })?;

        // Tap before spawning so nothing emitted after `listen` returns is missed.
        let tap = self.bus.tap(channel);
        let token = CancellationToken::new();
        let handle = runtime.spawn(forward(tap, listener, token.clone()));

        let previous = self
            .lock_tasks()
            .insert(channel, ForwardingTask { token, handle });
        if let Some(previous) = previous {
            previous.token.cancel();
            debug!(channel = %channel, "Replaced event listener");
        } else {
            debug!(channel = %channel, "Event listener attached");
        }
        Ok(())
    }

    /// Detach the listener of `channel`. Returns whether one was attached.
    pub fn stop(&self, channel: EventChannel) -> bool {
        match self.lock_tasks().remove(&channel) {
            Some(task) => {
                task.token.cancel();
                debug!(channel = %channel, "Event listener detached");
                true
            }
            None => false,
        }
    }

    /// Detach and wait for the forwarding task to finish.
    pub async fn stop_and_wait(&self, channel: EventChannel) -> bool {
        let task = self.lock_tasks().remove(&channel);
        match task {
            Some(task) => {
                task.token.cancel();
                let _ = task.handle.await;
                true
            }
            None => false,
        }
    }

    pub fn is_listening(&self, channel: EventChannel) -> bool {
        self.lock_tasks().contains_key(&channel)
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, HashMap<EventChannel, ForwardingTask>> {
        // The map holds no invariants a panicking holder could break.
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        for (_, task) in self.lock_tasks().drain() {
            task.token.cancel();
        }
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels: Vec<EventChannel> = self.lock_tasks().keys().copied().collect();
        f.debug_struct("EventDispatcher")
            .field("bus", &self.bus)
            .field("channels", &channels)
            .finish()
    }
}

async fn forward(mut tap: EventTap, listener: Arc<dyn EventListener>, token: CancellationToken) {
    let channel = tap.channel();
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = tap.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event.to_payload() {
            Ok(payload) => listener.on_event(payload),
            Err(e) => warn!(channel = %channel, error = %e, "Failed to serialize event"),
        }
    }

    if tap.pending() > 0 {
        debug!(channel = %channel, dropped = tap.pending(), "Listener detached with events queued");
    }
    listener.on_detached();
}

// ============================================================================
// Tests
// ============================================================================
