//! # Socket Session Manager
//!
//! Persistent raw TCP sessions keyed by a caller-chosen id.
//!
//! ```text
//! open ──> Connecting ──connect ok──> Open ──close / EOF / error──> Closing ──> (removed)
//!              │
//!              └──connect failed / closed──> (removed)
//! ```
//!
//! An open session runs exactly two tasks: a receive worker publishing `data`
//! events and a send worker draining a bounded FIFO queue. The session table is
//! the only structure shared between sessions; entries carry a generation so a
//! finished session can never remove a newer one that reuses its id.

mod session;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use core_runtime::config::SocketSettings;
use core_runtime::events::{EventBus, SocketEvent};
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::binder::{connect_via, BoundNetworkRegistry};
use crate::error::SocketError;
use session::{receive_loop, send_loop, Teardown, WriteFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
}

struct SessionEntry {
    generation: u64,
    state: SessionState,
    token: CancellationToken,
    send_tx: Option<mpsc::Sender<Bytes>>,
    /// Cancelled once the session is fully cleaned up.
    finished: CancellationToken,
}

pub(crate) struct Inner {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    registry: BoundNetworkRegistry,
    bus: EventBus,
    settings: SocketSettings,
    next_generation: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn emit(&self, event: SocketEvent) {
        self.bus.emit(event).ok();
    }

    /// Remove the entry of `socket_id` if it still belongs to `generation`.
    pub(crate) fn release(&self, socket_id: &str, generation: u64) -> bool {
        let mut sessions = self.lock();
        match sessions.get(socket_id) {
            Some(entry) if entry.generation == generation => {
                sessions.remove(socket_id);
                true
            }
            _ => false,
        }
    }
}

/// Acknowledgment of an `open` call.
///
/// Resolves once the connection attempt ends.
#[derive(Debug)]
pub struct OpenAck {
    socket_id: String,
    rx: oneshot::Receiver<bool>,
}

impl OpenAck {
    pub fn socket_id(&self) -> &str {
        &self.socket_id
    }

    /// The socket id when the session opened, `None` when the connection
    /// failed or the session was closed while connecting.
    pub async fn opened(self) -> Option<String> {
        match self.rx.await {
            Ok(true) => Some(self.socket_id),
            _ => None,
        }
    }
}

/// Owns every raw socket session of one service.
#[derive(Clone)]
pub struct SocketManager {
    inner: Arc<Inner>,
}

impl SocketManager {
    pub fn new(registry: BoundNetworkRegistry, bus: EventBus, settings: SocketSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                registry,
                bus,
                settings,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Start connecting `socket_id` to `host:port` through the bound network.
    ///
    /// Fails synchronously only when no network is bound, the id is taken, or
    /// there is no runtime. Connection failures arrive as an `error` event.
    #[instrument(skip(self))]
    pub fn open(
        &self,
        socket_id: &str,
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
    ) -> Result<OpenAck, SocketError> {
        let network = self
            .inner
            .registry
            .current()
            .ok_or(SocketError::NoBoundNetwork)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SocketError::Runtime(e.to_string()))?;

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let finished = CancellationToken::new();

        {
            let mut sessions = self.inner.lock();
            if sessions.contains_key(socket_id) {
                return Err(SocketError::InUse(socket_id.to_string()));
            }
            sessions.insert(
                socket_id.to_string(),
                SessionEntry {
                    generation,
                    state: SessionState::Connecting,
                    token: token.clone(),
                    send_tx: None,
                    finished: finished.clone(),
                },
            );
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        let attempt = ConnectAttempt {
            inner: self.inner.clone(),
            socket_id: socket_id.to_string(),
            generation,
            host: host.to_string(),
            port,
            timeout: connect_timeout.unwrap_or(self.inner.settings.connect_timeout),
            token,
            finished,
        };
        runtime.spawn(async move {
            let opened = attempt.run(network).await;
            // The caller may have stopped waiting.
            let _ = ack_tx.send(opened);
        });

        debug!(socket_id, "Socket connecting");
        Ok(OpenAck {
            socket_id: socket_id.to_string(),
            rx: ack_rx,
        })
    }

    /// Queue `data` for the session without waiting.
    pub fn send(&self, socket_id: &str, data: Bytes) -> Result<(), SocketError> {
        let sender = {
            let sessions = self.inner.lock();
            sessions
                .get(socket_id)
                .filter(|entry| entry.state == SessionState::Open)
                .and_then(|entry| entry.send_tx.clone())
        }
        .ok_or_else(|| SocketError::NoConnection(socket_id.to_string()))?;

        sender.try_send(data).map_err(|e| {
            warn!(socket_id, error = %e, "Send queue rejected buffer");
            SocketError::QueueFull(socket_id.to_string())
        })
    }

    /// Close the session and wait until it is fully cleaned up.
    ///
    /// Always acknowledges, including for unknown ids.
    #[instrument(skip(self))]
    pub async fn close(&self, socket_id: &str) -> bool {
        let finished = {
            let mut sessions = self.inner.lock();
            let Some(state) = sessions.get(socket_id).map(|entry| entry.state) else {
                debug!("Close for unknown socket");
                return true;
            };

            if state == SessionState::Connecting {
                if let Some(entry) = sessions.remove(socket_id) {
                    entry.token.cancel();
                    entry.finished.cancel();
                }
                info!("Socket closed while connecting");
                return true;
            }

            match sessions.get_mut(socket_id) {
                Some(entry) => {
                    entry.state = SessionState::Closing;
                    entry.send_tx = None;
                    entry.token.cancel();
                    entry.finished.clone()
                }
                None => return true,
            }
        };

        finished.cancelled().await;
        true
    }

    /// Close every session.
    pub async fn close_all(&self) {
        let ids = self.active_sessions();
        join_all(ids.iter().map(|id| self.close(id))).await;
    }

    pub fn session_state(&self, socket_id: &str) -> Option<SessionState> {
        self.inner.lock().get(socket_id).map(|entry| entry.state)
    }

    /// Ids of all sessions in the table, sorted.
    pub fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for SocketManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketManager")
            .field("settings", &self.inner.settings)
            .field("sessions", &self.active_sessions())
            .finish()
    }
}

struct ConnectAttempt {
    inner: Arc<Inner>,
    socket_id: String,
    generation: u64,
    host: String,
    port: u16,
    timeout: Duration,
    token: CancellationToken,
    finished: CancellationToken,
}

impl ConnectAttempt {
    async fn run(self, network: bridge_traits::network::NetworkHandle) -> bool {
        let connected = tokio::select! {
            biased;
            _ = self.token.cancelled() => return false,
            result = timeout(self.timeout, connect_via(&network, &self.host, self.port)) => result,
        };

        let stream = match connected {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return self.fail(e.to_string()),
            Err(_) => {
                let message = format!(
                    "Connection to {}:{} timed out after {} ms",
                    self.host,
                    self.port,
                    self.timeout.as_millis()
                );
                return self.fail(message);
            }
        };

        let settings = self.inner.settings;
        let (send_tx, send_rx) = mpsc::channel(settings.send_queue_capacity);
        {
            let mut sessions = self.inner.lock();
            match sessions.get_mut(&self.socket_id) {
                Some(entry)
                    if entry.generation == self.generation
                        && entry.state == SessionState::Connecting =>
                {
                    entry.state = SessionState::Open;
                    entry.send_tx = Some(send_tx);
                }
                _ => {
                    debug!(socket_id = %self.socket_id, "Session closed before connect completed");
                    return false;
                }
            }
        }

        info!(socket_id = %self.socket_id, network = %network, "Socket opened");

        let (reader, writer) = stream.into_split();
        let failure = WriteFailure::default();
        let send_worker = tokio::spawn(send_loop(
            self.socket_id.clone(),
            writer,
            send_rx,
            self.token.clone(),
            failure.clone(),
        ));
        tokio::spawn(receive_loop(
            reader,
            settings.receive_buffer_size,
            send_worker,
            Teardown {
                inner: self.inner,
                socket_id: self.socket_id,
                generation: self.generation,
                token: self.token,
                finished: self.finished,
                failure,
            },
        ));
        true
    }

    fn fail(self, message: String) -> bool {
        warn!(socket_id = %self.socket_id, error = %message, "Socket connect failed");
        self.inner
            .emit(SocketEvent::error(self.socket_id.as_str(), message));
        self.inner.release(&self.socket_id, self.generation);
        self.finished.cancel();
        false
    }
}
