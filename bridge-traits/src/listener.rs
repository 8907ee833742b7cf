//! Host Event Sink
//!
//! The managed layer receives asynchronous notifications (transfer progress,
//! socket data and lifecycle) through an [`EventListener`] it attaches per
//! event channel.

use serde_json::Value;

/// Event listener trait
///
/// Receives already-serialized event payloads. Calls for one channel are
/// serialized: the core never invokes `on_event` concurrently for the same
/// listener, so implementations can forward straight into a single-threaded
/// host messenger (Flutter `EventSink`, a JNI callback, a channel sender).
///
/// # Example
///
/// ```ignore
/// use bridge_traits::listener::EventListener;
///
/// struct PrintListener;
///
/// impl EventListener for PrintListener {
///     fn on_event(&self, event: serde_json::Value) {
///         println!("{event}");
///     }
/// }
/// ```
pub trait EventListener: Send + Sync {
    /// Deliver one event payload to the host.
    fn on_event(&self, event: Value);

    /// Called once when the listener is detached from its channel.
    fn on_detached(&self) {}
}
