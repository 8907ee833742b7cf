use std::sync::Arc;
use std::time::Duration;

use bridge_traits::listener::EventListener;
use bridge_traits::network::NetworkHandle;
use bytes::Bytes;
use core_network::{
    BoundNetworkRegistry, HttpEngine, HttpRequestSpec, HttpResult, NetworkBinder, SocketManager,
};
use core_runtime::config::BridgeConfig;
use core_runtime::events::{EventBus, EventChannel, EventDispatcher};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::command::{Command, CommandReply};
use crate::error::{CommandError, ErrorCode, Result};

/// Command surface of the native network bridge.
///
/// One instance owns the bound network, the socket session table and the
/// event dispatcher. Hosts that need several independent bridges create
/// several services.
pub struct NativeNetworkService {
    binder: NetworkBinder,
    engine: Arc<HttpEngine>,
    sockets: SocketManager,
    dispatcher: EventDispatcher,
}

impl NativeNetworkService {
    pub fn new(config: BridgeConfig) -> Self {
        let bus = EventBus::new(config.event_buffer_size);
        let registry = BoundNetworkRegistry::new();

        let binder = NetworkBinder::new(config.network_enumerator.clone(), registry.clone());
        let engine = Arc::new(HttpEngine::new(registry.clone(), bus.clone(), &config));
        let sockets = SocketManager::new(registry, bus.clone(), config.socket);
        let dispatcher = EventDispatcher::new(bus);

        info!(
            event_buffer_size = config.event_buffer_size,
            send_queue_capacity = config.socket.send_queue_capacity,
            "Native network service created"
        );

        Self {
            binder,
            engine,
            sockets,
            dispatcher,
        }
    }

    pub fn bus(&self) -> &EventBus {
        self.dispatcher.bus()
    }

    pub fn sockets(&self) -> &SocketManager {
        &self.sockets
    }

    /// `"<os> <arch>"` of the running process.
    pub fn platform_version(&self) -> String {
        format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
    }

    pub async fn bind_to_wifi_network(&self, ssid: &str) -> Result<NetworkHandle> {
        Ok(self.binder.bind(ssid).await?)
    }

    pub fn unbind_network(&self) -> Option<NetworkHandle> {
        self.binder.unbind()
    }

    pub fn bound_network(&self) -> Option<NetworkHandle> {
        self.binder.current()
    }

    /// Execute `spec` on its own task.
    pub async fn http_request(&self, spec: HttpRequestSpec) -> Result<HttpResult> {
        let engine = Arc::clone(&self.engine);
        let request_id = spec.request_id.clone();

        let task = tokio::spawn(async move { engine.execute(spec).await });
        match task.await {
            Ok(result) => Ok(result?),
            Err(e) => Err(CommandError::new(
                ErrorCode::Internal,
                format!("HTTP request {} aborted: {}", request_id, e),
            )),
        }
    }

    /// Returns the socket id once connected, `None` when the attempt failed
    /// (the failure arrives as an `error` socket event).
    pub async fn open_socket(
        &self,
        socket_id: &str,
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
    ) -> Result<Option<String>> {
        let ack = self.sockets.open(socket_id, host, port, connect_timeout)?;
        Ok(ack.opened().await)
    }

    pub fn send_socket(&self, socket_id: &str, data: Bytes) -> Result<bool> {
        self.sockets.send(socket_id, data)?;
        Ok(true)
    }

    pub async fn close_socket(&self, socket_id: &str) -> bool {
        self.sockets.close(socket_id).await
    }

    /// Deliver `channel` events to `listener`, replacing the previous one.
    pub fn listen(&self, channel: EventChannel, listener: Arc<dyn EventListener>) -> Result<()> {
        Ok(self.dispatcher.listen(channel, listener)?)
    }

    pub fn stop_listening(&self, channel: EventChannel) -> bool {
        self.dispatcher.stop(channel)
    }

    /// Close every socket session and detach all listeners.
    pub async fn shutdown(&self) {
        self.sockets.close_all().await;
        for channel in [EventChannel::Transfer, EventChannel::Socket] {
            self.dispatcher.stop_and_wait(channel).await;
        }
        info!("Native network service shut down");
    }

    /// Run one decoded command.
    #[instrument(skip(self, command), fields(method = command.method()))]
    pub async fn execute(&self, command: Command) -> Result<Value> {
        match command {
            Command::GetPlatformVersion => Ok(json!(self.platform_version())),
            Command::BindToWiFiNetwork(args) => {
                let ssid = args.ssid.unwrap_or_default();
                let handle = self.bind_to_wifi_network(&ssid).await?;
                Ok(json!(handle.handle))
            }
            Command::HttpRequest(args) => {
                let spec = args.into_spec()?;
                let result = self.http_request(spec).await?;
                serde_json::to_value(result)
                    .map_err(|e| CommandError::new(ErrorCode::Internal, e.to_string()))
            }
            Command::OpenSocket(args) => {
                let timeout = args.connection_timeout_milliseconds.map(Duration::from_millis);
                let opened = self
                    .open_socket(&args.socket_id, &args.host, args.port, timeout)
                    .await?;
                Ok(json!(opened))
            }
            Command::SendSocket(args) => {
                let sent = self.send_socket(&args.socket_id, Bytes::from(args.data))?;
                Ok(json!(sent))
            }
            Command::CloseSocket(args) => Ok(json!(self.close_socket(&args.socket_id).await)),
        }
    }

    /// Decode, run and encode one JSON command.
    pub async fn handle_json(&self, json: &str) -> String {
        let result = match Command::from_json(json) {
            Ok(command) => self.execute(command).await,
            Err(error) => Err(error),
        };
        if let Err(error) = &result {
            debug!(code = %error.code, message = %error.message, "Command failed");
        }
        CommandReply::from(result).to_json()
    }
}

impl std::fmt::Debug for NativeNetworkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeNetworkService")
            .field("bound_network", &self.binder.current())
            .field("sockets", &self.sockets)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
