//! The two long-lived workers of an open session.
//!
//! The receive worker owns the session's end of life: whatever stops the
//! session (close, EOF, a read or write failure), it waits for the send worker,
//! reports the failure, emits the single `disconnected` event and releases
//! the table entry.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use core_runtime::events::SocketEvent;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::Inner;

/// Failure recorded by the send worker for the receive worker to report.
#[derive(Debug, Clone, Default)]
pub(super) struct WriteFailure(Arc<Mutex<Option<String>>>);

impl WriteFailure {
    fn record(&self, message: String) {
        let mut slot = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.get_or_insert(message);
    }

    fn take(&self) -> Option<String> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

/// Everything the receive worker needs to tear the session down.
pub(super) struct Teardown {
    pub inner: Arc<Inner>,
    pub socket_id: String,
    pub generation: u64,
    pub token: CancellationToken,
    pub finished: CancellationToken,
    pub failure: WriteFailure,
}

pub(super) async fn send_loop(
    socket_id: String,
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Bytes>,
    token: CancellationToken,
    failure: WriteFailure,
) {
    loop {
        let data = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = queue.recv() => match next {
                Some(data) => data,
                None => break,
            },
        };

        let written = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = write_flushed(&mut writer, &data) => result,
        };

        match written {
            Ok(()) => trace!(socket_id = %socket_id, bytes = data.len(), "Socket write"),
            Err(e) => {
                warn!(socket_id = %socket_id, error = %e, "Socket write failed");
                failure.record(e.to_string());
                token.cancel();
                break;
            }
        }
    }

    // Queued buffers are discarded with the receiver.
    drop(queue);
    if let Err(e) = writer.shutdown().await {
        debug!(socket_id = %socket_id, error = %e, "Socket shutdown failed");
    }
}

async fn write_flushed(writer: &mut OwnedWriteHalf, data: &[u8]) -> std::io::Result<()> {
    writer.write_all(data).await?;
    writer.flush().await
}

pub(super) async fn receive_loop(
    mut reader: OwnedReadHalf,
    buffer_size: usize,
    send_worker: JoinHandle<()>,
    teardown: Teardown,
) {
    let Teardown {
        inner,
        socket_id,
        generation,
        token,
        finished,
        failure,
    } = teardown;

    let mut buffer = vec![0u8; buffer_size];
    let mut read_error = None;

    loop {
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            read = reader.read(&mut buffer) => read,
        };

        match read {
            Ok(0) => {
                debug!(socket_id = %socket_id, "Remote closed the connection");
                break;
            }
            Ok(n) => {
                trace!(socket_id = %socket_id, bytes = n, "Socket read");
                inner.emit(SocketEvent::data(
                    socket_id.as_str(),
                    Bytes::copy_from_slice(&buffer[..n]),
                ));
            }
            Err(e) => {
                warn!(socket_id = %socket_id, error = %e, "Socket read failed");
                read_error = Some(e.to_string());
                break;
            }
        }
    }

    token.cancel();
    if let Err(e) = send_worker.await {
        warn!(socket_id = %socket_id, error = %e, "Send worker ended abnormally");
    }
    drop(reader);

    if let Some(message) = read_error.or_else(|| failure.take()) {
        inner.emit(SocketEvent::error(socket_id.as_str(), message));
    }
    inner.emit(SocketEvent::disconnected(socket_id.as_str()));
    inner.release(&socket_id, generation);
    finished.cancel();

    info!(socket_id = %socket_id, "Socket session closed");
}
