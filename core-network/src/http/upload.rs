//! Streamed request bodies for file uploads.
//!
//! [`UploadStream`] reports every chunk the transport pulls to a
//! [`ProgressEmitter`] and to a [`StallWatch`]. The watch fires when the
//! transport stops pulling for longer than the write timeout, since reqwest
//! only knows connect and read timeouts.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use tokio::time::{sleep, sleep_until, Instant};

use crate::progress::ProgressEmitter;

/// Upload chunk size.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullState {
    /// Nothing pulled yet; the connection is still being set up.
    Idle,
    Pulled(Instant),
    Done,
}

/// Detects an upload the transport stopped pulling.
#[derive(Debug, Clone)]
pub struct StallWatch {
    state: Arc<Mutex<PullState>>,
    timeout: Duration,
}

impl StallWatch {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(PullState::Idle)),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn pulled_at(&self, now: Instant) {
        let mut state = self.lock();
        if *state != PullState::Done {
            *state = PullState::Pulled(now);
        }
    }

    pub fn done(&self) {
        *self.lock() = PullState::Done;
    }

    /// Resolves once more than `timeout` passed since the last pull.
    /// Never resolves before the first pull or after [`StallWatch::done`].
    pub async fn stalled(&self) {
        loop {
            let state = *self.lock();
            match state {
                PullState::Idle => sleep(self.timeout).await,
                PullState::Pulled(at) => {
                    let deadline = at + self.timeout;
                    if Instant::now() >= deadline {
                        return;
                    }
                    sleep_until(deadline).await;
                }
                PullState::Done => std::future::pending::<()>().await,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, PullState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Byte stream of an upload source with progress and stall tracking.
pub struct UploadStream<S> {
    inner: S,
    total: u64,
    emitter: ProgressEmitter,
    watch: StallWatch,
}

impl<S> UploadStream<S> {
    pub fn new(inner: S, total: u64, emitter: ProgressEmitter, watch: StallWatch) -> Self {
        Self {
            inner,
            total,
            emitter,
            watch,
        }
    }

    fn complete(&mut self) {
        self.emitter.finish();
        self.watch.done();
    }
}

impl<S> Stream for UploadStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.watch.pulled_at(Instant::now());
                this.emitter.on_bytes(chunk.len());
                // The transport may never poll past the declared length.
                if this.emitter.transferred() >= this.total {
                    this.complete();
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                this.complete();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
