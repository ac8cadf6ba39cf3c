use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::boundary::{Boundary, RequestOptions, Response};
use crate::config::BoundaryConfig;
use crate::error::IpcError;
use crate::message::{Message, Params, Reply, Seq};

/// The requesting side of the boundary.
///
/// Messages go out over `tx`; replies come back through the
/// [`BoundaryDriver`], which must be polled (usually spawned) for any
/// request to complete.
#[derive(Debug, Clone)]
pub struct RemoteBoundary {
    common: Arc<RemoteCommon>,
}

impl RemoteBoundary {
    /// Creates a client over a pair of channels.
    pub fn new_from_mpsc(
        tx: mpsc::Sender<Message>,
        rx: mpsc::Receiver<Reply>,
        config: &BoundaryConfig,
    ) -> (Self, BoundaryDriver) {
        let common = Arc::new(RemoteCommon {
            tx,
            seq_seed: AtomicU64::new(1),
            requests: Default::default(),
            timeout: config.timeout(),
        });

        let driver = BoundaryDriver {
            rx,
            common: Arc::downgrade(&common),
        };
        (Self { common }, driver)
    }

    /// Number of requests still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.common.requests.lock().len()
    }

    /// Synchronous form of [`Boundary::request`], blocking the calling thread.
    ///
    /// Must not be called from a current-thread runtime that is also
    /// polling the [`BoundaryDriver`]; that thread would never see the reply.
    pub fn request_blocking(
        &self,
        command: &str,
        params: Params,
        options: RequestOptions,
    ) -> Response {
        let fut = self.common.io_iface(command, params, None, options);
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(fut))
            }
            Ok(_) => futures::executor::block_on(fut),
            Err(_) => match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(rt) => rt.block_on(fut),
                Err(err) => {
                    tracing::warn!("failed to build a runtime for a blocking request - {}", err);
                    Response::err(IpcError::ConnectionAborted)
                }
            },
        }
    }
}

#[async_trait::async_trait]
impl Boundary for RemoteBoundary {
    async fn request(&self, command: &str, params: Params, options: RequestOptions) -> Response {
        self.common.io_iface(command, params, None, options).await
    }

    async fn write(
        &self,
        command: &str,
        params: Params,
        bytes: Bytes,
        options: RequestOptions,
    ) -> Response {
        self.common
            .io_iface(command, params, Some(bytes), options)
            .await
    }
}

#[derive(Debug)]
struct RemoteCommon {
    tx: mpsc::Sender<Message>,
    seq_seed: AtomicU64,
    requests: Mutex<HashMap<Seq, oneshot::Sender<Reply>>>,
    timeout: Duration,
}

impl RemoteCommon {
    async fn io_iface(
        &self,
        command: &str,
        params: Params,
        bytes: Option<Bytes>,
        options: RequestOptions,
    ) -> Response {
        if options.is_aborted() {
            return Response::err(IpcError::Aborted);
        }

        let seq = self.seq_seed.fetch_add(1, Ordering::SeqCst);
        let reply_rx = {
            let (tx, rx) = oneshot::channel();
            self.requests.lock().insert(seq, tx);
            rx
        };
        // clears the entry however this future ends, including being dropped
        let _pending = PendingGuard {
            requests: &self.requests,
            seq,
        };

        let mut msg = Message::new(seq, command, params);
        msg.bytes = bytes;
        tracing::trace!(seq, command, "sending request");
        if self.tx.send(msg).await.is_err() {
            return Response::err(IpcError::ConnectionAborted);
        }

        let timeout = options.timeout.unwrap_or(self.timeout);
        let signal = options.signal.unwrap_or_else(CancellationToken::new);
        let ret = tokio::select! {
            ret = tokio::time::timeout(timeout, reply_rx) => match ret {
                Ok(Ok(reply)) => Ok(reply),
                Ok(Err(_)) => Err(IpcError::ConnectionAborted),
                Err(_) => Err(IpcError::Timeout),
            },
            _ = signal.cancelled() => Err(IpcError::Aborted),
        };

        match ret {
            Ok(reply) => reply.into(),
            Err(err) => {
                tracing::debug!(seq, command, error = %err, "request did not complete");
                Response::err(err)
            }
        }
    }
}

struct PendingGuard<'a> {
    requests: &'a Mutex<HashMap<Seq, oneshot::Sender<Reply>>>,
    seq: Seq,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.requests.lock().remove(&self.seq);
    }
}

/// Routes replies to the callers waiting on them.
///
/// Resolves once the reply channel closes; every request still in flight
/// then fails with [`IpcError::ConnectionAborted`]. The driver does not keep
/// the client alive, so dropping every [`RemoteBoundary`] clone closes the
/// outbound channel.
#[must_use = "the driver must be polled for requests to complete"]
#[derive(Debug)]
pub struct BoundaryDriver {
    rx: mpsc::Receiver<Reply>,
    common: Weak<RemoteCommon>,
}

impl Future for BoundaryDriver {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match Pin::new(&mut self.rx).poll_recv(cx) {
                Poll::Ready(Some(reply)) => {
                    let seq = reply.seq;
                    let Some(common) = self.common.upgrade() else {
                        continue;
                    };
                    let tx = common.requests.lock().remove(&seq);
                    match tx {
                        Some(tx) => {
                            // the caller may have timed out in the meantime
                            tx.send(reply).ok();
                        }
                        None => {
                            tracing::trace!(seq, "dropping reply for an unknown request");
                        }
                    }
                }
                Poll::Ready(None) => {
                    if let Some(common) = self.common.upgrade() {
                        common.requests.lock().clear();
                    }
                    return Poll::Ready(());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
