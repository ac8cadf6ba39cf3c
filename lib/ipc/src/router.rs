use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::client::RemoteBoundary;
use crate::config::BoundaryConfig;
use crate::error::HostError;
use crate::message::{Message, Payload, Reply};

/// Host-side implementation of one command.
pub trait CommandHandler: Send + Sync + 'static {
    fn call(&self, message: Message) -> BoxFuture<'static, Result<Payload, HostError>>;
}

impl<F, Fut> CommandHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Payload, HostError>> + Send + 'static,
{
    fn call(&self, message: Message) -> BoxFuture<'static, Result<Payload, HostError>> {
        Box::pin(self(message))
    }
}

/// The command table of the native host.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone, Default)]
pub struct Router {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn CommandHandler>>>>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        let mut commands: Vec<_> = handlers.keys().collect();
        commands.sort();
        f.debug_struct("Router").field("commands", &commands).finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `command`, replacing any previous one.
    pub fn map(&self, command: impl Into<String>, handler: impl CommandHandler) {
        self.handlers
            .write()
            .insert(command.into(), Arc::new(handler));
    }

    pub fn unmap(&self, command: &str) -> bool {
        self.handlers.write().remove(command).is_some()
    }

    pub fn has(&self, command: &str) -> bool {
        self.handlers.read().contains_key(command)
    }

    /// Runs the handler for a message and builds its reply.
    #[tracing::instrument(level = "debug", skip_all, fields(seq = message.seq, command = %message.command))]
    pub async fn invoke(&self, message: Message) -> Reply {
        let seq = message.seq;
        let handler = self.handlers.read().get(&message.command).cloned();
        let Some(handler) = handler else {
            tracing::debug!("no handler registered");
            return Reply::err(
                seq,
                HostError::with_code(
                    "NOT_FOUND_ERR",
                    format!("unsupported IPC message: {}", message.command),
                ),
            );
        };

        let reply = match handler.call(message).await {
            Ok(payload) => Reply::ok(seq, payload),
            Err(err) => {
                tracing::debug!(error = %err, "command failed");
                Reply::err(seq, err)
            }
        };
        reply.normalize()
    }

    /// Answers every message from `rx` on `tx`, each on its own task.
    ///
    /// Returns once `rx` is closed.
    pub async fn serve(self, mut rx: mpsc::Receiver<Message>, tx: mpsc::Sender<Reply>) {
        while let Some(message) = rx.recv().await {
            let router = self.clone();
            let tx = tx.clone();
            tokio::spawn(
                async move {
                    let reply = router.invoke(message).await;
                    if tx.send(reply).await.is_err() {
                        tracing::trace!("reply channel closed");
                    }
                }
                .in_current_span(),
            );
        }
    }
}

/// Wires a [`RemoteBoundary`] to `router` in-process.
///
/// The returned future drives both sides and must be spawned; it completes
/// once every clone of the boundary has been dropped.
pub fn connect(
    router: Router,
    config: &BoundaryConfig,
) -> (RemoteBoundary, impl Future<Output = ()> + Send + 'static) {
    let (tx_msg, rx_msg) = mpsc::channel(config.channel_capacity);
    let (tx_reply, rx_reply) = mpsc::channel(config.channel_capacity);
    let (boundary, driver) = RemoteBoundary::new_from_mpsc(tx_msg, rx_reply, config);
    let task = async move {
        futures::join!(driver, router.serve(rx_msg, tx_reply));
    };
    (boundary, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{Boundary, RequestOptions};
    use crate::error::IpcError;
    use crate::message::Params;
    use bytes::Bytes;
    use serde_json::json;

    fn echo_router() -> Router {
        let router = Router::new();
        router.map("echo", |msg: Message| async move {
            Ok::<_, HostError>(Payload::Json(json!({ "value": msg.get("value") })))
        });
        router.map("bytes", |msg: Message| async move {
            Ok::<_, HostError>(Payload::Binary(msg.bytes.unwrap_or_default()))
        });
        router
    }

    #[tokio::test]
    async fn unknown_command_is_not_found() {
        let reply = echo_router()
            .invoke(Message::new(1, "test", Params::new()))
            .await;
        let err = reply.result.unwrap_err();
        assert_eq!(err.code(), Some("NOT_FOUND_ERR"));
        assert_eq!(err.message, "unsupported IPC message: test");
    }

    #[tokio::test]
    async fn unmap_removes_handler() {
        let router = echo_router();
        assert!(router.has("echo"));
        assert!(router.unmap("echo"));
        assert!(!router.has("echo"));
        assert!(!router.unmap("echo"));
    }

    #[tokio::test]
    async fn connected_round_trip() {
        let (boundary, task) = connect(echo_router(), &BoundaryConfig::default());
        tokio::spawn(task);

        let res = boundary
            .request(
                "echo",
                Params::new().set("value", "hello"),
                RequestOptions::new(),
            )
            .await;
        assert_eq!(
            res.into_result().unwrap(),
            Payload::Json(json!({ "value": "hello" }))
        );

        let res = boundary
            .write(
                "bytes",
                Params::new(),
                Bytes::from_static(b"abc"),
                RequestOptions::new(),
            )
            .await;
        assert_eq!(res.content_type(), Some("application/octet-stream"));
        assert_eq!(
            res.into_result().unwrap(),
            Payload::Binary(Bytes::from_static(b"abc"))
        );

        let res = boundary
            .request("missing", Params::new(), RequestOptions::new())
            .await;
        assert!(matches!(res.into_result(), Err(IpcError::Host(_))));
    }

    #[tokio::test]
    async fn task_completes_when_boundary_dropped() {
        let (boundary, task) = connect(echo_router(), &BoundaryConfig::default());
        let handle = tokio::spawn(task);
        drop(boundary);
        handle.await.unwrap();
    }
}
