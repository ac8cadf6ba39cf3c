use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use webview_ipc::{IpcError, RequestOptions};

use crate::context::FsContext;
use crate::error::FsError;
use crate::finalizer::{Finalize, Registration};
use crate::id::{Descriptor, HandleId};
use crate::table::Kind;

type Transition = Shared<BoxFuture<'static, Result<bool, FsError>>>;

/// Where a handle is in its open/close lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Idle,
    Opening,
    Open,
    Closing,
    Closed,
}

/// Notifications published to handle subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleEvent {
    Open(Descriptor),
    Close,
}

#[derive(Default)]
struct Lifecycle {
    opening: Option<Transition>,
    closing: Option<Transition>,
    closed: bool,
}

/// State shared by the file and directory handles: the id, the bound
/// descriptor and the in-flight transitions concurrent callers coalesce on.
pub(crate) struct HandleCore {
    pub(crate) id: HandleId,
    pub(crate) kind: Kind,
    pub(crate) path: Option<String>,
    pub(crate) ctx: FsContext,
    fd: Mutex<Option<Descriptor>>,
    lifecycle: Mutex<Lifecycle>,
    events: broadcast::Sender<HandleEvent>,
    disarmed: Arc<AtomicBool>,
    finalize: Arc<Mutex<Finalize>>,
}

impl std::fmt::Debug for HandleCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fd = self.fd();
        let state = self.state();
        f.debug_struct("HandleCore")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("fd", &fd)
            .field("state", &state)
            .finish()
    }
}

impl HandleCore {
    fn new(
        ctx: FsContext,
        id: HandleId,
        kind: Kind,
        path: Option<String>,
        fd: Option<Descriptor>,
        registration: &Registration,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            id,
            kind,
            path,
            ctx,
            fd: Mutex::new(fd),
            lifecycle: Default::default(),
            events,
            disarmed: registration.disarmed(),
            finalize: registration.finalize(),
        })
    }

    /// Builds the core of a new handle object along with its reclamation
    /// registration.
    pub(crate) fn attach(
        ctx: &FsContext,
        id: HandleId,
        kind: Kind,
        remote: bool,
        path: Option<String>,
        fd: Option<Descriptor>,
    ) -> (Arc<Self>, Arc<Registration>) {
        let finalize = Finalize {
            id,
            kind,
            remote,
            timeout: None,
        };
        let registration =
            Registration::new(finalize, ctx.table().clone(), ctx.reclaimer().clone());
        let core = Self::new(ctx.clone(), id, kind, path, fd, &registration);
        tracing::trace!(%id, ?kind, "handle created");
        (core, Arc::new(registration))
    }

    pub(crate) fn fd(&self) -> Option<Descriptor> {
        *self.fd.lock()
    }

    /// True while the table binding for the id is the one this handle holds.
    pub(crate) fn is_opened(&self) -> bool {
        match self.fd() {
            Some(fd) => self.ctx.table().get(self.id) == Some(fd),
            None => false,
        }
    }

    pub(crate) fn state(&self) -> HandleState {
        let lc = self.lifecycle.lock();
        if lc.closed {
            HandleState::Closed
        } else if lc.closing.is_some() {
            HandleState::Closing
        } else if lc.opening.is_some() {
            HandleState::Opening
        } else if self.is_opened() {
            HandleState::Open
        } else {
            HandleState::Idle
        }
    }

    /// Gate of every I/O operation.
    pub(crate) fn ensure_opened(&self) -> Result<(), FsError> {
        match self.state() {
            HandleState::Open => Ok(()),
            _ => Err(FsError::NotOpened),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<HandleEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: HandleEvent) {
        // nobody listening is fine
        self.events.send(event).ok();
    }

    /// Runs the open transition. `round_trip` is only invoked when this call
    /// starts the transition and yields the descriptor to bind.
    pub(crate) async fn open<F>(
        self: &Arc<Self>,
        options: &RequestOptions,
        round_trip: F,
    ) -> Result<bool, FsError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<Descriptor, FsError>>,
    {
        let transition = {
            let mut lc = self.lifecycle.lock();
            if lc.closing.is_some() {
                return Err(FsError::AlreadyClosing);
            }
            if lc.closed {
                return Err(FsError::AlreadyClosed);
            }
            if self.is_opened() {
                return Ok(true);
            }
            match lc.opening.clone() {
                Some(opening) => opening,
                None => {
                    if options.is_aborted() {
                        return Err(FsError::Aborted);
                    }
                    // a reclamation close reuses the options of the open
                    self.finalize.lock().timeout = options.timeout;
                    let core = self.clone();
                    let fut = round_trip();
                    let transition = detach(async move {
                        let ret = fut.await;
                        let mut lc = core.lifecycle.lock();
                        lc.opening = None;
                        let descriptor = ret?;

                        core.ctx.table().set(core.id, descriptor, core.kind);
                        *core.fd.lock() = Some(descriptor);
                        drop(lc);
                        tracing::debug!(
                            id = %core.id,
                            fd = %descriptor,
                            path = core.path.as_deref(),
                            "handle opened"
                        );
                        core.emit(HandleEvent::Open(descriptor));
                        core.reclaim_if_orphaned();
                        Ok(true)
                    });
                    lc.opening = Some(transition.clone());
                    transition
                }
            }
        };
        transition.await
    }

    /// Runs the close transition. `round_trip` is `None` for handles that
    /// have nothing to close on the host.
    pub(crate) async fn close<F>(
        self: &Arc<Self>,
        options: &RequestOptions,
        round_trip: F,
    ) -> Result<bool, FsError>
    where
        F: FnOnce() -> Option<BoxFuture<'static, Result<(), FsError>>>,
    {
        // never race an open
        let opening = self.lifecycle.lock().opening.clone();
        if let Some(opening) = opening {
            opening.await.ok();
        }

        let transition = {
            let mut lc = self.lifecycle.lock();
            match lc.closing.clone() {
                Some(closing) => closing,
                None => {
                    if !self.ctx.table().has(self.id) {
                        return Err(FsError::NotOpened);
                    }
                    if options.is_aborted() {
                        return Err(FsError::Aborted);
                    }
                    let core = self.clone();
                    let fut = round_trip();
                    let transition = detach(async move {
                        let ret = match fut {
                            Some(fut) => fut.await,
                            None => Ok(()),
                        };
                        let mut lc = core.lifecycle.lock();
                        lc.closing = None;
                        ret?;

                        core.ctx.table().release(core.id, false);
                        core.disarmed.store(true, Ordering::SeqCst);
                        *core.fd.lock() = None;
                        lc.opening = None;
                        lc.closed = true;
                        drop(lc);

                        tracing::debug!(id = %core.id, path = core.path.as_deref(), "handle closed");
                        core.emit(HandleEvent::Close);
                        Ok(true)
                    });
                    lc.closing = Some(transition.clone());
                    transition
                }
            }
        };
        transition.await
    }

    /// Every handle object for the id went away while the open was in
    /// flight, so nothing else will ever close the new binding.
    fn reclaim_if_orphaned(&self) {
        if self.ctx.table().refs(self.id) == 0 && !self.disarmed.load(Ordering::SeqCst) {
            tracing::trace!(id = %self.id, "opened after every handle was dropped");
            let finalize = self.finalize.lock().clone();
            self.ctx.reclaimer().schedule(finalize);
        }
    }
}

/// Spawns a transition so it completes even when every caller waiting on
/// it is dropped. Needs a tokio runtime.
fn detach<F>(fut: F) -> Transition
where
    F: std::future::Future<Output = Result<bool, FsError>> + Send + 'static,
{
    let task = tokio::spawn(fut);
    async move {
        task.await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "handle transition did not complete");
            Err(FsError::Ipc(IpcError::ConnectionAborted))
        })
    }
    .boxed()
    .shared()
}
