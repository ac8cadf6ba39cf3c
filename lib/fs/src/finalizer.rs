//! Best-effort closing of handles dropped without `close()`.
//!
//! Every handle object owns a [`Registration`]. When the last object for an
//! id is dropped while still armed, the registration queues a [`Finalize`]
//! record carrying only plain data. The [`ReclaimerDriver`] then closes the
//! descriptor on the host if the table still has it bound.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use webview_ipc::{Boundary, Params, RequestOptions};

use crate::id::HandleId;
use crate::table::{DescriptorTable, Kind};

/// What the reclamation path knows about a dropped handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalize {
    pub id: HandleId,
    pub kind: Kind,
    /// Whether the host holds anything to close.
    pub remote: bool,
    /// Timeout of the open, reused for the close.
    pub timeout: Option<Duration>,
}

impl Finalize {
    fn command(&self) -> &'static str {
        match self.kind {
            Kind::File => "fs.close",
            Kind::Directory => "fs.closedir",
        }
    }
}

/// Sending side of the reclamation queue.
#[derive(Debug, Clone)]
pub struct Reclaimer {
    tx: mpsc::UnboundedSender<Finalize>,
}

impl Reclaimer {
    pub fn new(boundary: Arc<dyn Boundary>, table: DescriptorTable) -> (Self, ReclaimerDriver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ReclaimerDriver { rx, boundary, table })
    }

    pub fn schedule(&self, finalize: Finalize) {
        if self.tx.send(finalize).is_err() {
            tracing::trace!("reclaimer is gone, dropping finalization");
        }
    }
}

/// Processes queued finalizations. Errors are logged and swallowed.
#[derive(Debug)]
pub struct ReclaimerDriver {
    rx: mpsc::UnboundedReceiver<Finalize>,
    boundary: Arc<dyn Boundary>,
    table: DescriptorTable,
}

impl ReclaimerDriver {
    /// Runs until every [`Reclaimer`] has been dropped.
    pub async fn run(mut self) {
        while let Some(finalize) = self.rx.recv().await {
            self.finalize(finalize).await;
        }
    }

    /// Handles whatever is queued right now and returns how many records
    /// were processed.
    pub async fn run_until_idle(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(finalize) = self.rx.try_recv() {
            self.finalize(finalize).await;
            processed += 1;
        }
        processed
    }

    /// Returns whether a descriptor was still bound and got closed.
    async fn finalize(&self, finalize: Finalize) -> bool {
        if !self.table.has(finalize.id) {
            return false;
        }

        tracing::warn!(id = %finalize.id, kind = ?finalize.kind, "closing handle on reclamation");
        if finalize.remote {
            let mut options = RequestOptions::new();
            options.timeout = finalize.timeout;
            let res = self
                .boundary
                .request(
                    finalize.command(),
                    Params::new().set("id", finalize.id),
                    options,
                )
                .await;
            if let Err(err) = res.result {
                tracing::debug!(id = %finalize.id, error = %err, "reclamation close failed");
            }
        }
        self.table.release(finalize.id, false);
        true
    }
}

/// Ties one handle object to the reclamation queue.
#[derive(Debug)]
pub(crate) struct Registration {
    finalize: Arc<Mutex<Finalize>>,
    table: DescriptorTable,
    reclaimer: Reclaimer,
    disarmed: Arc<AtomicBool>,
}

impl Registration {
    pub(crate) fn new(finalize: Finalize, table: DescriptorTable, reclaimer: Reclaimer) -> Self {
        table.retain(finalize.id);
        Self {
            finalize: Arc::new(Mutex::new(finalize)),
            table,
            reclaimer,
            disarmed: Default::default(),
        }
    }

    /// Flag the handle sets once it closed explicitly.
    pub(crate) fn disarmed(&self) -> Arc<AtomicBool> {
        self.disarmed.clone()
    }

    /// The record scheduled on drop, updated as the handle opens.
    pub(crate) fn finalize(&self) -> Arc<Mutex<Finalize>> {
        self.finalize.clone()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let finalize = self.finalize.lock().clone();
        let remaining = self.table.unref(finalize.id);
        if remaining == 0 && !self.disarmed.load(Ordering::SeqCst) {
            self.reclaimer.schedule(finalize);
        }
    }
}
