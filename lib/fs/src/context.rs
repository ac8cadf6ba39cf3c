use std::sync::Arc;

use webview_ipc::Boundary;

use crate::finalizer::{Reclaimer, ReclaimerDriver};
use crate::table::DescriptorTable;

/// What every handle needs: the boundary to the host, the descriptor table
/// and the reclamation queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FsContext {
    boundary: Arc<dyn Boundary>,
    table: DescriptorTable,
    reclaimer: Reclaimer,
}

impl FsContext {
    /// The returned driver must be run for dropped handles to be reclaimed.
    pub fn new(boundary: Arc<dyn Boundary>, table: DescriptorTable) -> (Self, ReclaimerDriver) {
        let (reclaimer, driver) = Reclaimer::new(boundary.clone(), table.clone());
        let ctx = Self {
            boundary,
            table,
            reclaimer,
        };
        (ctx, driver)
    }

    /// Context over the process-wide descriptor table.
    pub fn with_global_table(boundary: Arc<dyn Boundary>) -> (Self, ReclaimerDriver) {
        Self::new(boundary, DescriptorTable::global())
    }

    pub fn boundary(&self) -> &Arc<dyn Boundary> {
        &self.boundary
    }

    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    pub(crate) fn reclaimer(&self) -> &Reclaimer {
        &self.reclaimer
    }
}
