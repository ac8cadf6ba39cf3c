use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::id::{Descriptor, HandleId};

static GLOBAL: Lazy<DescriptorTable> = Lazy::new(DescriptorTable::default);

/// What a descriptor refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub descriptor: Descriptor,
    pub kind: Kind,
}

#[derive(Debug, Default)]
struct TableInner {
    entries: HashMap<HandleId, Entry>,
    /// Reverse index, survives a plain release.
    ids: HashMap<Descriptor, HandleId>,
    /// Live handle objects per id.
    refs: HashMap<HandleId, usize>,
}

/// Registry of the ids bound to native descriptors.
///
/// Every operation takes the one table lock, so the table can be shared
/// between the handle tasks and the reclamation path.
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    inner: Arc<Mutex<TableInner>>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table.
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    /// Binds `id`, replacing whatever it was bound to.
    pub fn set(&self, id: HandleId, descriptor: Descriptor, kind: Kind) {
        let mut inner = self.inner.lock();
        if let Some(prev) = inner.entries.insert(id, Entry { descriptor, kind }) {
            if prev.descriptor != descriptor && inner.ids.get(&prev.descriptor) == Some(&id) {
                inner.ids.remove(&prev.descriptor);
            }
        }
        inner.ids.insert(descriptor, id);
    }

    pub fn get(&self, id: HandleId) -> Option<Descriptor> {
        self.inner.lock().entries.get(&id).map(|e| e.descriptor)
    }

    pub fn entry(&self, id: HandleId) -> Option<Entry> {
        self.inner.lock().entries.get(&id).copied()
    }

    pub fn has(&self, id: HandleId) -> bool {
        self.inner.lock().entries.contains_key(&id)
    }

    /// Reverse lookup of the id a descriptor was bound under.
    pub fn id(&self, descriptor: Descriptor) -> Option<HandleId> {
        self.inner.lock().ids.get(&descriptor).copied()
    }

    /// Clears the binding of `id`. Unless `forget` is set the reverse index
    /// keeps remembering which id the descriptor belonged to.
    pub fn release(&self, id: HandleId, forget: bool) -> Option<Entry> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.remove(&id);
        if forget {
            inner.ids.retain(|_, v| *v != id);
            inner.refs.remove(&id);
        }
        entry
    }

    /// Counts one more live handle object for `id`.
    pub fn retain(&self, id: HandleId) -> usize {
        let mut inner = self.inner.lock();
        let refs = inner.refs.entry(id).or_default();
        *refs += 1;
        *refs
    }

    /// Counts one handle object less, returning how many remain.
    pub fn unref(&self, id: HandleId) -> usize {
        let mut inner = self.inner.lock();
        match inner.refs.get_mut(&id) {
            Some(refs) if *refs > 1 => {
                *refs -= 1;
                *refs
            }
            Some(_) => {
                inner.refs.remove(&id);
                0
            }
            None => 0,
        }
    }

    pub fn refs(&self, id: HandleId) -> usize {
        self.inner.lock().refs.get(&id).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
