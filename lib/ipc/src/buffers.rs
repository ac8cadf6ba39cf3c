use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;

/// Request bodies posted ahead of the request that consumes them, keyed by
/// the sequence string the webview attaches to that request.
#[derive(Debug, Clone, Default)]
pub struct BufferStore {
    buffers: Arc<DashMap<String, Bytes>>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, seq: impl Into<String>, bytes: Bytes) {
        self.buffers.insert(seq.into(), bytes);
    }

    pub fn get(&self, seq: &str) -> Option<Bytes> {
        self.buffers.get(seq).map(|b| b.value().clone())
    }

    pub fn take(&self, seq: &str) -> Option<Bytes> {
        self.buffers.remove(seq).map(|(_, b)| b)
    }

    pub fn contains(&self, seq: &str) -> bool {
        self.buffers.contains_key(seq)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_consumes() {
        let store = BufferStore::new();
        store.put("R1", Bytes::from_static(b"body"));
        assert_eq!(store.get("R1").unwrap(), "body");
        assert!(store.contains("R1"));
        assert_eq!(store.take("R1").unwrap(), "body");
        assert!(store.is_empty());
        assert_eq!(store.take("R1"), None);
    }
}
