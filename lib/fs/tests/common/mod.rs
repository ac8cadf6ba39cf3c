#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use webview_fs::{DescriptorTable, FsContext, ReclaimerDriver};
use webview_ipc::{Boundary, IpcError, Message, Params, RequestOptions, Response, Router};

/// A boundary that answers through a router in-process and counts the
/// round-trips per command.
#[derive(Debug, Clone, Default)]
pub struct FakeBoundary {
    router: Router,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    last: Arc<Mutex<HashMap<String, (Params, Option<Duration>)>>>,
}

impl FakeBoundary {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            calls: Default::default(),
            last: Default::default(),
        }
    }

    /// Params of the latest request for `command`.
    pub fn last_params(&self, command: &str) -> Option<Params> {
        self.last.lock().get(command).map(|(params, _)| params.clone())
    }

    /// Timeout the latest request for `command` was sent with.
    pub fn last_timeout(&self, command: &str) -> Option<Duration> {
        self.last.lock().get(command).and_then(|(_, timeout)| *timeout)
    }

    pub fn calls(&self, command: &str) -> usize {
        self.calls.lock().get(command).copied().unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    async fn dispatch(
        &self,
        command: &str,
        params: Params,
        bytes: Option<Bytes>,
        options: RequestOptions,
    ) -> Response {
        *self.calls.lock().entry(command.to_string()).or_default() += 1;
        self.last
            .lock()
            .insert(command.to_string(), (params.clone(), options.timeout));
        if options.is_aborted() {
            return Response::err(IpcError::Aborted);
        }
        let mut message = Message::new(0, command, params);
        if let Some(bytes) = bytes {
            message = message.with_bytes(bytes);
        }
        self.router.invoke(message).await.into()
    }
}

#[async_trait::async_trait]
impl Boundary for FakeBoundary {
    async fn request(&self, command: &str, params: Params, options: RequestOptions) -> Response {
        self.dispatch(command, params, None, options).await
    }

    async fn write(
        &self,
        command: &str,
        params: Params,
        bytes: Bytes,
        options: RequestOptions,
    ) -> Response {
        self.dispatch(command, params, Some(bytes), options).await
    }
}

/// A context over a fresh table, so tests do not share bindings.
pub fn context(boundary: &FakeBoundary) -> (FsContext, ReclaimerDriver) {
    FsContext::new(Arc::new(boundary.clone()), DescriptorTable::new())
}
