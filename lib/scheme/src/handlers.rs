use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::Instrument;
use webview_ipc::BufferStore;

use crate::config::BridgeConfig;
use crate::request::ResourceRequest;
use crate::response::{ResourceResponse, ResponseDescriptor};

/// Application logic serving one scheme.
///
/// `handle` returns whether it takes the request. A handler that takes it
/// must eventually call [`ResourceResponse::finish`].
pub trait SchemeHandler: Send + Sync + 'static {
    fn handle(&self, request: Arc<ResourceRequest>, response: ResourceResponse) -> bool;
}

impl<F> SchemeHandler for F
where
    F: Fn(Arc<ResourceRequest>, ResourceResponse) -> bool + Send + Sync + 'static,
{
    fn handle(&self, request: Arc<ResourceRequest>, response: ResourceResponse) -> bool {
        self(request, response)
    }
}

/// Runs an async handler on a tokio runtime, away from the loading thread.
pub struct AsyncSchemeHandler<F> {
    runtime: tokio::runtime::Handle,
    f: F,
}

impl<F> AsyncSchemeHandler<F> {
    pub fn new(runtime: tokio::runtime::Handle, f: F) -> Self {
        Self { runtime, f }
    }
}

impl<F> fmt::Debug for AsyncSchemeHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSchemeHandler").finish_non_exhaustive()
    }
}

impl<F, Fut> SchemeHandler for AsyncSchemeHandler<F>
where
    F: Fn(Arc<ResourceRequest>, ResourceResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, request: Arc<ResourceRequest>, response: ResourceResponse) -> bool {
        self.runtime
            .spawn((self.f)(request, response).in_current_span());
        true
    }
}

/// Scheme handlers of one webview, keyed by scheme.
#[derive(Clone)]
pub struct SchemeHandlers {
    config: BridgeConfig,
    buffers: BufferStore,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn SchemeHandler>>>>,
}

impl fmt::Debug for SchemeHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        let mut schemes: Vec<_> = handlers.keys().collect();
        schemes.sort();
        f.debug_struct("SchemeHandlers")
            .field("config", &self.config)
            .field("schemes", &schemes)
            .finish()
    }
}

impl SchemeHandlers {
    pub fn new(config: BridgeConfig, buffers: BufferStore) -> Self {
        Self {
            config,
            buffers,
            handlers: Default::default(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn buffers(&self) -> &BufferStore {
        &self.buffers
    }

    /// Registers `handler` for `scheme`, replacing any previous one.
    pub fn register(&self, scheme: impl Into<String>, handler: impl SchemeHandler) {
        self.handlers.write().insert(scheme.into(), Arc::new(handler));
    }

    pub fn unregister(&self, scheme: &str) -> bool {
        self.handlers.write().remove(scheme).is_some()
    }

    pub fn has_handler_for_scheme(&self, scheme: &str) -> bool {
        self.handlers.read().contains_key(scheme)
    }

    /// Serves a resource load, blocking the calling thread until the
    /// handler finishes the response.
    ///
    /// Returns `None` when the request is malformed or no handler takes it,
    /// so the loader can fall back to its default behavior. Must not be
    /// called from the thread the handler itself runs on.
    #[tracing::instrument(level = "debug", skip_all, fields(uri = %request.uri()))]
    pub fn handle_request(&self, request: http::Request<()>) -> Option<ResponseDescriptor> {
        let request = match ResourceRequest::new(request, &self.config, self.buffers.clone()) {
            Ok(request) => Arc::new(request),
            Err(err) => {
                tracing::debug!(error = %err, "rejecting resource request");
                return None;
            }
        };

        let handler = self.handlers.read().get(request.scheme()).cloned()?;
        let response = ResourceResponse::new(self.config.pipe_capacity);
        if !handler.handle(request, response.clone()) {
            tracing::trace!("handler declined the request");
            return None;
        }

        let descriptor = response.wait_for_finish();
        if let Some(descriptor) = &descriptor {
            tracing::debug!(status = %descriptor.status, mime = %descriptor.mime_type, "response ready");
        }
        descriptor
    }
}
