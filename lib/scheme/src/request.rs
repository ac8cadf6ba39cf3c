use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, Method};
use once_cell::sync::OnceCell;
use url::Url;
use webview_ipc::BufferStore;

use crate::config::BridgeConfig;
use crate::error::SchemeError;

/// Header carrying the sequence string of a body posted ahead of the load.
pub const SEQ_HEADER: &str = "runtime-xhr-seq";

/// A resource load as the UI toolkit reports it.
pub struct ResourceRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    scheme: String,
    custom_scheme: String,
    buffers: BufferStore,
    body: OnceCell<Option<Bytes>>,
}

impl fmt::Debug for ResourceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("scheme", &self.scheme)
            .finish()
    }
}

impl ResourceRequest {
    pub fn new(
        request: http::Request<()>,
        config: &BridgeConfig,
        buffers: BufferStore,
    ) -> Result<Self, SchemeError> {
        let (parts, ()) = request.into_parts();
        let url = Url::parse(&parts.uri.to_string())?;

        let is_app_host = matches!(url.scheme(), "http" | "https")
            && config.bundle_identifier.is_some()
            && url.host_str() == config.bundle_identifier.as_deref();
        let scheme = if is_app_host {
            config.scheme.clone()
        } else {
            url.scheme().to_string()
        };

        Ok(Self {
            method: parts.method,
            url,
            headers: parts.headers,
            scheme,
            custom_scheme: config.scheme.clone(),
            buffers,
            body: OnceCell::new(),
        })
    }

    /// The scheme the load is dispatched under.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn pathname(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self) -> &str {
        self.url.query().unwrap_or_default()
    }

    /// All headers as `name: value` lines.
    pub fn headers(&self) -> String {
        self.headers
            .iter()
            .map(|(name, value)| {
                format!("{}: {}\n", name, String::from_utf8_lossy(value.as_bytes()))
            })
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The full URL with `https:` replaced by the custom scheme.
    pub fn url(&self) -> String {
        self.url
            .as_str()
            .replace("https:", &format!("{}:", self.custom_scheme))
    }

    /// The body posted ahead of this load, if any.
    ///
    /// Mutating methods consume the body from the buffer store; other
    /// methods leave it in place for later loads.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.get_or_init(|| self.resolve_body()).as_ref()
    }

    fn resolve_body(&self) -> Option<Bytes> {
        let seq = match self.header(SEQ_HEADER) {
            Some(seq) => seq.to_string(),
            None => self
                .url
                .query_pairs()
                .find(|(key, _)| key == "seq")
                .map(|(_, value)| value.into_owned())?,
        };

        if self.method == Method::POST || self.method == Method::PUT || self.method == Method::PATCH
        {
            self.buffers.take(&seq)
        } else {
            self.buffers.get(&seq)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(method: Method, uri: &str) -> http::Request<()> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .header("accept", "*/*")
            .header(SEQ_HEADER, "R7")
            .body(())
            .unwrap()
    }

    #[test]
    fn accessors() {
        let config = BridgeConfig::default().with_bundle_identifier("co.example.app");
        let req = ResourceRequest::new(
            request(Method::GET, "https://co.example.app/index.html?x=1"),
            &config,
            BufferStore::new(),
        )
        .unwrap();

        assert_eq!(req.scheme(), "socket");
        assert_eq!(req.method(), &Method::GET);
        assert_eq!(req.hostname(), "co.example.app");
        assert_eq!(req.pathname(), "/index.html");
        assert_eq!(req.query(), "x=1");
        assert_eq!(req.url(), "socket://co.example.app/index.html?x=1");
        assert_eq!(req.headers(), "accept: */*\nruntime-xhr-seq: R7\n");
        assert_eq!(req.header("Accept"), Some("*/*"));
        assert_eq!(req.header("missing"), None);
    }

    #[test]
    fn other_hosts_keep_their_scheme() {
        let config = BridgeConfig::default().with_bundle_identifier("co.example.app");
        let req = ResourceRequest::new(
            request(Method::GET, "https://example.com/"),
            &config,
            BufferStore::new(),
        )
        .unwrap();
        assert_eq!(req.scheme(), "https");
    }

    #[test]
    fn body_is_consumed_only_by_mutating_methods() {
        let config = BridgeConfig::default();
        let buffers = BufferStore::new();
        buffers.put("R7", Bytes::from_static(b"payload"));

        let get = ResourceRequest::new(
            request(Method::GET, "socket://app/upload"),
            &config,
            buffers.clone(),
        )
        .unwrap();
        assert_eq!(get.body().map(|b| b.as_ref()), Some(&b"payload"[..]));
        assert!(buffers.contains("R7"));

        let post = ResourceRequest::new(
            request(Method::POST, "socket://app/upload"),
            &config,
            buffers.clone(),
        )
        .unwrap();
        assert_eq!(post.body().map(|b| b.as_ref()), Some(&b"payload"[..]));
        assert!(!buffers.contains("R7"));
        // resolved once
        assert!(post.body().is_some());
    }

    #[test]
    fn body_seq_from_query() {
        let buffers = BufferStore::new();
        buffers.put("9", Bytes::from_static(b"q"));
        let req = http::Request::builder()
            .method(Method::PUT)
            .uri("socket://app/put?seq=9")
            .body(())
            .unwrap();
        let req = ResourceRequest::new(req, &BridgeConfig::default(), buffers.clone()).unwrap();
        assert_eq!(req.body(), Some(&Bytes::from_static(b"q")));
        assert!(buffers.is_empty());
    }

    #[test]
    fn relative_uri_is_rejected() {
        let req = http::Request::builder().uri("/index.html").body(()).unwrap();
        let err = ResourceRequest::new(req, &BridgeConfig::default(), BufferStore::new())
            .unwrap_err();
        assert!(matches!(err, SchemeError::InvalidUrl(_)));
    }
}
