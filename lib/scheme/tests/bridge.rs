use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use pretty_assertions::assert_eq;
use tracing_test::traced_test;
use webview_ipc::BufferStore;
use webview_scheme::{
    AsyncSchemeHandler, BridgeConfig, ResourceRequest, ResourceResponse, SchemeHandlers,
    SEQ_HEADER,
};

fn get(uri: &str) -> http::Request<()> {
    http::Request::builder().uri(uri).body(()).unwrap()
}

fn read_body(mut body: impl Read) -> String {
    let mut out = String::new();
    body.read_to_string(&mut out).unwrap();
    out
}

#[test]
fn logic_thread_fills_the_response() {
    let handlers = SchemeHandlers::new(BridgeConfig::default(), BufferStore::new());
    handlers.register(
        "socket",
        |_req: Arc<ResourceRequest>, res: ResourceResponse| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                res.set_status(200, "OK").unwrap();
                res.set_header("content-type", "text/plain").unwrap();
                res.write_str("foo");
                res.write(Bytes::from_static(b"bar"));
                res.finish();
            });
            true
        },
    );
    assert!(handlers.has_handler_for_scheme("socket"));

    let descriptor = handlers.handle_request(get("socket://app/index.txt")).unwrap();
    assert_eq!(descriptor.status, StatusCode::OK);
    assert_eq!(descriptor.mime_type, "text/plain");
    assert_eq!(read_body(descriptor.body), "foobar");
}

#[test]
#[traced_test]
fn async_handler_on_a_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let buffers = BufferStore::new();
    buffers.put("R1", Bytes::from_static(b"ping"));
    let config = BridgeConfig::default().with_bundle_identifier("co.example.app");
    let handlers = SchemeHandlers::new(config, buffers.clone());

    handlers.register(
        "socket",
        AsyncSchemeHandler::new(
            runtime.handle().clone(),
            |req: Arc<ResourceRequest>, res: ResourceResponse| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let body = req.body().cloned().unwrap_or_default();
                res.set_status(201, "Created").unwrap();
                res.set_header("x-path", req.pathname()).unwrap();
                res.write(body);
                res.write_str(&format!(" from {}", req.url()));
                res.finish();
            },
        ),
    );

    let request = http::Request::builder()
        .method(Method::POST)
        .uri("https://co.example.app/echo")
        .header(SEQ_HEADER, "R1")
        .body(())
        .unwrap();
    let descriptor = handlers.handle_request(request).unwrap();

    assert_eq!(descriptor.status, StatusCode::CREATED);
    assert_eq!(descriptor.status_text, "Created");
    assert_eq!(descriptor.headers["x-path"], "/echo");
    assert_eq!(
        read_body(descriptor.body),
        "ping from socket://co.example.app/echo"
    );
    assert!(buffers.is_empty());
    assert!(logs_contain("response ready"));
}

#[test]
fn large_bodies_stream_through_a_small_pipe() {
    let config = BridgeConfig {
        pipe_capacity: 2,
        ..Default::default()
    };
    let handlers = SchemeHandlers::new(config, BufferStore::new());
    handlers.register(
        "socket",
        |_req: Arc<ResourceRequest>, res: ResourceResponse| {
            for i in 0..100u8 {
                res.write(vec![i; 1024]);
            }
            res.finish();
            true
        },
    );

    let descriptor = handlers.handle_request(get("socket://app/big")).unwrap();
    let mut body = Vec::new();
    let mut reader = descriptor.body;
    reader.read_to_end(&mut body).unwrap();
    assert_eq!(body.len(), 100 * 1024);
    assert_eq!(body[99 * 1024], 99);
}

#[test]
fn unhandled_requests_fall_through() {
    let handlers = SchemeHandlers::new(BridgeConfig::default(), BufferStore::new());
    handlers.register("socket", |_req: Arc<ResourceRequest>, _res: ResourceResponse| false);

    assert!(!handlers.has_handler_for_scheme("https"));
    assert!(handlers.handle_request(get("https://example.com/")).is_none());
    assert!(handlers.handle_request(get("socket://app/")).is_none());
    assert!(handlers.handle_request(get("/relative")).is_none());

    assert!(handlers.unregister("socket"));
    assert!(!handlers.has_handler_for_scheme("socket"));
}

#[test]
fn concurrent_loads_are_independent() {
    let handlers = SchemeHandlers::new(BridgeConfig::default(), BufferStore::new());
    handlers.register(
        "socket",
        |req: Arc<ResourceRequest>, res: ResourceResponse| {
            thread::spawn(move || {
                res.write_str(req.pathname());
                res.finish();
            });
            true
        },
    );

    let loaders: Vec<_> = (0..8)
        .map(|i| {
            let handlers = handlers.clone();
            thread::spawn(move || {
                let descriptor = handlers
                    .handle_request(get(&format!("socket://app/{i}")))
                    .unwrap();
                read_body(descriptor.body)
            })
        })
        .collect();

    for (i, loader) in loaders.into_iter().enumerate() {
        assert_eq!(loader.join().unwrap(), format!("/{i}"));
    }
}
