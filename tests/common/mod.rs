//! Helpers shared by the integration tests: an in-process gateway and mock
//! vendors served by axum on ephemeral ports.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use art_gen_gateway::{router, AppState, Config};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

pub const STABILITY_KEY: &str = "sk-test0123456789abcdefghij";
pub const REPLICATE_TOKEN: &str = "r8_test0123456789abcdefghij";
pub const MODELSLAB_KEY: &str = "ml-test0123456789abcdefghij";
pub const HF_TOKEN: &str = "hf_test0123456789abcdef";

/// A few bytes standing in for a JPEG pixel.
pub const PIXEL: &[u8] = &[0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, 0x4a, 0x46, 0x49, 0x46, 0xff, 0xd9];

#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Request bodies a mock vendor received, in arrival order.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<Vec<u8>>>>);

impl Captured {
    pub fn push(&self, body: &[u8]) {
        self.0.lock().unwrap().push(body.to_vec());
    }

    pub fn last_text(&self) -> String {
        let bodies = self.0.lock().unwrap();
        String::from_utf8_lossy(bodies.last().expect("no request captured")).into_owned()
    }

    pub fn last_json(&self) -> Value {
        serde_json::from_str(&self.last_text()).expect("captured body is JSON")
    }
}

/// Reserve a port first so a mock can refer to its own URL.
pub fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock vendor");
    listener.set_nonblocking(true).expect("nonblocking listener");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));
    (listener, base)
}

pub fn serve(listener: TcpListener, app: Router) {
    let server = axum::Server::from_tcp(listener)
        .expect("mock vendor server")
        .serve(app.into_make_service());
    tokio::spawn(server);
}

pub fn spawn_vendor(app: Router) -> String {
    let (listener, base) = bind();
    serve(listener, app);
    base
}

pub fn gateway(vars: &[(&str, &str)]) -> Router {
    let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let config = Config::from_lookup(|key| vars.get(key).cloned()).expect("test config");
    let state = AppState::from_config(&config).expect("test state");
    router(Arc::new(state), &config.cors_origins)
}

pub async fn post_json(app: Router, path: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn get_json(app: Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(path).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}
