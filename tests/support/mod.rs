#![allow(dead_code)] // shared between test binaries that each use a subset

use std::convert::Infallible;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;

pub struct CollectedRequest {
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

/// Local stand-in for the ingestion API: records every request and answers
/// with a configurable status code.
#[derive(Clone)]
pub struct Collector {
    store: Arc<Mutex<Vec<CollectedRequest>>>,
    status: Arc<AtomicU16>,
    pub endpoint: String,
}

pub async fn start() -> Collector {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind collector listener");
    let port = listener.local_addr().unwrap().port();

    let collector = Collector {
        store: Arc::new(Mutex::new(Vec::new())),
        status: Arc::new(AtomicU16::new(200)),
        endpoint: format!("http://127.0.0.1:{port}"),
    };

    let accepting = collector.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener
                .accept()
                .await
                .expect("failed to accept connection");
            let collector = accepting.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let collector = collector.clone();
                    handle(req, collector)
                });
                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    collector
}

async fn handle(
    req: Request<Incoming>,
    collector: Collector,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_owned();
    let query = req.uri().query().map(|q| q.to_owned());
    let content_type = header_value(&req, "content-type");
    let authorization = header_value(&req, "authorization");

    let body_bytes = req
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_default();
    let body = serde_json::from_slice(&body_bytes).unwrap_or(serde_json::Value::Null);

    collector.store.lock().unwrap().push(CollectedRequest {
        path,
        query,
        content_type,
        authorization,
        body,
    });

    let status = StatusCode::from_u16(collector.status.load(Ordering::SeqCst))
        .expect("collector status must be a valid HTTP status");
    Ok(Response::builder()
        .status(status)
        .body(Full::default())
        .unwrap())
}

fn header_value(req: &Request<Incoming>, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_owned())
}

impl Collector {
    pub fn set_status(&self, code: u16) {
        self.status.store(code, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    /// Wait until at least `min_expected` requests arrived (or the timeout
    /// elapses), then drain and return everything recorded so far.
    pub async fn wait_for(&self, min_expected: usize, timeout_ms: u64) -> Vec<CollectedRequest> {
        let deadline =
            tokio::time::Instant::now() + tokio::time::Duration::from_millis(timeout_ms);

        loop {
            if self.store.lock().unwrap().len() >= min_expected {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }

        self.store.lock().unwrap().drain(..).collect()
    }
}
