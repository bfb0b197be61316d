// Echo upstream for integration tests.

use axum::{
    body::Bytes,
    extract::Request,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Requests seen by the upstream, keyed by path.
#[derive(Clone, Default)]
pub struct UpstreamCounters {
    hits: Arc<Mutex<HashMap<String, i64>>>,
}

impl UpstreamCounters {
    fn inc(&self, path: &str) {
        *self.hits.lock().entry(path.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, path: &str) -> i64 {
        *self.hits.lock().get(path).unwrap_or(&0)
    }

    pub fn total(&self) -> i64 {
        self.hits.lock().values().sum()
    }
}

/// Answers every request with a JSON echo of what it received.
///
/// Responses also carry a `keep-alive` hop-by-hop header and an
/// `x-upstream` end-to-end header.
pub struct UpstreamServer {
    addr: String,
    counter: UpstreamCounters,
    handle: JoinHandle<()>,
    shutdown: tokio::sync::oneshot::Sender<()>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl UpstreamServer {
    pub async fn start() -> Self {
        let counter = UpstreamCounters::default();
        let counter_for_handler = counter.clone();

        let echo = move |req: Request| {
            let counter = counter_for_handler.clone();
            async move {
                let (parts, body) = req.into_parts();
                let body: Bytes = axum::body::to_bytes(body, 1 << 20).await.unwrap();
                counter.inc(parts.uri.path());

                let payload = json!({
                    "method": parts.method.as_str(),
                    "path": parts.uri.path(),
                    "query": parts.uri.query(),
                    "host": header(&parts.headers, "host"),
                    "x_forwarded_host": header(&parts.headers, "x-forwarded-host"),
                    "x_custom": header(&parts.headers, "x-custom"),
                    "body": String::from_utf8_lossy(&body),
                });

                let mut headers = HeaderMap::new();
                headers.insert("content-type", "application/json".parse().unwrap());
                headers.insert("x-upstream", "echo".parse().unwrap());
                headers.insert("keep-alive", "timeout=5".parse().unwrap());
                (StatusCode::OK, headers, payload.to_string()).into_response()
            }
        };

        let router = Router::new()
            .route("/healthcheck", get(|| async { "ok" }))
            .fallback(echo);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, router);
            tokio::select! {
                _ = server => {},
                _ = shutdown_rx => {},
            }
        });

        wait_http_ready(&format!("http://{addr}/healthcheck")).await;

        Self {
            addr,
            counter,
            handle,
            shutdown: shutdown_tx,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn counter(&self) -> &UpstreamCounters {
        &self.counter
    }

    pub async fn close(self) {
        let _ = self.shutdown.send(());
        self.handle.abort();
    }
}

/// Polls `url` until it answers with a 2xx status.
pub async fn wait_http_ready(url: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        if let Ok(resp) = reqwest::get(url).await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("http not ready: {}", url);
}
