//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use partner_gateway::config::GatewayConfig;
use partner_gateway::store::{NewPartner, PartnerStore, SqliteStore, UsageRecord};
use partner_gateway::{HttpServer, Shutdown};

/// A request as the mock upstream received it.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockUpstream {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// What the mock upstream sends back.
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", "application/json".to_string())],
            body: body.into().into_bytes(),
        }
    }
}

/// Start a mock upstream that always answers with `status` and `body`.
pub async fn start_mock_upstream(status: u16, body: &'static str) -> MockUpstream {
    start_programmable_upstream(move |_| async move { (status, body.to_string()) }).await
}

/// Start a mock upstream whose answer is computed from the captured request.
pub async fn start_programmable_upstream<F, Fut>(f: F) -> MockUpstream
where
    F: Fn(CapturedRequest) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = (u16, String)> + Send + 'static,
{
    let f = Arc::new(f);
    start_upstream(move |req| {
        let f = f.clone();
        async move {
            let (status, body) = f(req).await;
            MockResponse::json(status, body)
        }
    })
    .await
}

/// Start a mock upstream that sends a gzip-encoded body.
pub async fn start_gzip_upstream(compressed: &'static [u8]) -> MockUpstream {
    start_upstream(move |_| async move {
        MockResponse {
            status: 200,
            headers: vec![
                ("Content-Type", "application/json".to_string()),
                ("Content-Encoding", "gzip".to_string()),
            ],
            body: compressed.to_vec(),
        }
    })
    .await
}

async fn start_upstream<F, Fut>(f: F) -> MockUpstream
where
    F: Fn(CapturedRequest) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let captured = requests.clone();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let captured = captured.clone();
                    tokio::spawn(async move {
                        let Some(request) = read_request(&mut socket).await else {
                            return;
                        };
                        captured.lock().unwrap().push(request.clone());
                        let response = f(request).await;

                        let mut head = format!(
                            "HTTP/1.1 {} {}\r\nX-Upstream: mock\r\nContent-Length: {}\r\nConnection: close\r\n",
                            response.status,
                            reason(response.status),
                            response.body.len(),
                        );
                        for (name, value) in &response.headers {
                            head.push_str(&format!("{name}: {value}\r\n"));
                        }
                        head.push_str("\r\n");

                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&response.body).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockUpstream { addr, requests }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(CapturedRequest {
        method,
        target,
        headers,
        body,
    })
}

/// A store with the demo partners:
/// `key_a` (10/min, `/posts`), `key_b` (5/min, `/users`),
/// `god_mode` (1000/min, `/`) and the inactive `key_old`.
pub async fn seeded_store() -> Arc<SqliteStore> {
    let store = SqliteStore::in_memory().await.unwrap();
    for (name, key, limit, resource) in [
        ("Partner A", "key_a", 10, "/posts"),
        ("Partner B", "key_b", 5, "/users"),
        ("Unlimited Power", "god_mode", 1000, "/"),
    ] {
        let partner = store.insert_partner(NewPartner::new(name, key, limit)).await.unwrap();
        store.grant_permission(partner.id, resource).await.unwrap();
    }
    let old = store
        .insert_partner(NewPartner::new("Retired", "key_old", 10).inactive())
        .await
        .unwrap();
    store.grant_permission(old.id, "/").await.unwrap();
    Arc::new(store)
}

pub fn test_config(upstream_base: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.base_url = upstream_base.to_string();
    config.observability.metrics_enabled = false;
    config
}

pub struct TestGateway {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    server: Option<JoinHandle<()>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Signal shutdown and wait until the server has fully stopped.
    pub async fn stop(mut self) {
        self.shutdown.trigger();
        if let Some(server) = self.server.take() {
            server.await.unwrap();
        }
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Run a gateway on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig, store: Arc<dyn PartnerStore>) -> TestGateway {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, store).unwrap();
    let server_shutdown = shutdown.subscribe();

    let server = tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestGateway {
        addr,
        shutdown,
        server: Some(server),
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// A client that neither advertises nor decodes compressed bodies, so the
/// gateway's own response headers are observed as sent.
pub fn identity_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .no_gzip()
        .no_brotli()
        .no_deflate()
        .build()
        .unwrap()
}

/// Send a GET whose request target is written verbatim, bypassing
/// client-side URL normalization, and return the whole raw response.
pub async fn raw_get(addr: SocketAddr, target: &str, api_key: &str) -> String {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {target} HTTP/1.1\r\nHost: {addr}\r\nX-API-Key: {api_key}\r\nConnection: close\r\n\r\n"
    );
    socket.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    socket.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).to_string()
}

/// Usage is written off the response path; poll until `expected` records exist.
pub async fn wait_for_usage(
    store: &dyn PartnerStore,
    api_key: &str,
    expected: usize,
) -> Vec<UsageRecord> {
    for _ in 0..250 {
        let usage = store.recent_usage(api_key, 100).await.unwrap();
        if usage.len() >= expected {
            return usage;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    store.recent_usage(api_key, 100).await.unwrap()
}
