//! Shared utilities for relay integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use stream_relay::config::RelayConfig;
use stream_relay::http::HttpServer;
use stream_relay::lifecycle::Shutdown;
use stream_relay::net::StreamTracker;

/// A canned upstream response.
#[derive(Clone)]
pub struct Canned {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Arc<Vec<u8>>,
}

impl Canned {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Arc::new(body.into()),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Handle on a running mock upstream.
#[derive(Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    client_gone: Arc<AtomicBool>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        format!("http://{}/mp3", self.addr)
    }

    /// Number of requests received so far.
    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Raw request heads received so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Whether a write to a streaming client has failed.
    pub fn client_gone(&self) -> bool {
        self.client_gone.load(Ordering::SeqCst)
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

fn new_handle(addr: SocketAddr) -> MockUpstream {
    MockUpstream {
        addr,
        requests: Arc::new(Mutex::new(Vec::new())),
        client_gone: Arc::new(AtomicBool::new(false)),
    }
}

/// Start an upstream answering every request with `canned`.
pub async fn start_upstream(canned: Canned) -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    serve_canned(listener, canned)
}

/// Same as [`start_upstream`] on a fixed address.
pub async fn start_upstream_on(addr: SocketAddr, canned: Canned) -> MockUpstream {
    let listener = TcpListener::bind(addr).await.unwrap();
    serve_canned(listener, canned)
}

fn serve_canned(listener: TcpListener, canned: Canned) -> MockUpstream {
    let handle = new_handle(listener.local_addr().unwrap());
    let requests = handle.requests.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let canned = canned.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                requests.lock().unwrap().push(head);

                let mut response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                    status_text(canned.status),
                    canned.body.len()
                );
                for (name, value) in &canned.headers {
                    response.push_str(&format!("{name}: {value}\r\n"));
                }
                response.push_str("\r\n");

                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&canned.body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    handle
}

/// Start an upstream that streams `audio/mpeg` forever, like a live station.
pub async fn start_endless_upstream() -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let handle = new_handle(listener.local_addr().unwrap());
    let requests = handle.requests.clone();
    let client_gone = handle.client_gone.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let requests = requests.clone();
            let client_gone = client_gone.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                requests.lock().unwrap().push(head);

                let header = "HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nicy-name: Test FM\r\nConnection: close\r\n\r\n";
                if socket.write_all(header.as_bytes()).await.is_err() {
                    client_gone.store(true, Ordering::SeqCst);
                    return;
                }

                let frame = [0xffu8; 4096];
                loop {
                    if socket.write_all(&frame).await.is_err() {
                        client_gone.store(true, Ordering::SeqCst);
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            });
        }
    });

    handle
}

/// Start an upstream that accepts connections and never answers.
pub async fn start_silent_upstream() -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let handle = new_handle(listener.local_addr().unwrap());
    let requests = handle.requests.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let requests = requests.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                requests.lock().unwrap().push(head);
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(socket);
            });
        }
    });

    handle
}

/// An address nothing is listening on.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Relay config pointed at `url`.
pub fn relay_config(url: &str) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.url = url.to_string();
    config
}

/// A running relay.
pub struct RunningRelay {
    pub addr: SocketAddr,
    pub tracker: StreamTracker,
    pub shutdown: Shutdown,
}

impl RunningRelay {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

impl Drop for RunningRelay {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a relay on an ephemeral port.
pub async fn start_relay(config: RelayConfig) -> RunningRelay {
    let server = HttpServer::new(config).unwrap();
    let tracker = server.tracker().clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (_, config_updates) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    RunningRelay {
        addr,
        tracker,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
