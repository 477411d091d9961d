//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use service_gateway::http::ServerBuilder;
use service_gateway::{ProxyConfig, Shutdown};

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_head(&mut socket).await;
                respond(&mut socket, 200, response).await;
            });
        }
    });
    addr
}

/// Start a backend that echoes the request line and selected headers:
///
/// ```text
/// GET /users/1?page=2
/// host=127.0.0.1:PORT
/// user-agent=-
/// ```
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                let mut lines = head.split("\r\n");
                let request_line = lines.next().unwrap_or_default();
                let (method, target) = {
                    let mut parts = request_line.split(' ');
                    (parts.next().unwrap_or_default(), parts.next().unwrap_or_default())
                };
                let header = |name: &str| {
                    head.split("\r\n")
                        .skip(1)
                        .filter_map(|l| l.split_once(':'))
                        .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
                        .map(|(_, v)| v.trim().to_string())
                        .unwrap_or_else(|| "-".to_string())
                };
                let body = format!(
                    "{method} {target}\nhost={}\nuser-agent={}",
                    header("host"),
                    header("user-agent")
                );
                respond(&mut socket, 200, &body).await;
            });
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Build and run a server on an ephemeral port. Returns its address and the
/// coordinator that stops it.
pub async fn spawn_server(builder: ServerBuilder) -> (SocketAddr, Shutdown) {
    let server = builder.build().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    let (_updates_tx, updates_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, signal).await;
    });

    // Give the server a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, shutdown)
}

/// Config with the gateway enabled for the given discovery modes.
pub fn gateway_config(modes: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.gateway.enabled = true;
    config.gateway.discovery_modes = modes.to_string();
    config.timeouts.connect_secs = 1;
    config.gateway.forward_timeout_secs = 5;
    config
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn respond(socket: &mut TcpStream, status: u16, body: &str) {
    let status_text = match status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        _ => "200 OK",
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}
