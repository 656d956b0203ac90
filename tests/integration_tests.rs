//! End-to-end tests over a real TCP socket, exercising the tokio driver
//! together with the state machine.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use vhostd::{Config, Server};

struct Site {
    dir: tempfile::TempDir,
}

impl Site {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("example.org")).unwrap();
        std::fs::write(dir.path().join("example.org").join("index.html"), b"over the wire")
            .unwrap();
        Site { dir }
    }

    fn config(&self) -> Config {
        let mut config = Config::default();
        config.document_root = self.dir.path().to_str().unwrap().to_string();
        config.network_read_timeout = 5;
        config.network_write_timeout = 5;
        config
    }
}

async fn start_server(config: Config) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(Server::new(config));
    tokio::spawn(async move {
        let _ = server.run_on(listener).await;
    });
    addr
}

async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => out.extend_from_slice(&buf[..n]),
            Ok(Err(_)) => break,
        }
    }
    out
}

async fn read_one_response(stream: &mut TcpStream) -> Vec<u8> {
    // Good enough for responses with a Content-Length and no body split
    // across keep-alive boundaries.
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        if let Some(pos) = out.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&out[..pos + 4]).into_owned();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("Content-Length: "))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if out.len() >= pos + 4 + content_length {
                return out;
            }
        }
        match tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => return out,
            Ok(Ok(n)) => out.extend_from_slice(&buf[..n]),
            Ok(Err(_)) => return out,
        }
    }
}

#[tokio::test]
async fn serves_a_file_over_tcp() {
    let site = Site::new();
    let addr = start_server(site.config()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.0\r\nHost: example.org\r\n\r\n")
        .await
        .unwrap();
    let response = read_until_closed(&mut stream).await;
    let text = String::from_utf8_lossy(&response);

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{}", text);
    assert!(text.contains("Connection: close\r\n"), "{}", text);
    assert!(text.ends_with("over the wire"), "{}", text);
}

#[tokio::test]
async fn keep_alive_serves_two_requests_on_one_socket() {
    let site = Site::new();
    let addr = start_server(site.config()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: example.org\r\n\r\n")
        .await
        .unwrap();
    let first = read_one_response(&mut stream).await;
    let text = String::from_utf8_lossy(&first);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{}", text);
    assert!(text.contains("Connection: keep-alive\r\n"), "{}", text);

    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: example.org\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let second = read_until_closed(&mut stream).await;
    let text = String::from_utf8_lossy(&second);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{}", text);
    assert!(text.ends_with("over the wire"), "{}", text);
}

#[tokio::test]
async fn missing_file_is_404_over_tcp() {
    let site = Site::new();
    let addr = start_server(site.config()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /nope.html HTTP/1.1\r\nHost: example.org\r\n\r\n")
        .await
        .unwrap();
    let response = read_until_closed(&mut stream).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"), "{}", text);
}
