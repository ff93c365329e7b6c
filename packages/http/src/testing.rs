//! Scripted HTTP server for exercising real request/response handling in
//! tests.
//!
//! Each accepted connection receives the next scripted response (the last
//! one repeats) and is closed afterwards, so every retry shows up as a new
//! recorded request.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::{TcpListener, TcpStream};

/// A request as the server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Request line, e.g. `GET /api/theft-data?limit=5 HTTP/1.1`.
    pub line: String,
    /// Request body.
    pub body: String,
}

/// A local server answering with scripted `(status, body)` pairs.
pub struct ScriptedServer {
    base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedServer {
    /// Binds to an ephemeral port on `127.0.0.1` and starts serving.
    ///
    /// # Panics
    ///
    /// Panics if `responses` is empty or the listener cannot be bound.
    pub async fn start(responses: Vec<(u16, &'static str)>) -> Self {
        assert!(!responses.is_empty(), "at least one response is required");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("bind test server: {e}"));
        let base_url = listener
            .local_addr()
            .map(|addr| format!("http://{addr}"))
            .unwrap_or_else(|e| panic!("test server address: {e}"));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            for i in 0_usize.. {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let request = read_request(&mut socket).await;
                seen.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(request);

                let (status, body) = responses[i.min(responses.len() - 1)];
                let reply = format!(
                    "HTTP/1.1 {status} Scripted\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { base_url, requests }
    }

    /// Base URL to point an [`ApiConfig`](crate::ApiConfig) at.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Requests received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn read_request(socket: &mut TcpStream) -> RecordedRequest {
    let mut bytes = Vec::new();
    let mut buf = [0_u8; 4096];

    let header_end = loop {
        if let Some(pos) = find_header_end(&bytes) {
            break pos;
        }
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break bytes.len(),
            Ok(n) => bytes.extend_from_slice(&buf[..n]),
        }
    };

    let head = String::from_utf8_lossy(&bytes[..header_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = (header_end + 4).min(bytes.len());
    while bytes.len() - body_start < content_length {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => bytes.extend_from_slice(&buf[..n]),
        }
    }

    RecordedRequest {
        line: head.lines().next().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&bytes[body_start..]).into_owned(),
    }
}

fn find_header_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"\r\n\r\n")
}
