//! Scripted HTTP server for client tests.
//!
//! Runs on plain std threads so the same server backs `#[tokio::test]`
//! and blocking `#[test]` cases. Every response closes its connection.
//! A connection the client abandons before the server is done with it is
//! counted in [`MockServer::disconnects`].

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

/// How long a `Hang` response holds its connection open.
const HANG_FOR: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Status and JSON (or arbitrary) body.
    Body(u16, String),
    /// 200 with NDJSON lines, each followed by `\n`.
    Ndjson(Vec<String>),
    /// Accept the request and never answer.
    Hang,
    /// Close the connection without answering.
    Drop,
    /// 200 with NDJSON lines written one at a time, `interval` apart.
    Trickle(Vec<String>, Duration),
    /// 200 with the given NDJSON lines, then silence with the body left open.
    Stall(Vec<String>),
}

impl MockResponse {
    pub fn ok(body: Value) -> Self {
        MockResponse::Body(200, body.to_string())
    }

    pub fn status(status: u16, body: &str) -> Self {
        MockResponse::Body(status, body.to_string())
    }

    pub fn ndjson(lines: &[&str]) -> Self {
        MockResponse::Ndjson(owned(lines))
    }

    pub fn trickle(lines: &[&str], interval: Duration) -> Self {
        MockResponse::Trickle(owned(lines), interval)
    }

    pub fn stall(lines: &[&str]) -> Self {
        MockResponse::Stall(owned(lines))
    }
}

fn owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| l.to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
}

impl RecordedRequest {
    /// The `model` field of the JSON body, if any.
    pub fn model(&self) -> Option<&str> {
        self.body.as_ref()?.get("model")?.as_str()
    }
}

type Handler = dyn Fn(&RecordedRequest) -> MockResponse + Send + Sync;

pub struct MockServer {
    url: String,
    hits: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    /// Serve `responses` in order; the last one repeats.
    pub fn start(responses: Vec<MockResponse>) -> Self {
        assert!(!responses.is_empty(), "mock server needs a response");
        let next = AtomicUsize::new(0);
        Self::start_with(move |_| {
            let index = next.fetch_add(1, Ordering::SeqCst);
            responses[index.min(responses.len() - 1)].clone()
        })
    }

    /// Serve whatever `handler` returns for each request.
    pub fn start_with<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let hits = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let server_hits = Arc::clone(&hits);
        let server_disconnects = Arc::clone(&disconnects);
        let server_requests = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                server_hits.fetch_add(1, Ordering::SeqCst);
                let handler = Arc::clone(&handler);
                let requests = Arc::clone(&server_requests);
                let disconnects = Arc::clone(&server_disconnects);
                thread::spawn(move || {
                    if !serve(stream, handler.as_ref(), &requests) {
                        disconnects.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        Self {
            url,
            hits,
            disconnects,
            requests,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connections accepted so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Connections the client closed while the server was still writing
    /// or holding them open.
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Poll until `disconnects()` reaches `count` or `within` elapses.
    pub fn wait_for_disconnects(&self, count: usize, within: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < within {
            if self.disconnects() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.disconnects() >= count
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// A base URL nothing listens on.
pub fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

/// Answer one connection. Returns `false` when the client went away first.
fn serve(mut stream: TcpStream, handler: &Handler, requests: &Mutex<Vec<RecordedRequest>>) -> bool {
    let Some(request) = read_request(&stream) else {
        return true;
    };
    let response = handler(&request);
    requests.lock().unwrap().push(request);

    match response {
        MockResponse::Body(status, body) => {
            write_response(&mut stream, status, "application/json", &body);
            true
        }
        MockResponse::Ndjson(lines) => {
            let body: String = lines.iter().map(|l| format!("{l}\n")).collect();
            write_response(&mut stream, 200, "application/x-ndjson", &body);
            true
        }
        MockResponse::Hang => !closed_by_peer(&mut stream, HANG_FOR),
        MockResponse::Drop => true,
        MockResponse::Trickle(lines, interval) => {
            if write_open_head(&mut stream).is_err() {
                return false;
            }
            for line in lines {
                thread::sleep(interval);
                if write_line(&mut stream, &line).is_err() {
                    return false;
                }
            }
            true
        }
        MockResponse::Stall(lines) => {
            let written = write_open_head(&mut stream)
                .and_then(|_| lines.iter().try_for_each(|l| write_line(&mut stream, l)));
            written.is_ok() && !closed_by_peer(&mut stream, HANG_FOR)
        }
    }
}

/// Hold the connection for up to `limit`, reporting whether the peer closed it.
fn closed_by_peer(stream: &mut TcpStream, limit: Duration) -> bool {
    let _ = stream.set_read_timeout(Some(Duration::from_millis(20)));
    let start = Instant::now();
    let mut buf = [0u8; 64];
    while start.elapsed() < limit {
        match stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(_) => return true,
        }
    }
    false
}

/// Response head for a body delimited by closing the connection.
fn write_open_head(stream: &mut TcpStream) -> std::io::Result<()> {
    stream.write_all(
        b"HTTP/1.1 200 Mock\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n",
    )?;
    stream.flush()
}

fn write_line(stream: &mut TcpStream, line: &str) -> std::io::Result<()> {
    stream.write_all(format!("{line}\n").as_bytes())?;
    stream.flush()
}

fn read_request(stream: &TcpStream) -> Option<RecordedRequest> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut content_length = 0;
    loop {
        line.clear();
        if reader.read_line(&mut line).ok()? == 0 {
            break;
        }
        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).ok()?;
    let body = serde_json::from_slice(&body).ok();

    Some(RecordedRequest { method, path, body })
}

fn write_response(stream: &mut TcpStream, status: u16, content_type: &str, body: &str) {
    let head = format!(
        "HTTP/1.1 {status} Mock\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body.as_bytes());
    let _ = stream.flush();
}
