//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves named bodies under a few route prefixes that script failures:
//!
//! - `/files/<name>`: 200 with the body.
//! - `/missing/<name>`: 404.
//! - `/flaky/<n>/<name>`: 500 for the first `n` requests of that path, then 200.
//! - `/slow/<ms>/<name>`: sleeps `ms` then 200.
//! - `/short/<name>`: announces the full length, sends half, closes.
//!
//! One request per connection (`Connection: close`).

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

type Bodies = Arc<HashMap<String, Vec<u8>>>;
type Hits = Arc<Mutex<HashMap<String, usize>>>;

pub struct TestServer {
    base: String,
    hits: Hits,
}

impl TestServer {
    /// Full URL for `path` (which starts with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Requests received for `path` so far.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

/// Start a server in a background thread. It runs until the process exits.
pub fn start(files: Vec<(&str, Vec<u8>)>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let bodies: Bodies = Arc::new(
        files
            .into_iter()
            .map(|(name, body)| (name.to_string(), body))
            .collect(),
    );
    let hits: Hits = Arc::new(Mutex::new(HashMap::new()));
    let server_hits = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let bodies = Arc::clone(&bodies);
            let hits = Arc::clone(&server_hits);
            thread::spawn(move || handle(stream, &bodies, &hits));
        }
    });
    TestServer {
        base: format!("http://127.0.0.1:{}", port),
        hits,
    }
}

fn respond(stream: &mut TcpStream, status: &str, body: &[u8], content_length: usize) {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        status, content_length
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}

fn handle(mut stream: TcpStream, bodies: &HashMap<String, Vec<u8>>, hits: &Mutex<HashMap<String, usize>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("/").to_string();
    if !method.eq_ignore_ascii_case("GET") {
        respond(&mut stream, "405 Method Not Allowed", b"", 0);
        return;
    }

    let hit = {
        let mut hits = hits.lock().unwrap();
        let count = hits.entry(path.clone()).or_insert(0);
        *count += 1;
        *count
    };

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let body_for = |name: &str| bodies.get(name).cloned();
    match segments.as_slice() {
        ["files", name] => match body_for(name) {
            Some(body) => respond(&mut stream, "200 OK", &body, body.len()),
            None => respond(&mut stream, "404 Not Found", b"", 0),
        },
        ["flaky", failures, name] => {
            let failures: usize = failures.parse().unwrap_or(0);
            match body_for(name) {
                Some(_) if hit <= failures => respond(&mut stream, "500 Internal Server Error", b"", 0),
                Some(body) => respond(&mut stream, "200 OK", &body, body.len()),
                None => respond(&mut stream, "404 Not Found", b"", 0),
            }
        }
        ["slow", ms, name] => {
            thread::sleep(Duration::from_millis(ms.parse().unwrap_or(0)));
            match body_for(name) {
                Some(body) => respond(&mut stream, "200 OK", &body, body.len()),
                None => respond(&mut stream, "404 Not Found", b"", 0),
            }
        }
        ["short", name] => match body_for(name) {
            Some(body) => respond(&mut stream, "200 OK", &body[..body.len() / 2], body.len()),
            None => respond(&mut stream, "404 Not Found", b"", 0),
        },
        _ => respond(&mut stream, "404 Not Found", b"", 0),
    }
}
