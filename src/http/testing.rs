//! Minimal raw HTTP/1.1 client for exercising a live listener in tests.

use std::collections::HashMap;

use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

pub struct TestResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("response body should be json")
    }
}

pub async fn send_raw(port: u16, raw: &str) -> TestResponse {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect to test server");
    stream
        .write_all(raw.as_bytes())
        .await
        .expect("write request");

    let mut response = Vec::new();
    stream
        .read_to_end(&mut response)
        .await
        .expect("read response");
    parse_response(&String::from_utf8_lossy(&response))
}

pub async fn send_request(port: u16, method: &str, target: &str, body: Option<&str>) -> TestResponse {
    let body = body.unwrap_or_default();
    let raw = format!(
        "{method} {target} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    send_raw(port, &raw).await
}

fn parse_response(raw: &str) -> TestResponse {
    let (head, body) = raw
        .split_once("\r\n\r\n")
        .expect("response should contain a header terminator");
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .expect("status line with numeric code");
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    TestResponse {
        status,
        headers,
        body: body.to_string(),
    }
}
