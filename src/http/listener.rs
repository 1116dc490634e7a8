//! Embedded HTTP/1.1 listener
//!
//! One accept task per running server, one task per accepted connection, one
//! request per connection. Every response carries permissive CORS headers;
//! `OPTIONS` preflights are answered here without touching the router.
//! `HEAD` requests are routed like any other method but get the head of the
//! response only.

use std::{
    collections::HashMap,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Instant,
};

use serde_json::Value;
use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::errors::ServerError;
use crate::http::context::RouteResult;
use crate::http::router::{RawRequest, Router};
use crate::logging::log_request_summary;

pub const MAX_HEADER_BYTES: usize = 64 * 1024;

const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\n\
Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
Access-Control-Allow-Headers: Content-Type\r\n";

const SERIALIZATION_FAILURE_BODY: &str =
    r#"{"error":"failed to serialize response","code":500}"#;

struct Running {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
}

pub struct HttpServer {
    router: Arc<Router>,
    max_body_bytes: usize,
    state: Mutex<Option<Running>>,
}

impl HttpServer {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            state: Mutex::new(None),
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Binds and starts accepting. Returns the bound port; while already
    /// running this returns the current port without rebinding.
    pub async fn start(&self, addr: &str, port: u16) -> Result<u16, ServerError> {
        let mut state = self.state.lock().await;
        if let Some(running) = state.as_ref() {
            if !running.accept_task.is_finished() {
                return Ok(running.local_addr.port());
            }
            warn!(
                port = running.local_addr.port(),
                "previous accept loop exited unexpectedly; rebinding"
            );
        }

        let ip = parse_bind_ip(addr)?;
        let bind_addr = SocketAddr::new(ip, port);
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let cancel = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.router),
            cancel.clone(),
            self.max_body_bytes,
        ));

        info!(addr = %local_addr, "http listener started");
        *state = Some(Running {
            local_addr,
            cancel,
            accept_task,
        });

        Ok(local_addr.port())
    }

    /// Cancels the accept loop and waits for it to release the socket.
    /// In-flight requests keep running to completion.
    pub async fn stop(&self) {
        let running = self.state.lock().await.take();
        let Some(running) = running else {
            return;
        };

        running.cancel.cancel();
        if let Err(err) = running.accept_task.await {
            warn!(error = %err, "accept loop did not shut down cleanly");
        }
        info!(addr = %running.local_addr, "http listener stopped");
    }

    /// False when stopped, or when the accept loop died on an unexpected fault.
    pub async fn is_running(&self) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.accept_task.is_finished())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|running| running.local_addr)
    }

    pub async fn port(&self) -> Option<u16> {
        self.local_addr().await.map(|addr| addr.port())
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}

fn parse_bind_ip(addr: &str) -> Result<IpAddr, ServerError> {
    let trimmed = addr.trim();
    if trimmed.eq_ignore_ascii_case("localhost") {
        return Ok(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    trimmed
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map_err(|_| ServerError::InvalidAddress(addr.to_string()))
}

async fn accept_loop(
    listener: TcpListener,
    router: Arc<Router>,
    cancel: CancellationToken,
    max_body_bytes: usize,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("accept loop cancelled");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    handle_connection(stream, peer, router, max_body_bytes).await;
                });
            }
            Err(err) if is_transient_accept_error(&err) => {
                warn!(error = %err, "failed to accept connection");
            }
            Err(err) => {
                error!(error = %err, "accept loop failed; listener is no longer serving");
                break;
            }
        }
    }
}

fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<Router>,
    max_body_bytes: usize,
) {
    let started_at = Instant::now();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let (method, path, result) = match read_request(&mut reader, max_body_bytes).await {
        Ok(Some(request)) => {
            let method = request.method.clone();
            let path = request.path.clone();
            let result = if method == "OPTIONS" {
                RouteResult::no_content()
            } else {
                router.dispatch(request).await
            };
            (method, path, result)
        }
        Ok(None) => {
            debug!(peer = %peer, "connection closed before a request was sent");
            return;
        }
        Err(RequestError::Io(err)) => {
            debug!(peer = %peer, error = %err, "failed to read request");
            return;
        }
        Err(err) => {
            debug!(peer = %peer, error = %err, "rejecting malformed request");
            ("-".to_string(), "-".to_string(), err.into_route_result())
        }
    };

    let response = render_response(&result, method != "HEAD");
    if let Err(err) = write_response(&mut writer, &response).await {
        debug!(peer = %peer, error = %err, "failed to write response; client went away");
    }

    log_request_summary(&method, &path, result.status, started_at.elapsed());
}

#[derive(Debug, Error)]
enum RequestError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed request: {0}")]
    Malformed(&'static str),
    #[error("request headers exceed {max} bytes", max = MAX_HEADER_BYTES)]
    HeadersTooLarge,
    #[error("request body of {length} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { length: usize, limit: usize },
}

impl RequestError {
    fn into_route_result(self) -> RouteResult {
        match self {
            Self::BodyTooLarge { .. } => RouteResult::payload_too_large(&self.to_string()),
            other => RouteResult::bad_request(&other.to_string()),
        }
    }
}

// Reads one line without letting a single header run past the remaining budget.
async fn read_limited_line<R>(reader: &mut R, budget: &mut usize) -> Result<String, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    if *budget == 0 {
        return Err(RequestError::HeadersTooLarge);
    }

    let mut line = String::new();
    let read = (&mut *reader)
        .take(*budget as u64)
        .read_line(&mut line)
        .await
        .map_err(|err| match err.kind() {
            io::ErrorKind::InvalidData => RequestError::Malformed("request head is not valid UTF-8"),
            _ => RequestError::Io(err),
        })?;

    if read > 0 && !line.ends_with('\n') && read >= *budget {
        return Err(RequestError::HeadersTooLarge);
    }
    *budget -= read;
    Ok(line)
}

async fn read_request<R>(
    reader: &mut R,
    max_body_bytes: usize,
) -> Result<Option<RawRequest>, RequestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut budget = MAX_HEADER_BYTES;

    let request_line = read_limited_line(reader, &mut budget).await?;
    let request_line = request_line.trim_end_matches(['\r', '\n']);
    if request_line.is_empty() {
        return Ok(None);
    }

    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or(RequestError::Malformed("missing method"))?;
    let target = parts
        .next()
        .ok_or(RequestError::Malformed("missing request target"))?;
    let version = parts
        .next()
        .ok_or(RequestError::Malformed("missing http version"))?;
    if !version.starts_with("HTTP/1.") || parts.next().is_some() {
        return Err(RequestError::Malformed("unsupported request line"));
    }

    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    let mut headers: HashMap<String, String> = HashMap::new();
    loop {
        let line = read_limited_line(reader, &mut budget).await?;
        if line.is_empty() {
            return Err(RequestError::Malformed("connection closed inside request head"));
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or(RequestError::Malformed("header line without ':'"))?;
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim();
        headers
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    if headers
        .get("transfer-encoding")
        .is_some_and(|value| !value.eq_ignore_ascii_case("identity"))
    {
        return Err(RequestError::Malformed("transfer encodings are not supported"));
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| RequestError::Malformed("invalid content-length"))?,
        None => 0,
    };
    if content_length > max_body_bytes {
        return Err(RequestError::BodyTooLarge {
            length: content_length,
            limit: max_body_bytes,
        });
    }

    let mut body = vec![0_u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).await?;
    }

    Ok(Some(RawRequest {
        method: method.to_string(),
        path: path.to_string(),
        query: query.to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    }))
}

/// Drops object fields whose value is null, at any depth. Nulls inside
/// arrays are positional and stay.
pub fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, item)| !item.is_null())
                .map(|(key, item)| (key.clone(), strip_nulls(item)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        _ => value.clone(),
    }
}

fn render_response(result: &RouteResult, include_body: bool) -> Vec<u8> {
    let (status, body) = if result.status == 204 {
        (204, Vec::new())
    } else {
        match serde_json::to_vec(&strip_nulls(&result.payload)) {
            Ok(body) => (result.status, body),
            Err(err) => {
                error!(error = %err, "failed to serialize response payload");
                (500, SERIALIZATION_FAILURE_BODY.as_bytes().to_vec())
            }
        }
    };

    let mut head = format!("HTTP/1.1 {} {}\r\n", status, reason_phrase(status));
    if !body.is_empty() {
        head.push_str(&format!("Content-Type: {}\r\n", result.content_type));
    }
    head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    head.push_str(CORS_HEADERS);
    head.push_str("Connection: close\r\n\r\n");

    let mut response = head.into_bytes();
    if include_body {
        response.extend_from_slice(&body);
    }
    response
}

async fn write_response<W>(writer: &mut W, response: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(response).await?;
    writer.flush().await?;
    writer.shutdown().await
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
