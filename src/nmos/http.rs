//! Minimal HTTP/1.1 server for the IS-04/IS-05 APIs
//!
//! One accept loop, one short-lived task per connection, one request
//! per connection. Handlers are stateless apart from the node's
//! resource lock; every response carries a JSON body.

use std::collections::HashMap;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::error::Aes67Error;
use crate::nmos::node::NmosNode;
use crate::nmos::resources::{ErrorBody, StagedPatch};

/// Largest accepted request, headers plus body
const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Accept loop; exits on shutdown signal or listener failure
pub(crate) async fn serve(node: NmosNode, listener: TcpListener, mut shutdown: mpsc::Receiver<()>) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let node = node.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(node, stream).await {
                                tracing::debug!(error = %e, "connection error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                }
            }
            _ = shutdown.recv() => {
                break;
            }
        }
    }
}

/// Parsed request: method, path, body
struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

async fn handle_connection(node: NmosNode, mut stream: TcpStream) -> std::io::Result<()> {
    let Some(request) = read_request(&mut stream).await? else {
        return Ok(());
    };

    tracing::debug!(method = %request.method, path = %request.path, "http request");

    let (status, body) = dispatch(&node, &request).await;
    write_response(&mut stream, status, &body).await
}

/// Read one request: request line, headers, and Content-Length body
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<Request>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            return Ok(None);
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    if method.is_empty() || path.is_empty() {
        return Ok(None);
    }

    let headers: HashMap<String, String> = lines
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect();

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BYTES {
        return Ok(None);
    }

    let body_start = header_end + 4;
    let mut body = buf[body_start.min(buf.len())..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Some(Request { method, path, body }))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn write_response(stream: &mut TcpStream, status: u16, body: &str) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        202 => "Accepted",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    };

    let response = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Route a request to the node API or the connection API
async fn dispatch(node: &NmosNode, request: &Request) -> (u16, String) {
    let path = request.path.trim_end_matches('/');

    if let Some(rest) = path.strip_prefix("/x-nmos/node/v1.3") {
        return node_api(node, &request.method, rest).await;
    }
    if let Some(rest) = path.strip_prefix("/x-nmos/connection/v1.1") {
        return connection_api(node, &request.method, rest, &request.body).await;
    }
    if path == "/x-nmos" {
        return (200, r#"["node/","connection/"]"#.to_string());
    }

    not_found("unknown path")
}

/// IS-04 node API (read-only)
async fn node_api(node: &NmosNode, method: &str, path: &str) -> (u16, String) {
    if method != "GET" {
        return error_response(405, "node API is read-only");
    }

    match path {
        "" => (
            200,
            r#"["self/","devices/","sources/","flows/","senders/","receivers/"]"#.to_string(),
        ),
        "/self" => json_or_error(&node.self_resource()),
        "/senders" => json_or_error(&node.senders().await),
        "/receivers" => json_or_error(&node.receivers().await),
        // Devices, sources, and flows are not modeled by this endpoint.
        "/devices" | "/sources" | "/flows" => (200, "[]".to_string()),
        _ => not_found("unknown node resource"),
    }
}

/// IS-05 connection API
async fn connection_api(node: &NmosNode, method: &str, path: &str, body: &[u8]) -> (u16, String) {
    match path {
        "" => return (200, r#"["single/"]"#.to_string()),
        "/single" => return (200, r#"["receivers/"]"#.to_string()),
        "/single/receivers" => {
            let ids: Vec<String> = node
                .receivers()
                .await
                .into_iter()
                .map(|r| format!("{}/", r.id))
                .collect();
            return json_or_error(&ids);
        }
        _ => {}
    }

    let Some(rest) = path.strip_prefix("/single/receivers/") else {
        return not_found("unknown connection resource");
    };

    let (receiver_id, endpoint) = match rest.split_once('/') {
        Some((id, endpoint)) => (id, endpoint),
        None => (rest, ""),
    };

    match (method, endpoint) {
        ("GET", "") => (200, r#"["staged/","active/"]"#.to_string()),
        ("GET", "staged") => result_response(node.staged(receiver_id).await),
        ("GET", "active") => result_response(node.active(receiver_id).await),
        ("PATCH", "staged") => {
            let patch: StagedPatch = match serde_json::from_slice(body) {
                Ok(patch) => patch,
                Err(e) => return error_response(400, &format!("malformed JSON body: {e}")),
            };
            match node.patch_staged(receiver_id, patch).await {
                Ok((status, state)) => match serde_json::to_string(&state) {
                    Ok(body) => (status, body),
                    Err(e) => error_response(500, &e.to_string()),
                },
                Err(e) => error_from(&e),
            }
        }
        ("GET" | "PATCH", _) => not_found("unknown connection endpoint"),
        _ => error_response(405, "unsupported method"),
    }
}

fn result_response<T: serde::Serialize>(result: crate::error::Result<T>) -> (u16, String) {
    match result {
        Ok(value) => json_or_error(&value),
        Err(e) => error_from(&e),
    }
}

fn json_or_error<T: serde::Serialize>(value: &T) -> (u16, String) {
    match serde_json::to_string(value) {
        Ok(body) => (200, body),
        Err(e) => error_response(500, &e.to_string()),
    }
}

/// Map an error to the NMOS error body and status
fn error_from(error: &Aes67Error) -> (u16, String) {
    let status = match error {
        Aes67Error::UnknownResource(_) => 404,
        Aes67Error::InvalidConfig { .. } | Aes67Error::InvalidSdp(_) => 400,
        _ => 500,
    };
    error_response(status, &error.to_string())
}

fn error_response(status: u16, message: &str) -> (u16, String) {
    let body = ErrorBody {
        code: status,
        error: message.to_string(),
        debug: None,
    };
    (
        status,
        serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string()),
    )
}

fn not_found(message: &str) -> (u16, String) {
    error_response(404, message)
}
