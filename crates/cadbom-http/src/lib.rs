//! # cadbom-http
//!
//! Minimal JSON-over-HTTP surface for the BOM engine. One request per
//! connection, synchronous, no framework: the routes mirror the engine
//! operations one to one and map `BomError` kinds onto status codes.

use cadbom_core::{BomEngine, BomError, Scope, ScopeStore};
use serde_json::{Map, Value, json};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_HEADER_LINES: usize = 100;
const MAX_HEADER_LINE_BYTES: usize = 8 * 1024;

/// Per-connection read and write timeout.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub bind: SocketAddr,
    pub io_timeout: Duration,
}

impl HttpServerConfig {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpServeError {
    #[error("bind failed: {0}")]
    Bind(std::io::Error),
    #[error("accept failed: {0}")]
    Accept(std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, kind: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into(), "kind": kind }),
        }
    }
}

impl From<BomError> for HttpResponse {
    fn from(err: BomError) -> Self {
        Self::error(status_for(&err), err.kind(), err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Healthz,
    Index,
    List,
    Link,
    Unlink,
    UpdateQty,
    Note,
    Explode,
    Tree,
    Summary,
    Purge,
    ReplaceChildren,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
enum RouteError {
    #[error("unknown route: {0}")]
    NotFound(String),
    #[error("method not allowed; use {0}")]
    MethodNotAllowed(&'static str),
}

#[derive(Debug, Error)]
enum RequestError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("request body of {0} bytes exceeds {MAX_BODY_BYTES}")]
    TooLarge(usize),
    #[error("request header exceeds {MAX_HEADER_LINES} lines of {MAX_HEADER_LINE_BYTES} bytes")]
    HeaderTooLarge,
    #[error("failed to read request: {0}")]
    Io(#[from] std::io::Error),
}

struct Request {
    method: String,
    path: String,
    body: Vec<u8>,
}

const ROUTES: &[(&str, &str, Route)] = &[
    ("GET", "/healthz", Route::Healthz),
    ("GET", "/", Route::Index),
    ("POST", "/api/assembly/list", Route::List),
    ("POST", "/api/assembly/link", Route::Link),
    ("POST", "/api/assembly/unlink", Route::Unlink),
    ("POST", "/api/assembly/updateQty", Route::UpdateQty),
    ("POST", "/api/assembly/note", Route::Note),
    ("POST", "/api/assembly/explode", Route::Explode),
    ("POST", "/api/bom/tree", Route::Tree),
    ("POST", "/api/bom/summary", Route::Summary),
    ("POST", "/api/bom/purge", Route::Purge),
    ("POST", "/api/bom/upsert", Route::ReplaceChildren),
];

/// Bind `config.bind` and serve until the listener fails.
pub fn serve<S: ScopeStore>(
    engine: &BomEngine<S>,
    config: &HttpServerConfig,
) -> Result<(), HttpServeError> {
    let listener = TcpListener::bind(config.bind).map_err(HttpServeError::Bind)?;
    info!(bind = %config.bind, "cadbom http listening");
    serve_listener(listener, engine, config.io_timeout, None)
}

/// Serve connections from an already bound listener, stopping after
/// `max_requests` connections when given. A client that stalls longer than
/// `io_timeout` gets a 408 and is dropped.
pub fn serve_listener<S: ScopeStore>(
    listener: TcpListener,
    engine: &BomEngine<S>,
    io_timeout: Duration,
    max_requests: Option<usize>,
) -> Result<(), HttpServeError> {
    if max_requests == Some(0) {
        return Ok(());
    }
    let mut served = 0usize;

    for stream in listener.incoming() {
        let mut stream = stream.map_err(HttpServeError::Accept)?;
        let timeouts = stream
            .set_read_timeout(Some(io_timeout))
            .and_then(|()| stream.set_write_timeout(Some(io_timeout)));
        if let Err(err) = timeouts {
            warn!(error = %err, "failed to set connection timeouts");
        } else if let Err(err) = handle_connection(&mut stream, engine) {
            warn!(error = %err, "failed to write response");
        }
        served += 1;
        if let Some(limit) = max_requests
            && served >= limit
        {
            break;
        }
    }

    Ok(())
}

fn handle_connection<S: ScopeStore>(
    stream: &mut TcpStream,
    engine: &BomEngine<S>,
) -> std::io::Result<()> {
    let response = match read_request(&mut *stream) {
        Ok(request) => {
            let response = handle_request(engine, &request.method, &request.path, &request.body);
            debug!(method = %request.method, path = %request.path, status = response.status, "handled request");
            response
        }
        Err(err) => {
            let response = request_error_response(err);
            debug!(status = response.status, "rejected request");
            response
        }
    };
    write_json_response(stream, &response)
}

fn request_error_response(err: RequestError) -> HttpResponse {
    match err {
        RequestError::TooLarge(_) => HttpResponse::error(413, "payload_too_large", err.to_string()),
        RequestError::HeaderTooLarge => {
            HttpResponse::error(431, "header_too_large", err.to_string())
        }
        RequestError::Io(ref io)
            if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
        {
            HttpResponse::error(408, "request_timeout", err.to_string())
        }
        RequestError::BadRequest(_) | RequestError::Io(_) => {
            HttpResponse::error(400, "bad_request", err.to_string())
        }
    }
}

/// Dispatch one request against the engine.
pub fn handle_request<S: ScopeStore>(
    engine: &BomEngine<S>,
    method: &str,
    path: &str,
    body: &[u8],
) -> HttpResponse {
    let route = match parse_route(method, path) {
        Ok(route) => route,
        Err(err @ RouteError::NotFound(_)) => {
            return HttpResponse::error(404, "not_found", err.to_string());
        }
        Err(err @ RouteError::MethodNotAllowed(_)) => {
            return HttpResponse::error(405, "method_not_allowed", err.to_string());
        }
    };

    let body = match parse_body(body) {
        Ok(body) => body,
        Err(msg) => return HttpResponse::error(400, "bad_request", msg),
    };

    match execute_route(engine, route, &body) {
        Ok(value) => HttpResponse::ok(value),
        Err(err) => {
            if status_for(&err) >= 500 {
                warn!(error = %err, "request failed");
            }
            err.into()
        }
    }
}

fn parse_route(method: &str, target: &str) -> Result<Route, RouteError> {
    let path = target.split_once('?').map_or(target, |(path, _)| path);
    let (expected, _, route) = ROUTES
        .iter()
        .find(|(_, candidate, _)| *candidate == path)
        .ok_or_else(|| RouteError::NotFound(path.to_string()))?;
    if method != *expected {
        return Err(RouteError::MethodNotAllowed(*expected));
    }
    Ok(*route)
}

fn parse_body(body: &[u8]) -> Result<Map<String, Value>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("request body must be a JSON object".to_string()),
        Err(err) => Err(format!("invalid JSON body: {err}")),
    }
}

fn execute_route<S: ScopeStore>(
    engine: &BomEngine<S>,
    route: Route,
    body: &Map<String, Value>,
) -> Result<Value, BomError> {
    match route {
        Route::Healthz => Ok(json!({ "ok": true })),
        Route::Index => Ok(json!({
            "service": "cadbom.http.v1",
            "routes": ROUTES
                .iter()
                .map(|(method, path, _)| format!("{method} {path}"))
                .collect::<Vec<_>>(),
        })),
        Route::List => {
            let scope = scope_from(body)?;
            let part = match body.get("part") {
                Some(part) => part.clone(),
                None => Value::Object(body.clone()),
            };
            to_json(&engine.list_assembly(&scope, &part)?)
        }
        Route::Link => {
            let scope = scope_from(body)?;
            let qty = body.get("qty").cloned().unwrap_or(json!(1));
            to_json(&engine.link(&scope, field(body, "parent"), field(body, "child"), &qty)?)
        }
        Route::Unlink => {
            let scope = scope_from(body)?;
            to_json(&engine.unlink(&scope, field(body, "parent"), field(body, "child"))?)
        }
        Route::UpdateQty => {
            let scope = scope_from(body)?;
            to_json(&engine.update_quantity(
                &scope,
                field(body, "parent"),
                field(body, "child"),
                field(body, "qty"),
            )?)
        }
        Route::Note => {
            let scope = scope_from(body)?;
            let note = body.get("note").and_then(Value::as_str).ok_or_else(|| {
                BomError::InvalidRequest("`note` is required and must be a string".to_string())
            })?;
            to_json(&engine.set_note(&scope, field(body, "parent"), field(body, "child"), note)?)
        }
        Route::Explode => {
            let scope = scope_from(body)?;
            let rows = engine.explode(&scope, field(body, "root"))?;
            Ok(json!({ "rows": to_json(&rows)? }))
        }
        Route::Tree => {
            let scope = scope_from(body)?;
            let tree = engine.build_tree(&scope, field(body, "root"))?;
            Ok(json!({ "tree": to_json(&tree)? }))
        }
        Route::Summary => {
            let scope = scope_from(body)?;
            to_json(&engine.summary(&scope)?)
        }
        Route::Purge => {
            let scope = scope_from(body)?;
            to_json(&engine.remove_all_references(&scope, field(body, "part"))?)
        }
        Route::ReplaceChildren => {
            let scope = scope_from(body)?;
            to_json(&engine.replace_children(&scope, field(body, "parent"), field(body, "items"))?)
        }
    }
}

fn field<'a>(body: &'a Map<String, Value>, name: &str) -> &'a Value {
    body.get(name).unwrap_or(&Value::Null)
}

/// Project number and name may arrive as strings or bare numbers.
fn scope_from(body: &Map<String, Value>) -> Result<Scope, BomError> {
    let text = |name: &str| match body.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    Scope::new(&text("projectNumber"), &text("projectName"))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, BomError> {
    serde_json::to_value(value).map_err(|e| BomError::Storage(format!("serialize response: {e}")))
}

fn status_for(err: &BomError) -> u16 {
    match err {
        BomError::InvalidPartReference(_)
        | BomError::InvalidQuantity(_)
        | BomError::InvalidRequest(_)
        | BomError::InvalidScope(_)
        | BomError::PolicyViolation(_) => 400,
        BomError::CircularLink { .. } => 409,
        BomError::ParentNotFound(_) | BomError::ChildLinkNotFound { .. } => 404,
        BomError::CycleDetected { .. } | BomError::DepthExceeded { .. } => 422,
        BomError::LockBusy { .. } => 503,
        BomError::Storage(_) | BomError::Config(_) => 500,
    }
}

fn read_request(stream: impl Read) -> Result<Request, RequestError> {
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    if read_header_line(&mut reader, &mut line)? == 0 {
        return Err(RequestError::BadRequest("empty request".to_string()));
    }
    let (method, path) = parse_request_line(&line)?;

    let mut content_length = 0usize;
    let mut header_lines = 0usize;
    loop {
        if read_header_line(&mut reader, &mut line)? == 0 {
            break;
        }
        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        header_lines += 1;
        if header_lines > MAX_HEADER_LINES {
            return Err(RequestError::HeaderTooLarge);
        }
        if let Some((name, value)) = header.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().map_err(|_| {
                RequestError::BadRequest(format!("invalid content-length: {}", value.trim()))
            })?;
        }
    }

    if content_length > MAX_BODY_BYTES {
        return Err(RequestError::TooLarge(content_length));
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    Ok(Request { method, path, body })
}

/// Read one line into `line`, refusing lines past the header size cap.
fn read_header_line(reader: &mut impl BufRead, line: &mut String) -> Result<usize, RequestError> {
    line.clear();
    let read = reader
        .take(MAX_HEADER_LINE_BYTES as u64 + 1)
        .read_line(line)?;
    if read > MAX_HEADER_LINE_BYTES {
        return Err(RequestError::HeaderTooLarge);
    }
    Ok(read)
}

fn parse_request_line(line: &str) -> Result<(String, String), RequestError> {
    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RequestError::BadRequest("missing method".to_string()))?;
    let target = parts
        .next()
        .ok_or_else(|| RequestError::BadRequest("missing target".to_string()))?;
    Ok((method.to_string(), target.to_string()))
}

fn write_json_response(stream: &mut TcpStream, response: &HttpResponse) -> std::io::Result<()> {
    let body = serde_json::to_vec_pretty(&response.body)?;
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST\r\nConnection: close\r\n\r\n",
        response.status,
        reason_phrase(response.status),
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(&body)?;
    stream.flush()
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
