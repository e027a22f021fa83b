//! Trace-context propagation and request logging.
//!
//! Inbound `traceparent`/`tracestate` headers are honored per the W3C
//! trace-context format; every response carries them back together with a
//! plain `x-trace-id` header that support staff can quote.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

/// Our registered vendor key in `tracestate`.
pub const VENDOR_CODE: &str = "sanscrn";

/// Parsed or minted `traceparent` header content.
#[derive(Debug, Clone)]
pub struct TraceParent {
    pub version: String,
    pub trace_id: String,
    pub parent_id: String,
    pub trace_flags: String,
}

fn hex_token(length: usize) -> String {
    let mut token = String::new();
    while token.len() < length {
        token.push_str(&Uuid::new_v4().simple().to_string());
    }
    token.truncate(length);
    token
}

impl TraceParent {
    pub fn create() -> TraceParent {
        TraceParent {
            version: "00".to_string(),
            trace_id: hex_token(32),
            parent_id: hex_token(16),
            trace_flags: "00".to_string(),
        }
    }

    /// Parse an inbound header, keeping the caller's trace id and minting
    /// a fresh span id. Anything malformed falls back to a new context.
    pub fn from_header(header: Option<&str>) -> TraceParent {
        let Some(header) = header else { return TraceParent::create() };
        let parts: Vec<&str> = header.split('-').collect();
        if parts.len() < 4 {
            return TraceParent::create();
        }
        let (version, trace_id, parent_id, trace_flags) =
            (parts[0], parts[1], parts[2], parts[3]);
        let valid_hex = |value: &str, length: usize| {
            value.len() == length
                && value.chars().all(|c| c.is_ascii_hexdigit())
                && value.chars().any(|c| c != '0')
        };
        if version.len() != 2 || version == "ff" {
            return TraceParent::create();
        }
        if !valid_hex(trace_id, 32) || !valid_hex(parent_id, 16) {
            return TraceParent::create();
        }
        TraceParent {
            version: version.to_string(),
            trace_id: trace_id.to_string(),
            parent_id: hex_token(16),
            trace_flags: trace_flags.to_string(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.version, self.trace_id, self.parent_id, self.trace_flags
        )
    }
}

/// Rebuild `tracestate`: our vendor entry first, previous entries kept in
/// order, any prior entry of ours dropped.
pub fn build_tracestate(parent: &TraceParent, previous: &str) -> String {
    let mut entries: Vec<(String, String)> = vec![(VENDOR_CODE.to_string(), parent.parent_id.clone())];
    for span in previous.split(',') {
        let Some((vendor, value)) = span.split_once('=') else { continue };
        let vendor = vendor.trim().to_lowercase();
        if vendor == VENDOR_CODE || vendor.is_empty() {
            continue;
        }
        entries.push((vendor, value.trim().to_lowercase()));
    }
    entries
        .iter()
        .map(|(vendor, value)| format!("{vendor}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Accept inbound trace context and stamp it onto the response.
pub async fn trace_context(request: Request, next: Next) -> Response {
    let traceparent = TraceParent::from_header(
        request
            .headers()
            .get("traceparent")
            .and_then(|value| value.to_str().ok()),
    );
    let previous_state = request
        .headers()
        .get("tracestate")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    let mut request = request;
    request.extensions_mut().insert(traceparent.clone());

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&traceparent.render()) {
        headers.insert("traceparent", value);
    }
    if let Ok(value) = HeaderValue::from_str(&build_tracestate(&traceparent, &previous_state)) {
        headers.insert("tracestate", value);
    }
    if let Ok(value) = HeaderValue::from_str(&traceparent.trace_id) {
        headers.insert("x-trace-id", value);
    }
    response
}

/// Log every request with its timing and trace id.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let trace_id = request
        .extensions()
        .get::<TraceParent>()
        .map(|parent| parent.trace_id.clone())
        .unwrap_or_default();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        trace_id = trace_id.as_str(),
        "request"
    );
    response
}
