//! Request audit logging.
//!
//! Every request is recorded before authentication or rate limiting runs, so
//! rejected calls leave a trail too. Recording never fails a request.

use std::collections::BTreeMap;
use std::sync::Mutex;

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{Request, State},
    http::{
        header::{CONTENT_LENGTH, TRANSFER_ENCODING},
        HeaderMap,
    },
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use foundry_registry::Environment;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::request_context::{caller_ip, header_string, request_id, ENVIRONMENT_HEADER};
use crate::state::AppState;

/// Bodies larger than this are not buffered for the audit record.
pub const MAX_CAPTURED_BODY: usize = 64 * 1024;

pub const REDACTED: &str = "[REDACTED]";
pub const NOT_CAPTURED: &str = "[not captured]";

const REDACTED_HEADERS: [&str; 4] = [
    "authorization",
    "proxy-authorization",
    "cookie",
    "x-api-key",
];
const REDACTED_BODY_FIELDS: [&str; 1] = ["licenseKey"];

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub caller_ip: String,
    pub method: String,
    pub path: String,
    /// Claimed environment, or `unknown`. Not proof of authentication.
    pub environment: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditLogEntry);
}

/// Emits each entry as one event on the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &AuditLogEntry) {
        let headers = serde_json::to_string(&entry.headers).unwrap_or_default();
        info!(
            target: "audit",
            timestamp = %entry.timestamp.to_rfc3339(),
            request_id = %entry.request_id,
            caller_ip = %entry.caller_ip,
            method = %entry.method,
            path = %entry.path,
            environment = %entry.environment,
            headers = %headers,
            body = %entry.body,
            "request"
        );
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &AuditLogEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
    }
}

pub fn redact_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut redacted = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        let value = if REDACTED_HEADERS.contains(&name) {
            REDACTED.to_string()
        } else {
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        };
        redacted
            .entry(name.to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    redacted
}

/// Audit form of a captured body: JSON with secrets redacted, else the raw text.
pub fn redact_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(mut json) => {
            if let Value::Object(map) = &mut json {
                for field in REDACTED_BODY_FIELDS {
                    if let Some(value) = map.get_mut(field) {
                        *value = Value::String(REDACTED.to_string());
                    }
                }
            }
            json
        }
        Err(_) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn claimed_environment(headers: &HeaderMap) -> String {
    header_string(headers, ENVIRONMENT_HEADER)
        .and_then(|v| v.parse::<Environment>().ok())
        .map(|env| env.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// How the request body is treated for the audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyCapture {
    /// The request carries no body.
    Absent,
    /// Declared length within [`MAX_CAPTURED_BODY`]; buffer it.
    Buffer,
    /// Too large, chunked or of unknown length; left untouched.
    Skip,
}

fn body_capture(request: &Request) -> BodyCapture {
    let headers = request.headers();
    if let Some(length) = header_string(headers, CONTENT_LENGTH.as_str()) {
        return match length.trim().parse::<usize>() {
            Ok(len) if len <= MAX_CAPTURED_BODY => BodyCapture::Buffer,
            _ => BodyCapture::Skip,
        };
    }
    if headers.contains_key(TRANSFER_ENCODING) {
        return BodyCapture::Skip;
    }
    match request.body().size_hint().exact() {
        Some(0) => BodyCapture::Absent,
        _ => BodyCapture::Skip,
    }
}

/// Middleware recording every request through the configured sink.
pub async fn record(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let headers = request.headers();
    let mut entry = AuditLogEntry {
        timestamp: Utc::now(),
        request_id: request_id(headers),
        caller_ip: caller_ip(&request, state.trust_forwarded_for())
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        environment: claimed_environment(headers),
        headers: redact_headers(headers),
        body: Value::String(NOT_CAPTURED.to_string()),
    };

    let request = match body_capture(&request) {
        BodyCapture::Absent => {
            entry.body = Value::Null;
            request
        }
        BodyCapture::Buffer => {
            let (parts, body) = request.into_parts();
            let bytes = match axum::body::to_bytes(body, MAX_CAPTURED_BODY).await {
                Ok(bytes) => {
                    entry.body = redact_body(&bytes);
                    bytes
                }
                Err(e) => {
                    warn!(request_id = %entry.request_id, error = %e, "Failed to read request body for audit");
                    Bytes::new()
                }
            };
            Request::from_parts(parts, Body::from(bytes))
        }
        BodyCapture::Skip => request,
    };

    state.audit().record(&entry);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_sensitive_headers_are_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer s3cret"));
        headers.insert("proxy-authorization", HeaderValue::from_static("Basic cHJveHk6cHc="));
        headers.insert("cookie", HeaderValue::from_static("session=abc"));
        headers.insert("x-api-key", HeaderValue::from_static("k"));
        headers.insert("x-environment", HeaderValue::from_static("staging"));

        let redacted = redact_headers(&headers);
        assert_eq!(redacted["authorization"], REDACTED);
        assert_eq!(redacted["proxy-authorization"], REDACTED);
        assert_eq!(redacted["cookie"], REDACTED);
        assert_eq!(redacted["x-api-key"], REDACTED);
        assert_eq!(redacted["x-environment"], "staging");
    }

    #[test]
    fn test_license_key_is_redacted() {
        let body = json!({"worldId": "w1", "slot": 0, "licenseKey": "ABCD-EFGH"});
        let redacted = redact_body(body.to_string().as_bytes());
        assert_eq!(redacted["licenseKey"], REDACTED);
        assert_eq!(redacted["worldId"], "w1");
    }

    #[test]
    fn test_non_json_body_kept_as_text() {
        assert_eq!(redact_body(b"{not json"), Value::String("{not json".to_string()));
        assert_eq!(redact_body(b""), Value::Null);
    }

    #[test]
    fn test_claimed_environment() {
        let mut headers = HeaderMap::new();
        assert_eq!(claimed_environment(&headers), "unknown");

        headers.insert(ENVIRONMENT_HEADER, HeaderValue::from_static("qa"));
        assert_eq!(claimed_environment(&headers), "unknown");

        headers.insert(ENVIRONMENT_HEADER, HeaderValue::from_static("production"));
        assert_eq!(claimed_environment(&headers), "production");
    }

    fn request_with(content_length: Option<usize>, chunked: bool, body: Body) -> Request {
        let mut builder = Request::builder().method("POST").uri("/api/instances/start");
        if let Some(len) = content_length {
            builder = builder.header(CONTENT_LENGTH, len);
        }
        if chunked {
            builder = builder.header(TRANSFER_ENCODING, "chunked");
        }
        builder.body(body).unwrap()
    }

    #[test]
    fn test_body_capture_bounds() {
        let within = request_with(Some(MAX_CAPTURED_BODY), false, Body::from("{}"));
        assert_eq!(body_capture(&within), BodyCapture::Buffer);

        let too_large = request_with(Some(MAX_CAPTURED_BODY + 1), false, Body::from("{}"));
        assert_eq!(body_capture(&too_large), BodyCapture::Skip);

        let chunked = request_with(None, true, Body::from("{}"));
        assert_eq!(body_capture(&chunked), BodyCapture::Skip);
    }

    #[test]
    fn test_bodyless_requests_are_absent_not_skipped() {
        let empty = request_with(None, false, Body::empty());
        assert_eq!(body_capture(&empty), BodyCapture::Absent);

        let unknown_length = request_with(None, false, Body::from("{}"));
        assert_eq!(body_capture(&unknown_length), BodyCapture::Skip);
    }

    #[test]
    fn test_memory_sink_keeps_entries() {
        let sink = MemoryAuditSink::new();
        let entry = AuditLogEntry {
            timestamp: Utc::now(),
            request_id: "r1".to_string(),
            caller_ip: "127.0.0.1".to_string(),
            method: "GET".to_string(),
            path: "/health".to_string(),
            environment: "unknown".to_string(),
            headers: BTreeMap::new(),
            body: Value::Null,
        };
        sink.record(&entry);
        assert_eq!(sink.entries(), vec![entry]);
    }
}
