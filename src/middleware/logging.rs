use axum::{
    body::{to_bytes, Body, Bytes},
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;

const BODY_LIMIT: usize = 1024 * 1024;
const LOGGED_BODY_CHARS: usize = 2000;

/// Logs every request and response with its body.
///
/// Provider notifications are logged in full (up to the truncation limit)
/// so a disputed payment can be traced from the raw payload. The caller's
/// bearer token never reaches the log.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let authenticated = request.headers().contains_key(header::AUTHORIZATION);
    let start = Instant::now();

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to read request body: {}", e);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        content_type = content_type(&parts.headers),
        authenticated,
        body = %truncate_body(&String::from_utf8_lossy(&bytes), LOGGED_BODY_CHARS),
        "→ Request"
    );

    let response = next
        .run(Request::from_parts(parts, Body::from(bytes)))
        .await;

    let status = response.status();
    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to read response body: {}", e);
            Bytes::new()
        }
    };

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = %start.elapsed().as_millis(),
        body = %truncate_body(&String::from_utf8_lossy(&bytes), LOGGED_BODY_CHARS),
        "← Response"
    );

    Response::from_parts(parts, Body::from(bytes))
}

fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// Truncate to `max_chars` characters, never splitting a code point
fn truncate_body(body: &str, max_chars: usize) -> String {
    let body = body.trim();
    match body.char_indices().nth(max_chars) {
        None => body.to_string(),
        Some((cut, _)) => format!(
            "{}...[truncated, {} bytes total]",
            &body[..cut],
            body.len()
        ),
    }
}
