use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tally_common::sign::HASH_HEADER;
use tally_common::{codec, crypto, sign};

use crate::logging::TraceId;
use crate::state::AppState;

/// Largest request body accepted by the JSON routes.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

fn reject(status: StatusCode, trace_id: &str, message: &str) -> Response {
    tracing::warn!(trace_id = %trace_id, status = status.as_u16(), "{message}");
    (status, message.to_string()).into_response()
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
}

/// Turns an agent request body back into plain JSON.
///
/// In order: RSA-decrypt when a private key is configured, check the
/// `HashSHA256` header against the (still compressed) bytes when a key is
/// configured, then gunzip when `Content-Encoding: gzip`. A request without
/// the hash header is let through. Any failure answers 400.
pub async fn decode_body(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let (mut parts, body) = req.into_parts();
    let mut bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => {
            return reject(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "request body too large or unreadable",
            )
        }
    };

    if let Some(private_key) = &state.private_key {
        bytes = match crypto::decrypt(private_key, &bytes) {
            Ok(plain) => plain,
            Err(_) => {
                return reject(StatusCode::BAD_REQUEST, &trace_id, "failed to decrypt request body")
            }
        };
    }

    if let Some(key) = &state.key {
        let provided = parts
            .headers
            .get(HASH_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty());
        if let Some(provided) = provided {
            if sign::verify(key, &bytes, provided).is_err() {
                return reject(StatusCode::BAD_REQUEST, &trace_id, "invalid hash");
            }
        }
    }

    if is_gzip(&parts.headers) {
        bytes = match codec::decompress(&bytes) {
            Ok(plain) => plain,
            Err(_) => {
                return reject(
                    StatusCode::BAD_REQUEST,
                    &trace_id,
                    "failed to decompress request body",
                )
            }
        };
        parts.headers.remove(header::CONTENT_ENCODING);
    }
    parts.headers.remove(header::CONTENT_LENGTH);

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Adds a `HashSHA256` header with the HMAC of the response body when a key
/// is configured.
pub async fn sign_response(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    let Some(key) = &state.key else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to buffer response for signing");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    match sign::sign(key, &bytes).map(|sig| HeaderValue::from_str(&sig)) {
        Ok(Ok(value)) => {
            parts.headers.insert(HASH_HEADER, value);
        }
        _ => tracing::error!("Failed to sign response"),
    }
    Response::from_parts(parts, Body::from(bytes))
}
