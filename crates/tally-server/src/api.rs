//! HTTP handlers over the storage contract.
//!
//! JSON routes (`/update/`, `/updates/`, `/value/`) receive their body after
//! the decoding middleware has decrypted, verified and decompressed it.

use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use std::fmt::Write;
use tally_common::types::{InvalidMetric, Metric, MetricKind, Update};
use tally_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        if e.is_not_registered() {
            ApiError::NotFound(e.to_string())
        } else {
            ApiError::Storage(e)
        }
    }
}

impl From<InvalidMetric> for ApiError {
    fn from(e: InvalidMetric) -> Self {
        match e {
            InvalidMetric::EmptyId => ApiError::NotFound(e.to_string()),
            _ => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

fn parse_kind(kind: &str) -> Result<MetricKind, ApiError> {
    kind.parse().map_err(ApiError::from)
}

async fn read_metric(state: &AppState, kind: MetricKind, name: &str) -> Result<Metric, ApiError> {
    Ok(match kind {
        MetricKind::Counter => Metric::counter(name, state.storage.get_counter(name).await?),
        MetricKind::Gauge => Metric::gauge(name, state.storage.get_gauge(name).await?),
    })
}

async fn apply_update(state: &AppState, update: Update) -> Result<Metric, ApiError> {
    Ok(match update {
        Update::Counter { name, delta } => {
            let total = state.storage.update_counter(&name, delta).await?;
            tracing::debug!(name = %name, delta, total, "Counter updated");
            Metric::counter(name, total)
        }
        Update::Gauge { name, value } => {
            let stored = state.storage.update_gauge(&name, value).await?;
            tracing::debug!(name = %name, value = stored, "Gauge updated");
            Metric::gauge(name, stored)
        }
    })
}

/// `POST /updates/` with a JSON array. Every record is validated before any
/// is stored.
pub async fn update_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let metrics: Vec<Metric> = parse_json(&body)?;
    let batch = metrics
        .into_iter()
        .enumerate()
        .map(|(i, m)| {
            Update::try_from(m).map_err(|e| match ApiError::from(e) {
                ApiError::NotFound(msg) => ApiError::NotFound(format!("record {i}: {msg}")),
                ApiError::BadRequest(msg) => ApiError::BadRequest(format!("record {i}: {msg}")),
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    state.storage.insert_batch(&batch).await?;
    tracing::debug!(records = batch.len(), "Batch stored");
    Ok(StatusCode::OK)
}

/// `POST /update/` with one JSON record. Answers with the stored value.
pub async fn update_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Metric>, ApiError> {
    let metric: Metric = parse_json(&body)?;
    let update = Update::try_from(metric)?;
    Ok(Json(apply_update(&state, update).await?))
}

/// `POST /update/{type}/{name}/{value}`.
pub async fn update_path(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let update = match parse_kind(&kind)? {
        MetricKind::Counter => Update::Counter {
            delta: value
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid counter delta '{value}'")))?,
            name,
        },
        MetricKind::Gauge => Update::Gauge {
            value: value
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid gauge value '{value}'")))?,
            name,
        },
    };
    apply_update(&state, update).await?;
    Ok(StatusCode::OK)
}

/// `POST /value/` with `{"id", "type"}`.
pub async fn value_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Metric>, ApiError> {
    let query: Metric = parse_json(&body)?;
    if query.id.is_empty() {
        return Err(InvalidMetric::EmptyId.into());
    }
    Ok(Json(read_metric(&state, query.kind, &query.id).await?))
}

/// `GET /value/{type}/{name}` as plain text.
pub async fn value_path(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let metric = read_metric(&state, parse_kind(&kind)?, &name).await?;
    Ok(match (metric.delta, metric.value) {
        (Some(delta), _) => delta.to_string(),
        (_, Some(value)) => value.to_string(),
        _ => String::new(),
    })
}

/// `GET /`: an HTML table of every metric, counters first.
pub async fn list(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let counters = state.storage.get_all_counters().await?;
    let gauges = state.storage.get_all_gauges().await?;

    let mut rows = String::new();
    for (name, value) in &counters {
        let _ = write!(rows, "<tr><td>{name}</td><td>{value}</td></tr>");
    }
    for (name, value) in &gauges {
        let _ = write!(rows, "<tr><td>{name}</td><td>{value:.2}</td></tr>");
    }

    Ok(Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n\
         <head><meta charset=\"UTF-8\"><title>Live metrics</title></head>\n\
         <body>\n<table>\n<thead><tr><th>Name</th><th>Value</th></tr></thead>\n\
         <tbody>{rows}</tbody>\n</table>\n</body>\n</html>\n"
    )))
}

/// `GET /ping`: 200 when the storage backend answers.
pub async fn ping(State(state): State<AppState>) -> Response {
    match state.storage.ping().await {
        Ok(()) => (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "pong")
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Storage ping failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
