//! HTTP handlers for the job endpoints

use crate::error::{ApiError, Envelope};
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dreamy_jobs::{JobError, JobRequest, JobVariant, Prediction};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn index() -> &'static str {
    "DreamyBot API ready"
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.proxy.metrics().to_prometheus(),
    )
        .into_response()
}

/// `POST /generate` with `{input: {..}, inline?: bool}`
pub async fn generate(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let variant = state.variants.generate.clone();
    let body = object_body(&state, &variant, body, "Missing 'input' in request body")?;

    let input = match body.get("input") {
        Some(Value::Object(input)) if !input.is_empty() => input.clone(),
        _ => {
            return Err(reject(
                &state,
                &variant,
                "Missing 'input' in request body",
            ))
        }
    };
    let inline = body.get("inline").and_then(Value::as_bool).unwrap_or(false);

    let request = variant.build_input(input, JobRequest::new());
    let prediction = run_job(&state, &variant, request)
        .await
        .map_err(|e| ApiError::new(&variant.label, e))?;

    if inline {
        let download = state
            .proxy
            .download_output(&variant, &prediction)
            .await
            .map_err(|e| ApiError::new(&variant.label, e))?;
        return Ok(Json(json!({
            "output": STANDARD.encode(&download.bytes),
            "type": download.content_type,
        }))
        .into_response());
    }

    Ok(Json(prediction.into_payload()).into_response())
}

/// `POST /mesh` with `{imageUrl, ...extraParams}`
pub async fn mesh(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let variant = state.variants.mesh.clone();
    let mut params = object_body(&state, &variant, body, "Provide imageUrl")?;

    let image_url = match params.remove("imageUrl") {
        Some(Value::String(url)) if !url.trim().is_empty() => url,
        _ => return Err(reject(&state, &variant, "Provide imageUrl")),
    };

    let mut identity = JobRequest::new();
    identity.insert("images".into(), json!([image_url]));

    let request = variant.build_input(params, identity);
    let prediction = run_job(&state, &variant, request)
        .await
        .map_err(|e| ApiError::new(&variant.label, e))?;

    Ok(Json(prediction.into_payload()).into_response())
}

/// `POST /chat` with `{messages: [..]}`
pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let variant = state.variants.chat.clone();
    const MISSING: &str = "Missing 'messages' in request body";

    let body = object_body(&state, &variant, body, MISSING)
        .map_err(|e| e.with_envelope(Envelope::Ok))?;
    let messages = match body.get("messages") {
        Some(messages @ Value::Array(_)) => messages.clone(),
        _ => return Err(reject(&state, &variant, MISSING).with_envelope(Envelope::Ok)),
    };

    let mut request = JobRequest::new();
    request.insert("messages".into(), messages);

    let prediction = run_job(&state, &variant, request)
        .await
        .map_err(|e| ApiError::new(&variant.label, e).with_envelope(Envelope::Ok))?;

    Ok(Json(json!({
        "ok": true,
        "output": prediction.output().cloned().unwrap_or(Value::Null),
    }))
    .into_response())
}

/// Run the job on its own task so a dropped request cancels it
///
/// When the client disconnects, axum drops this future; the guard then
/// cancels the token and the spawned poll loop stops.
async fn run_job(
    state: &AppState,
    variant: &Arc<JobVariant>,
    request: JobRequest,
) -> Result<Prediction, JobError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let proxy = state.proxy.clone();
    let variant = variant.clone();
    let task = tokio::spawn(async move { proxy.run(&variant, request, &cancel).await });

    match task.await {
        Ok(result) => result,
        Err(e) => Err(JobError::Transport {
            message: format!("job task failed: {}", e),
            detail: None,
        }),
    }
}

fn object_body(
    state: &AppState,
    variant: &JobVariant,
    body: Result<Json<Value>, JsonRejection>,
    missing: &str,
) -> Result<Map<String, Value>, ApiError> {
    match body {
        Ok(Json(Value::Object(map))) => Ok(map),
        Ok(_) => Err(reject(state, variant, missing)),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            state.proxy.metrics().record_rejected();
            Err(ApiError::too_large(&variant.label, rejection.body_text()))
        }
        Err(rejection) => {
            tracing::debug!(variant = %variant.label, "unreadable body: {}", rejection.body_text());
            Err(reject(state, variant, missing))
        }
    }
}

fn reject(state: &AppState, variant: &JobVariant, message: &str) -> ApiError {
    state.proxy.metrics().record_rejected();
    ApiError::missing_input(&variant.label, message)
}
