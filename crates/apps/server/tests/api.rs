//! Integration tests for the HTTP surface
//!
//! Requests go through the full axum router against a scripted job service.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use dreamy_jobs::testing::ScriptedService;
use dreamy_jobs::variant::TRELLIS_VERSION;
use dreamy_jobs::{ApiToken, JobProxy, ModelRef, ServiceError};
use dreamy_server::{router, AppState, ServerConfig, Variants};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app(service: &Arc<ScriptedService>, token: Option<&str>) -> Router {
    let config = ServerConfig::from_lookup(|_| None).unwrap();
    let proxy = JobProxy::new(service.clone(), token.and_then(ApiToken::new));
    router(AppState::new(proxy, Variants::from_config(&config)))
}

async fn post(app: Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
    });
    (status, body)
}

fn starting() -> Value {
    json!({"id": "x1", "status": "starting"})
}

#[tokio::test]
async fn test_health_and_index() {
    let service = Arc::new(ScriptedService::new(starting()));

    let (status, body) = send(
        app(&service, Some("r8_test")),
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));

    let (status, body) = send(
        app(&service, Some("r8_test")),
        Request::get("/").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("DreamyBot API ready"));
}

#[tokio::test(start_paused = true)]
async fn test_generate_relays_result() {
    let done = json!({"id": "x1", "status": "succeeded", "output": "http://img"});
    let service = Arc::new(ScriptedService::new(starting()).then_poll(done.clone()));

    let (status, body) = post(
        app(&service, Some("r8_test")),
        "/generate",
        json!({"input": {"prompt": "a cat"}}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["output"], json!("http://img"));
    assert_eq!(body, done);

    let submission = &service.submissions()[0];
    assert_eq!(submission.model, ModelRef::model("google", "imagen-4-ultra"));
    assert_eq!(Value::Object(submission.input.clone()), json!({"prompt": "a cat"}));
}

#[tokio::test]
async fn test_generate_without_input_makes_no_call() {
    let service = Arc::new(ScriptedService::new(starting()));

    for body in [json!({}), json!({"input": null}), json!({"input": {}}), json!([1, 2])] {
        let (status, response) = post(app(&service, Some("r8_test")), "/generate", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response, json!({"error": "Missing 'input' in request body"}));
    }

    assert_eq!(service.total_calls(), 0);
}

#[tokio::test]
async fn test_unparseable_body_is_client_error() {
    let service = Arc::new(ScriptedService::new(starting()));
    let request = Request::post("/generate")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, _) = send(app(&service, Some("r8_test")), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(service.total_calls(), 0);
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let service = Arc::new(ScriptedService::new(starting()));
    let prompt = "a".repeat(3 * 1024 * 1024);

    let (status, body) = post(
        app(&service, Some("r8_test")),
        "/generate",
        json!({"input": {"prompt": prompt}}),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], json!("Request body too large"));
    assert!(body["detail"].is_string());

    let (status, body) = post(
        app(&service, Some("r8_test")),
        "/chat",
        json!({"messages": [{"role": "user", "content": prompt}]}),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["ok"], json!(false));

    assert_eq!(service.total_calls(), 0);
}

#[tokio::test]
async fn test_missing_credential_makes_no_call() {
    let service = Arc::new(ScriptedService::new(starting()));

    let (status, body) = post(
        app(&service, None),
        "/generate",
        json!({"input": {"prompt": "a cat"}}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "REPLICATE_API_TOKEN not set"}));

    let (status, _) = post(
        app(&service, None),
        "/mesh",
        json!({"imageUrl": "http://cat.png"}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(service.total_calls(), 0);
}

#[tokio::test]
async fn test_submission_error_is_500_with_detail() {
    let service = Arc::new(ScriptedService::failing_creation(
        ServiceError::new("Remote service returned 401 Unauthorized")
            .with_status(401)
            .with_detail(json!({"detail": "Invalid token."})),
    ));

    let (status, body) = post(
        app(&service, Some("r8_bad")),
        "/generate",
        json!({"input": {"prompt": "a cat"}}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"error": "Failed to call Imagen", "detail": {"detail": "Invalid token."}})
    );
    assert!(!body.to_string().contains("r8_bad"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_is_502() {
    let failed = json!({"id": "x1", "status": "failed", "error": "CUDA out of memory"});
    let service = Arc::new(ScriptedService::new(starting()).then_poll(failed.clone()));

    let (status, body) = post(
        app(&service, Some("r8_test")),
        "/mesh",
        json!({"imageUrl": "http://cat.png"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, json!({"error": "Trellis failed", "detail": failed}));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_504_with_last_snapshot() {
    let running = json!({"id": "x1", "status": "processing", "logs": "sampling 12/38"});
    let service = Arc::new(ScriptedService::new(starting()).then_poll(running.clone()));

    let (status, body) = post(
        app(&service, Some("r8_test")),
        "/mesh",
        json!({"imageUrl": "http://cat.png"}),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body, json!({"error": "Trellis polling timeout", "last": running}));
    // 180s deadline at a 2s interval
    assert_eq!(service.get_calls(), 90);
}

#[tokio::test(start_paused = true)]
async fn test_mesh_merges_defaults_and_protects_identity() {
    let done = json!({"id": "x1", "status": "succeeded", "output": {"model_file": "http://m.glb"}});
    let service = Arc::new(ScriptedService::new(starting()).then_poll(done.clone()));

    let (status, body) = post(
        app(&service, Some("r8_test")),
        "/mesh",
        json!({
            "imageUrl": "http://cat.png",
            "texture_size": 1024,
            "seed": 3,
            "images": ["http://other.png"],
            "generate_model": false
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, done);

    let submission = &service.submissions()[0];
    assert_eq!(submission.model, ModelRef::version(TRELLIS_VERSION));
    assert_eq!(
        Value::Object(submission.input.clone()),
        json!({
            "texture_size": 1024,
            "mesh_simplify": 0.9,
            "generate_model": true,
            "save_gaussian_ply": true,
            "ss_sampling_steps": 38,
            "seed": 3,
            "images": ["http://cat.png"]
        })
    );
}

#[tokio::test]
async fn test_mesh_requires_image_url() {
    let service = Arc::new(ScriptedService::new(starting()));

    for body in [json!({}), json!({"imageUrl": ""}), json!({"imageUrl": 42})] {
        let (status, response) = post(app(&service, Some("r8_test")), "/mesh", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response, json!({"error": "Provide imageUrl"}));
    }

    assert_eq!(service.total_calls(), 0);
}

#[tokio::test]
async fn test_chat_returns_output_envelope() {
    let service = Arc::new(ScriptedService::new(json!({
        "id": "c1",
        "status": "succeeded",
        "output": ["Hello", "!"]
    })));
    let messages = json!([{"role": "user", "content": "hi"}]);

    let (status, body) = post(
        app(&service, Some("r8_test")),
        "/chat",
        json!({"messages": messages}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "output": ["Hello", "!"]}));
    assert_eq!(service.get_calls(), 0);

    let submission = &service.submissions()[0];
    assert_eq!(submission.model, ModelRef::model("openai", "gpt-4o"));
    assert!(submission.sync_wait.is_some());
    assert_eq!(submission.input["messages"], messages);
}

#[tokio::test]
async fn test_chat_errors_use_ok_envelope() {
    let service = Arc::new(ScriptedService::new(starting()));

    let (status, body) = post(app(&service, Some("r8_test")), "/chat", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"ok": false, "error": "Missing 'messages' in request body"})
    );

    let (status, body) = post(
        app(&service, None),
        "/chat",
        json!({"messages": [{"role": "user", "content": "hi"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["ok"], json!(false));

    assert_eq!(service.total_calls(), 0);
}

#[tokio::test]
async fn test_generate_inline_embeds_image() {
    let service = Arc::new(
        ScriptedService::new(json!({"id": "x1", "status": "succeeded", "output": "http://img"}))
            .with_download(b"jpeg-bytes", "image/jpeg"),
    );

    let (status, body) = post(
        app(&service, Some("r8_test")),
        "/generate",
        json!({"input": {"prompt": "a cat"}, "inline": true}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"output": "anBlZy1ieXRlcw==", "type": "image/jpeg"}));
}

#[tokio::test(start_paused = true)]
async fn test_metrics_endpoint_counts_jobs() {
    let service = Arc::new(
        ScriptedService::new(starting())
            .then_poll(json!({"id": "x1", "status": "succeeded", "output": "http://img"})),
    );
    let app = app(&service, Some("r8_test"));

    post(app.clone(), "/generate", json!({"input": {"prompt": "a cat"}})).await;
    post(app.clone(), "/generate", json!({})).await;

    let (status, body) = send(app, Request::get("/metrics").body(Body::empty()).unwrap()).await;
    let text = body.as_str().unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("jobs_submitted 1\n"));
    assert!(text.contains("jobs_succeeded 1\n"));
    assert!(text.contains("status_polls 1\n"));
    assert!(text.contains("rejected_requests 1\n"));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_request_stops_polling() {
    let running = json!({"id": "x1", "status": "processing"});
    let service = Arc::new(ScriptedService::new(starting()).then_poll(running));
    let request = Request::post("/mesh")
        .header("content-type", "application/json")
        .body(Body::from(json!({"imageUrl": "http://cat.png"}).to_string()))
        .unwrap();

    // the client gives up after 7s, three polls in
    let response = tokio::time::timeout(
        Duration::from_secs(7),
        app(&service, Some("r8_test")).oneshot(request),
    )
    .await;
    assert!(response.is_err());
    assert_eq!(service.get_calls(), 3);

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(service.get_calls(), 3);
    assert_eq!(service.cancel_calls(), 1);
}
