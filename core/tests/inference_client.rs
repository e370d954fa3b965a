use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use reachy_core::{ChatBackend, ChatMessage, InferenceClient, InferenceError, InferenceRequest};

#[derive(Clone, Default)]
struct Backend {
    attempts: Arc<AtomicUsize>,
    last_auth: Arc<Mutex<Option<String>>>,
    last_body: Arc<Mutex<Option<Value>>>,
}

async fn spawn_server(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr, api_key: Option<&str>, timeout_ms: u64, max_retries: u32) -> InferenceClient {
    InferenceClient::new(
        &format!("http://{}", addr),
        "/v1/chat/completions",
        api_key,
        timeout_ms,
        max_retries,
    )
    .unwrap()
}

fn request() -> InferenceRequest {
    InferenceRequest::new(
        "llm-prod",
        vec![ChatMessage::system("Be brief."), ChatMessage::user("What is 6 x 7?")],
        0.2,
        180,
    )
}

async fn ok_handler(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    backend.attempts.fetch_add(1, Ordering::SeqCst);
    *backend.last_auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *backend.last_body.lock().unwrap() = Some(body);
    Json(json!({
        "model": "llm-prod",
        "choices": [{"message": {"role": "assistant", "content": "The answer is 42."}}],
        "usage": {"prompt_tokens": 20, "completion_tokens": 6}
    }))
}

#[tokio::test]
async fn test_success_extracts_content_and_usage() {
    let backend = Backend::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(ok_handler))
        .with_state(backend.clone());
    let addr = spawn_server(app).await;

    let client = client_for(addr, Some("secret"), 2000, 1);
    let response = client.chat(request()).await.unwrap();

    assert_eq!(response.text, "The answer is 42.");
    assert_eq!(response.completion_tokens, Some(6));
    assert_eq!(response.prompt_tokens, Some(20));
    assert_eq!(response.attempts, 1);
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(backend.last_auth.lock().unwrap().as_deref(), Some("Bearer secret"));

    let body = backend.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["model"], "llm-prod");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["stream"], false);
}

#[tokio::test]
async fn test_no_auth_header_without_key() {
    let backend = Backend::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(ok_handler))
        .with_state(backend.clone());
    let addr = spawn_server(app).await;

    client_for(addr, None, 2000, 0).chat(request()).await.unwrap();
    assert_eq!(*backend.last_auth.lock().unwrap(), None);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/v1/chat/completions",
            post(|State(attempts): State<Arc<AtomicUsize>>| async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                (StatusCode::NOT_FOUND, "no such route")
            }),
        )
        .with_state(attempts.clone());
    let addr = spawn_server(app).await;

    let err = client_for(addr, None, 2000, 3).chat(request()).await.unwrap_err();

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    match err {
        InferenceError::Http { status_code, body } => {
            assert_eq!(status_code, 404);
            assert_eq!(body, "no such route");
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_retried_up_to_limit() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/v1/chat/completions",
            post(|State(attempts): State<Arc<AtomicUsize>>| async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                (StatusCode::SERVICE_UNAVAILABLE, "overloaded")
            }),
        )
        .with_state(attempts.clone());
    let addr = spawn_server(app).await;

    let err = client_for(addr, None, 2000, 1).chat(request()).await.unwrap_err();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(err.status_code(), Some(503));
}

#[tokio::test]
async fn test_server_error_then_success() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/v1/chat/completions",
            post(|State(attempts): State<Arc<AtomicUsize>>| async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    (StatusCode::BAD_GATEWAY, Json(json!({"error": "upstream"})))
                } else {
                    (
                        StatusCode::OK,
                        Json(json!({"choices": [{"message": {"content": "Recovered."}}]})),
                    )
                }
            }),
        )
        .with_state(attempts.clone());
    let addr = spawn_server(app).await;

    let response = client_for(addr, None, 2000, 1).chat(request()).await.unwrap();

    assert_eq!(response.text, "Recovered.");
    assert_eq!(response.attempts, 2);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_timeout_on_every_attempt() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/v1/chat/completions",
            post(|State(attempts): State<Arc<AtomicUsize>>| async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1500)).await;
                "too late"
            }),
        )
        .with_state(attempts.clone());
    let addr = spawn_server(app).await;

    let err = client_for(addr, None, 200, 1).chat(request()).await.unwrap_err();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    match err {
        InferenceError::Timeout { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_success_degrades_to_text() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { Json(json!({"result": "unexpected shape"})) }),
    );
    let addr = spawn_server(app).await;

    let response = client_for(addr, None, 2000, 0).chat(request()).await.unwrap();

    assert!(response.text.contains("unexpected shape"));
    assert_eq!(response.completion_tokens, None);
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client_for(addr, None, 500, 1).chat(request()).await.unwrap_err();
    assert!(matches!(err, InferenceError::Transport(_)));
}
