//! ProxyClient error mapping against a scripted proxy stub.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use secrecy::SecretString;
use serde_json::json;

use floodgate_client::ProxyClient;
use floodgate_core::step::JobSubmitter;
use floodgate_types::config::ClientConfig;
use floodgate_types::error::FloodgateError;
use floodgate_types::job::JobSpec;

#[derive(Clone, Copy)]
enum Mode {
    Allowed,
    Denied,
    RateLimited,
    Unauthorized,
    RemoteFailure,
}

struct Stub {
    mode: Mode,
    envelopes: Mutex<Vec<serde_json::Value>>,
    auth_headers: Mutex<Vec<String>>,
}

async fn proxy_handler(
    State(stub): State<Arc<Stub>>,
    headers: HeaderMap,
    Json(envelope): Json<serde_json::Value>,
) -> Response {
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        stub.auth_headers.lock().unwrap().push(auth.to_string());
    }
    stub.envelopes.lock().unwrap().push(envelope);

    match stub.mode {
        Mode::Allowed => Json(json!({
            "status": "allowed",
            "forwarded_response": {
                "status_code": 201,
                "body": r#"{"job_id":"job_abc","status":"queued"}"#,
            }
        }))
        .into_response(),
        Mode::Denied => Json(json!({
            "status": "denied",
            "error": "plan limit exceeded",
        }))
        .into_response(),
        Mode::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "30")],
            Json(json!({"error": "rate limited"})),
        )
            .into_response(),
        Mode::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid api key").into_response(),
        Mode::RemoteFailure => Json(json!({
            "status": "allowed",
            "forwarded_response": {
                "status_code": 500,
                "body": "remote exploded",
            }
        }))
        .into_response(),
    }
}

async fn spawn_stub(mode: Mode) -> (SocketAddr, Arc<Stub>) {
    let stub = Arc::new(Stub {
        mode,
        envelopes: Mutex::new(Vec::new()),
        auth_headers: Mutex::new(Vec::new()),
    });
    let router = Router::new()
        .route("/api/v1/proxy", post(proxy_handler))
        .with_state(Arc::clone(&stub));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, stub)
}

fn client_for(addr: SocketAddr) -> ProxyClient {
    let config = ClientConfig {
        api_key: SecretString::from("ck_test_1"),
        proxy_url: format!("http://{addr}"),
        remote_url: "https://jobs.floodgate.dev".to_string(),
        submit_timeout_secs: 5,
    };
    ProxyClient::new(&config).unwrap()
}

#[tokio::test]
async fn allowed_reply_yields_the_submission() {
    let (addr, stub) = spawn_stub(Mode::Allowed).await;
    let client = client_for(addr);

    let submission = client
        .submit(JobSpec::new("https://api.example.com/work", "POST"))
        .await
        .unwrap();
    assert_eq!(submission.job_id, "job_abc");
    assert_eq!(
        submission.extra.get("status").and_then(|v| v.as_str()),
        Some("queued")
    );

    // The envelope carries the serialized job to the remote jobs endpoint.
    let envelopes = stub.envelopes.lock().unwrap();
    let envelope = &envelopes[0];
    assert_eq!(envelope["scope"], "customer");
    assert_eq!(envelope["method"], "POST");
    assert_eq!(
        envelope["target_url"],
        "https://jobs.floodgate.dev/api/v1/jobs"
    );
    let inner: serde_json::Value =
        serde_json::from_str(envelope["body"].as_str().unwrap()).unwrap();
    assert_eq!(inner["url"], "https://api.example.com/work");

    let auth = stub.auth_headers.lock().unwrap();
    assert_eq!(auth[0], "Bearer ck_test_1");
}

#[tokio::test]
async fn denied_reply_maps_to_request_denied() {
    let (addr, _stub) = spawn_stub(Mode::Denied).await;
    let client = client_for(addr);

    let err = client
        .submit(JobSpec::new("https://api.example.com", "GET"))
        .await
        .unwrap_err();
    match err {
        FloodgateError::RequestDenied(reason) => assert_eq!(reason, "plan limit exceeded"),
        other => panic!("expected RequestDenied, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_carries_a_retry_instant() {
    let (addr, _stub) = spawn_stub(Mode::RateLimited).await;
    let client = client_for(addr);

    let before_ms = chrono::Utc::now().timestamp_millis();
    let err = client
        .submit(JobSpec::new("https://api.example.com", "GET"))
        .await
        .unwrap_err();

    match err {
        FloodgateError::RateLimited { retry_at_ms } => {
            // Retry-After: 30 seconds from roughly now.
            let retry_at_ms = retry_at_ms.unwrap();
            assert!(retry_at_ms >= before_ms + 29_000);
            assert!(retry_at_ms <= before_ms + 31_000);
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_maps_to_authentication() {
    let (addr, _stub) = spawn_stub(Mode::Unauthorized).await;
    let client = client_for(addr);

    let err = client
        .submit(JobSpec::new("https://api.example.com", "GET"))
        .await
        .unwrap_err();
    assert!(matches!(err, FloodgateError::Authentication(_)));
}

#[tokio::test]
async fn forwarded_failure_maps_to_remote_execution() {
    let (addr, _stub) = spawn_stub(Mode::RemoteFailure).await;
    let client = client_for(addr);

    let err = client
        .submit(JobSpec::new("https://api.example.com", "GET"))
        .await
        .unwrap_err();
    match err {
        FloodgateError::RemoteExecution(detail) => {
            assert!(detail.contains("500"));
            assert!(detail.contains("remote exploded"));
        }
        other => panic!("expected RemoteExecution, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_proxy_maps_to_remote_execution() {
    // Nothing listens here.
    let config = ClientConfig {
        api_key: SecretString::from("ck_test_1"),
        proxy_url: "http://127.0.0.1:1".to_string(),
        remote_url: "https://jobs.floodgate.dev".to_string(),
        submit_timeout_secs: 2,
    };
    let client = ProxyClient::new(&config).unwrap();

    let err = client
        .submit(JobSpec::new("https://api.example.com", "GET"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FloodgateError::RemoteExecution(_) | FloodgateError::Timeout
    ));
}
