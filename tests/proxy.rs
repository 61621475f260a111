//! End-to-end tests driving the real [`axum::Router`] built by [`toolcall_proxy::proxy::router`]
//! against a fake upstream bound to a loopback TCP socket.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::BodyExt as _;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use toolcall_proxy::clock::{Clock, FixedClock};
use toolcall_proxy::config::AppConfig;
use toolcall_proxy::markers::MarkerSet;
use toolcall_proxy::proxy::{self, ProxyState};

fn markers() -> MarkerSet {
    MarkerSet::from_parts('༒', '༒', '࿇', '龘', '靐')
}

fn test_config(allow_local_net: bool) -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_enabled: false,
        log_dir: std::env::temp_dir(),
        allow_local_net,
        log_filter: "info".to_string(),
    }
}

fn test_state(allow_local_net: bool) -> Arc<ProxyState> {
    Arc::new(ProxyState {
        client: reqwest::Client::new(),
        markers: markers(),
        config: test_config(allow_local_net),
        clock: Arc::new(FixedClock(1_700_000_000_000)) as Arc<dyn Clock>,
    })
}

async fn spawn_fake_upstream(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn send(proxy: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = proxy.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn send_raw(proxy: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = proxy.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

/// Scenario 2: a non-streaming response containing a tool-call envelope is rewritten
/// into OpenAI-shaped `tool_calls` on the way back to the client.
#[tokio::test]
async fn non_streaming_tool_call_round_trip() {
    let m = markers();
    let envelope = m.encode_tool_call("get_weather", r#"{"city":"Paris"}"#);
    let upstream_content = format!("Let me check.{envelope}");

    let fake = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let content = upstream_content.clone();
            async move {
                Json(json!({
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": content},
                        "finish_reason": "stop",
                    }]
                }))
            }
        }),
    );
    let upstream_addr = spawn_fake_upstream(fake).await;

    let state = test_state(false);
    let router = proxy::router(state);

    let uri = format!("/http://{upstream_addr}/v1/chat/completions");
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"messages": [{"role": "user", "content": "weather?"}]}).to_string(),
        ))
        .unwrap();

    let (status, body) = send(router, request).await;

    assert_eq!(status, StatusCode::OK);
    let message = &body["choices"][0]["message"];
    assert_eq!(message["content"], "Let me check.");
    assert_eq!(message["tool_calls"][0]["function"]["name"], "get_weather");
    assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");
}

/// Scenario 1: plain text with no envelope passes through untouched.
#[tokio::test]
async fn non_streaming_plain_text_passthrough() {
    let fake = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            Json(json!({
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "just a normal answer"},
                    "finish_reason": "stop",
                }]
            }))
        }),
    );
    let upstream_addr = spawn_fake_upstream(fake).await;

    let state = test_state(false);
    let router = proxy::router(state);

    let uri = format!("/http://{upstream_addr}/v1/chat/completions");
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json!({"messages": []}).to_string()))
        .unwrap();

    let (status, body) = send(router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["choices"][0]["message"]["content"], "just a normal answer");
    assert!(body["choices"][0]["message"]["tool_calls"].is_null());
}

/// Scenario 6: a loopback upstream is rejected with a `security_error` before any
/// outbound connection is attempted.
#[tokio::test]
async fn ssrf_guard_rejects_loopback_target() {
    let state = test_state(false);
    let router = proxy::router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/http://127.0.0.1:1/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(json!({"messages": []}).to_string()))
        .unwrap();

    let (status, body) = send(router, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["type"], "security_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("Localhost access denied"));
}

/// §6: a request path that isn't an absolute http(s) URL is rejected the same way.
#[tokio::test]
async fn rejects_request_missing_absolute_upstream_url() {
    let state = test_state(false);
    let router = proxy::router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(router, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["type"], "security_error");
}

/// `allow_local_net` disables the guard so a loopback fake upstream is reachable —
/// this is how every other test in this file talks to its fake upstream.
#[tokio::test]
async fn allow_local_net_permits_loopback_targets() {
    let fake = Router::new().route("/v1/models", get(|| async { Json(json!({"data": []})) }));
    let upstream_addr = spawn_fake_upstream(fake).await;

    let state = test_state(true);
    let router = proxy::router(state);

    let uri = format!("/http://{upstream_addr}/v1/models");
    let request = Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap();

    let (status, _) = send(router, request).await;
    assert_eq!(status, StatusCode::OK);
}

/// Non-chat-completions routes are forwarded byte-for-byte with no transcoding.
#[tokio::test]
async fn non_chat_completions_route_is_a_transparent_proxy() {
    let fake = Router::new().route("/v1/models", get(|| async { Json(json!({"data": ["model-a"]})) }));
    let upstream_addr = spawn_fake_upstream(fake).await;

    let state = test_state(false);
    let router = proxy::router(state);

    let uri = format!("/http://{upstream_addr}/v1/models");
    let request = Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap();

    let (status, body) = send(router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0], "model-a");
}

/// Scenario 3 / P5: a streaming upstream response carrying a tool-call envelope
/// split across SSE frames is transcoded into OpenAI-shaped `tool_calls` deltas.
#[tokio::test]
async fn streaming_tool_call_round_trip() {
    let m = markers();
    let first = format!("data: {}\n\n", json!({"choices": [{"delta": {"content": "Sure, "}}]}));
    let second = format!(
        "data: {}\n\n",
        json!({"choices": [{"delta": {"content": m.encode_tool_call("add", r#"{"a":1,"b":2}"#)}}]})
    );
    let done = "data: [DONE]\n\n".to_string();
    let sse_body = format!("{first}{second}{done}");

    let fake = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let body = sse_body.clone();
            async move {
                (
                    [("content-type", "text/event-stream")],
                    body,
                )
            }
        }),
    );
    let upstream_addr = spawn_fake_upstream(fake).await;

    let state = test_state(false);
    let router = proxy::router(state);

    let uri = format!("/http://{upstream_addr}/v1/chat/completions");
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "messages": [{"role": "user", "content": "add"}],
                "stream": true,
                "tools": [{"type": "function", "function": {"name": "add"}}],
            })
            .to_string(),
        ))
        .unwrap();

    let (status, raw) = send_raw(router, request).await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(raw).unwrap();
    assert!(text.contains("\"content\":\"Sure, \""));
    assert!(text.contains("\"name\":\"add\""));
    assert!(text.contains(r#""arguments":"{\"a\":1,\"b\":2}""#));
    assert!(text.ends_with("data: [DONE]\n\n"));
    assert!(!text.contains(&m.tc_start), "raw markers must never reach the client");
}

/// §4.7/§6: a streaming request that declares no tools never had markers woven into
/// its prompt, so C5 must not engage — the upstream SSE bytes are forwarded raw.
#[tokio::test]
async fn streaming_without_tools_is_a_raw_passthrough() {
    let sse_body = format!(
        "data: {}\n\ndata: [DONE]\n\n",
        json!({"id": "upstream-id", "choices": [{"delta": {"role": "assistant", "content": "hi there"}}]})
    );

    let fake = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let body = sse_body.clone();
            async move { ([("content-type", "text/event-stream")], body) }
        }),
    );
    let upstream_addr = spawn_fake_upstream(fake).await;

    let state = test_state(false);
    let router = proxy::router(state);

    let uri = format!("/http://{upstream_addr}/v1/chat/completions");
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"messages": [{"role": "user", "content": "hi"}], "stream": true}).to_string(),
        ))
        .unwrap();

    let (status, raw) = send_raw(router, request).await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(raw).unwrap();
    assert!(text.contains("\"id\":\"upstream-id\""), "upstream SSE bytes must pass through untouched");
    assert!(text.contains("\"role\":\"assistant\""), "delta.role must survive raw passthrough");
    assert!(!text.contains("chatcmpl-"), "a synthesized chunk id means C5 wrongly engaged");
}
