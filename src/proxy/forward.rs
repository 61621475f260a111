//! Request dispatch: builds the outbound call from an already-validated upstream
//! URL, sends it, and routes the response through the transcoders when the upstream
//! looks like a chat-completions endpoint.

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use url::Url;

use crate::error::ProxyError;
use crate::protocol::{ChatRequest, ChatResponse};
use crate::proxy::{ProxyState, headers, is_chat_completions};
use crate::request_log::RequestAuditRecord;
use crate::transcode;
use crate::transcode::StreamTranscoder;

pub async fn dispatch(
    state: &ProxyState,
    method: Method,
    url: Url,
    inbound_headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let chat_completions = is_chat_completions(&url);
    let now_ms = state.clock.now_ms();

    let mut audit = state
        .config
        .log_enabled
        .then(|| RequestAuditRecord::new(format!("req_{now_ms}"), now_ms));

    if let Some(audit) = &mut audit {
        audit.record("inbound_received", now_ms, Some(url.to_string()));
    }

    let rewrite = if chat_completions {
        rewrite_request_body(&body, state)
    } else {
        RewriteOutcome { body, stream: false, has_tools: false }
    };

    if let Some(audit) = &mut audit {
        audit.record("rewrite_complete", state.clock.now_ms(), None);
    }

    let mut request_builder = state.client.request(method.clone(), url.clone());
    request_builder = headers::insert_forwarded_headers(request_builder, &inbound_headers);

    if !matches!(method, Method::GET | Method::HEAD) {
        request_builder = request_builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(rewrite.body);
    }

    let response = request_builder
        .send()
        .await
        .map_err(|err| ProxyError::Proxy(format!("failed to reach upstream: {err}")))?;

    let status = response.status();

    if let Some(audit) = &mut audit {
        audit.record("upstream_dispatch_complete", state.clock.now_ms(), Some(status.to_string()));
    }

    if !status.is_success() {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|err| ProxyError::Proxy(format!("failed reading upstream error body: {err}")))?;

        flush_audit(state, audit, "upstream_error");
        return Err(ProxyError::Upstream { status, content_type, body });
    }

    // §4.7/§6: C5 only engages for a streaming request that also declared tools —
    // a streaming request with no tools never had markers woven into its prompt, so
    // there is nothing for the transcoder to look for and it must pass through raw.
    if chat_completions && rewrite.stream && rewrite.has_tools {
        // The streaming body outlives this function, so the audit record is flushed
        // up through dispatch completion rather than final byte delivery.
        flush_audit(state, audit, "outbound_response_streaming");
        return Ok(stream_response(state, response));
    }

    let result = if chat_completions && !rewrite.stream {
        buffered_chat_response(state, response).await
    } else {
        passthrough_response(response)
    };

    flush_audit(state, audit, "outbound_response_sent");
    result
}

fn flush_audit(state: &ProxyState, audit: Option<RequestAuditRecord>, final_phase: &'static str) {
    let Some(mut audit) = audit else { return };
    let now_ms = state.clock.now_ms();
    audit.record(final_phase, now_ms, None);

    let log_dir = state.config.log_dir.clone();
    tokio::spawn(async move {
        if let Err(err) = audit.flush(&log_dir).await {
            log::warn!("failed to write request audit log: {err}");
        }
    });
}

/// Outcome of rewriting an inbound chat-completions request body: the bytes to send
/// upstream, whether the client asked for a streaming response, and whether it
/// declared any tools — the latter two together decide whether C5 engages on the way
/// back (see [`dispatch`]).
struct RewriteOutcome {
    body: Bytes,
    stream: bool,
    has_tools: bool,
}

/// Parse the inbound body as a [`ChatRequest`], rewrite it for the delimited-text
/// protocol, and re-serialize. Falls back to forwarding the original bytes unchanged
/// if the body isn't a well-formed chat-completions request — transcoding is a
/// best-effort enhancement, not a body-shape requirement for an otherwise-valid proxy.
fn rewrite_request_body(body: &Bytes, state: &ProxyState) -> RewriteOutcome {
    let Ok(request) = serde_json::from_slice::<ChatRequest>(body) else {
        log::warn!("chat-completions request body did not parse, forwarding unchanged");
        return RewriteOutcome { body: body.clone(), stream: false, has_tools: false };
    };

    let stream = request.stream;
    let has_tools = request.has_tools();
    let rewritten = transcode::request::rewrite(request, &state.markers);

    let bytes = match serde_json::to_vec(&rewritten) {
        Ok(bytes) => Bytes::from(bytes),
        Err(err) => {
            log::warn!("failed to re-serialize rewritten chat-completions request: {err}");
            body.clone()
        }
    };

    RewriteOutcome { body: bytes, stream, has_tools }
}

async fn buffered_chat_response(state: &ProxyState, response: reqwest::Response) -> Result<Response, ProxyError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|err| ProxyError::Proxy(format!("failed reading upstream response: {err}")))?;

    let Ok(parsed) = serde_json::from_slice::<ChatResponse>(&bytes) else {
        log::warn!("chat-completions response body did not parse, forwarding unchanged");
        return Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response());
    };

    let transcoded = transcode::response::transcode(parsed, &state.markers, state.clock.now_ms());

    let body = serde_json::to_vec(&transcoded)
        .map_err(|err| ProxyError::Server(anyhow::anyhow!("failed to serialize transcoded response: {err}")))?;

    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Drive a [`StreamTranscoder`] over the upstream's byte stream. One async task per
/// request: no extra threads, ordering matches upstream arrival order by construction
/// since the transcoder only ever emits what it has already received.
fn stream_response(state: &ProxyState, response: reqwest::Response) -> Response {
    let mut transcoder = StreamTranscoder::with_clock(state.markers.clone(), state.clock.clone());
    let mut upstream = response.bytes_stream();

    let body_stream = async_stream::stream! {
        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    let out = transcoder.feed(&chunk);
                    if !out.is_empty() {
                        yield Ok::<_, std::io::Error>(Bytes::from(out));
                    }
                }
                Some(Err(err)) => {
                    log::warn!("upstream stream read failed mid-response: {err}");
                    break;
                }
                None => {
                    let out = transcoder.finish();
                    if !out.is_empty() {
                        yield Ok(Bytes::from(out));
                    }
                    break;
                }
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .expect("static headers and a body stream always build a valid response")
}

fn passthrough_response(response: reqwest::Response) -> Result<Response, ProxyError> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| header::HeaderValue::from_static("application/octet-stream"));

    let stream = response.bytes_stream();

    let body = Body::from_stream(stream.map(|chunk| chunk.map_err(std::io::Error::other)));

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(body)
        .map_err(|err| ProxyError::Server(anyhow::anyhow!("failed to build passthrough response: {err}")))
}
