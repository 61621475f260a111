//! C7: the HTTP edge. A single wildcard route that extracts an absolute upstream
//! URL from the request path, validates it, forwards the request, and engages the
//! transcoders when the upstream looks like a chat-completions endpoint.

pub mod forward;
pub mod headers;
pub mod security;

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, OriginalUri, State},
    http::{HeaderMap, Method, Uri},
    response::Response,
    routing::any,
};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::ProxyError;
use crate::markers::MarkerSet;

/// Process-lifetime state shared across every request: the connection-pooled HTTP
/// client, the immutable marker set, resolved configuration, and the injectable
/// clock used for chunk ids and audit-log timestamps.
pub struct ProxyState {
    pub client: reqwest::Client,
    pub markers: MarkerSet,
    pub config: AppConfig,
    pub clock: Arc<dyn Clock>,
}

/// Ingress is fully buffered before rewrite, bounded per §5's ~50 MiB ingress cap.
const BODY_LIMIT_BYTES: usize = 50 << 20;

pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/{*upstream}", any(handle))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state)
}

async fn handle(
    State(state): State<Arc<ProxyState>>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let upstream_url = extract_upstream_url(&uri)?;

    security::validate_upstream(&upstream_url, state.config.allow_local_net)
        .await
        .map_err(ProxyError::Security)?;

    forward::dispatch(&state, method, upstream_url, headers, body).await
}

/// §6: the request URI is `/<upstream-absolute-url>`; the first character after the
/// leading `/` must begin `http://` or `https://`, and the remainder is the URL.
fn extract_upstream_url(uri: &Uri) -> Result<url::Url, ProxyError> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or_else(|| uri.path());
    let candidate = path_and_query.strip_prefix('/').unwrap_or(path_and_query);

    if !(candidate.starts_with("http://") || candidate.starts_with("https://")) {
        return Err(ProxyError::Security(
            "request path must begin with an absolute http:// or https:// upstream URL".to_string(),
        ));
    }

    url::Url::parse(candidate).map_err(|err| ProxyError::Security(format!("unparseable upstream URL: {err}")))
}

/// §6: chat-completions transcoding only engages for upstream URLs that look like
/// a chat-completions endpoint; everything else is a transparent byte-for-byte proxy.
pub(crate) fn is_chat_completions(url: &url::Url) -> bool {
    url.path().contains("/chat/completions")
}
