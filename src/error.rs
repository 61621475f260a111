//! C11: error surface.
//!
//! One typed error enum covering every way a request through this proxy can fail.
//! `UpstreamError` is the odd one out: it mirrors the upstream's own status and body
//! verbatim rather than wrapping them, since a client that already knows how to parse
//! that upstream's error shape shouldn't have to learn a second one for this proxy.

use axum::{
    Json,
    body::Bytes,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// §6 upstream validation failed: unparseable URL, disallowed scheme, or a
    /// loopback/private/link-local target rejected by the SSRF guard.
    #[error("Access denied: {0}")]
    Security(String),

    /// The upstream connection failed outright (DNS, TCP, TLS, socket reset).
    #[error("{0}")]
    Proxy(String),

    /// The upstream responded with a non-2xx status. Its status and body are
    /// forwarded to the client unchanged.
    #[error("upstream returned {status}")]
    Upstream { status: StatusCode, content_type: Option<String>, body: Bytes },

    /// Any other unexpected internal failure. Never shown to the client verbatim.
    #[error("internal proxy error")]
    Server(#[source] anyhow::Error),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Security(_) => StatusCode::FORBIDDEN,
            Self::Proxy(_) => StatusCode::BAD_GATEWAY,
            Self::Upstream { status, .. } => *status,
            Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Security(_) => "security_error",
            Self::Proxy(_) => "proxy_error",
            Self::Upstream { .. } => "upstream_error",
            Self::Server(_) => "server_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    r#type: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            Self::Upstream { status, content_type, body } => {
                let mut response = (status, body).into_response();
                if let Some(content_type) = content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
                    response.headers_mut().insert(header::CONTENT_TYPE, content_type);
                }
                response
            }
            other => {
                if matches!(other, Self::Server(_)) {
                    log::error!("internal proxy error: {other:#}");
                }

                let message = match &other {
                    Self::Server(_) => "internal server error".to_string(),
                    _ => other.to_string(),
                };

                let body = ErrorResponse {
                    error: ErrorDetails {
                        message,
                        r#type: other.error_type().to_string(),
                    },
                };

                (status, Json(body)).into_response()
            }
        }
    }
}

impl From<anyhow::Error> for ProxyError {
    fn from(err: anyhow::Error) -> Self {
        Self::Server(err)
    }
}
