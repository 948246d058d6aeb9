use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

use crate::server::utils::response_utils::ResponseEmitter;

pub type AppResult<T> = Result<T, Error>;

/// every failure a relay request can end in, each one maps onto exactly one http status
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// bad scheme, blocked host, missing parameter
    #[error("{0}")]
    Validation(String),

    /// origin not on the allowlist
    #[error("{0}")]
    Forbidden(String),

    #[error("Rate limit exceeded, retry in {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// malformed `headers` json
    #[error("{0}")]
    Parse(String),

    /// dns, connect, tls or body read failures talking to the origin
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout - upstream took longer than {0} seconds")]
    Timeout(u64),

    #[error("HTTP {} error - Failed to load stream", status.as_u16())]
    Upstream { status: StatusCode },

    /// launch or navigation failure in the rendered backend
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Internal server error")]
    InternalServerError,

    #[error("{0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Parse(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Network(_) | Self::Browser(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            // only statuses >= 400 end up in here, anything else is a bug upstream of us
            Self::Upstream { status } if status.is_client_error() || status.is_server_error() => {
                *status
            }
            Self::Upstream { .. } | Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InternalServerErrorWithContext(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Forbidden(_) => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::Parse(_) => "parse",
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::Upstream { .. } => "upstream",
            Self::Browser(_) => "browser",
            Self::InternalServerError | Self::InternalServerErrorWithContext(_) => "internal",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        debug!("Responding with {} ({}): {}", status, self.kind(), self);

        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();
        ResponseEmitter::apply_cors(response.headers_mut());

        if let Self::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }

        response
    }
}
