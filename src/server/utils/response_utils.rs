use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::server::services::fetch_services::FetchResult;

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const DEFAULT_MEDIA_CONTENT_TYPE: &str = "application/octet-stream";

const CORS_HEADERS: &[(HeaderName, &str)] = &[
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "*"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
    (header::ACCESS_CONTROL_EXPOSE_HEADERS, "*"),
    (header::ACCESS_CONTROL_MAX_AGE, "86400"),
];

/// upstream headers that keep seeking working in players
const FORWARDED_MEDIA_HEADERS: &[HeaderName] = &[
    header::CONTENT_LENGTH,
    header::ACCEPT_RANGES,
    header::CONTENT_RANGE,
    header::CONTENT_ENCODING,
];

/// turns relay results into responses, every response leaving the relay goes through here
pub struct ResponseEmitter;

impl ResponseEmitter {
    pub fn apply_cors(headers: &mut HeaderMap) {
        for (name, value) in CORS_HEADERS {
            headers.insert(name.clone(), HeaderValue::from_static(value));
        }
    }

    pub fn preflight() -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        Self::apply_cors(response.headers_mut());
        response
    }

    /// the content type is always the hls one, whatever upstream claimed
    pub fn playlist(body: String) -> Response {
        let mut response = (StatusCode::OK, body).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PLAYLIST_CONTENT_TYPE),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        Self::apply_cors(headers);
        response
    }

    /// bytes go out exactly as fetched, together with the upstream 2xx status
    pub fn media(result: FetchResult) -> Response {
        let status = if result.status.is_success() {
            result.status
        } else {
            StatusCode::OK
        };

        let mut headers = HeaderMap::new();
        let content_type = result
            .headers
            .get(header::CONTENT_TYPE)
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_MEDIA_CONTENT_TYPE));
        headers.insert(header::CONTENT_TYPE, content_type);

        for name in FORWARDED_MEDIA_HEADERS {
            if let Some(value) = result.headers.get(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        Self::apply_cors(&mut headers);

        let mut response = Response::new(Body::from(result.body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}
