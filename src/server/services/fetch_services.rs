use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode, header};
use mockall::automock;
use tracing::{debug, error};
use url::Url;

use crate::server::{
    error::{AppResult, Error},
    utils::{content_utils::decode_body, header_utils::HeaderSet},
};

/// what both fetch backends hand back, the rest of the pipeline can't tell them apart
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResult {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// utf-8 with replacement characters and without a leading byte order mark, playlists are
    /// never rejected for bad bytes
    pub fn text(&self) -> String {
        let body = self.body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&self.body[..]);
        String::from_utf8_lossy(body).into_owned()
    }

    /// origin statuses >= 400 are failures for the relay even though the fetch itself worked
    pub fn error_for_status(self) -> AppResult<Self> {
        if self.status.is_client_error() || self.status.is_server_error() {
            return Err(Error::Upstream {
                status: self.status,
            });
        }
        Ok(self)
    }
}

pub type DynFetchService = Arc<dyn FetchServiceTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait FetchServiceTrait {
    /// GET `target`, a status >= 400 is still an `Ok` here
    async fn fetch(
        &self,
        target: &Url,
        headers: &HeaderSet,
        timeout: Duration,
    ) -> AppResult<FetchResult>;

    /// backend label for logs and health
    fn name(&self) -> &'static str;

    /// release long lived resources, called once on shutdown
    async fn shutdown(&self);
}

/// plain reqwest backend
pub struct DirectFetchService {
    http: reqwest::Client,
}

impl DirectFetchService {
    pub fn new(max_redirects: usize) -> AppResult<Self> {
        // no automatic decompression here, the Accept-Encoding we send is ours and so is the
        // decoding, see content_utils::decode_body
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .build()
            .map_err(|e| {
                error!("Failed to build http client: {}", e);
                Error::InternalServerErrorWithContext("Failed to build http client".to_string())
            })?;

        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn map_error(e: reqwest::Error, timeout: Duration) -> Error {
        if e.is_timeout() {
            Error::Timeout(timeout.as_secs())
        } else {
            Error::Network(e.to_string())
        }
    }
}

#[async_trait]
impl FetchServiceTrait for DirectFetchService {
    async fn fetch(
        &self,
        target: &Url,
        headers: &HeaderSet,
        timeout: Duration,
    ) -> AppResult<FetchResult> {
        debug!("Direct fetch: {}", target);

        // the timeout covers the whole exchange, body included
        let response = self
            .http
            .get(target.clone())
            .headers(headers.to_header_map()?)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                error!("Request to {} failed: {}", target, e);
                Self::map_error(e, timeout)
            })?;

        let status = response.status();
        let mut response_headers = response.headers().clone();
        debug!("Received {} from {}", status, response.url());

        let bytes = response.bytes().await.map_err(|e| {
            error!("Failed to read response from {}: {}", target, e);
            Self::map_error(e, timeout)
        })?;

        let content_encoding = response_headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = match decode_body(content_encoding.as_deref(), &bytes) {
            Some(decoded) => {
                // both describe the encoded body we just threw away
                response_headers.remove(header::CONTENT_ENCODING);
                response_headers.remove(header::CONTENT_LENGTH);
                Bytes::from(decoded)
            }
            None => bytes,
        };

        Ok(FetchResult {
            status,
            headers: response_headers,
            body,
        })
    }

    fn name(&self) -> &'static str {
        "direct"
    }

    async fn shutdown(&self) {}
}
