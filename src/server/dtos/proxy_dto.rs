use serde::Deserialize;
use validator::Validate;

/// query string shared by every relay endpoint
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProxyQuery {
    #[validate(required(message = "URL parameter is required"))]
    pub url: Option<String>,
    /// json object of headers to send upstream, carried along in every rewritten url
    pub headers: Option<String>,
}

impl ProxyQuery {
    pub fn target(&self) -> &str {
        self.url.as_deref().unwrap_or_default()
    }
}
