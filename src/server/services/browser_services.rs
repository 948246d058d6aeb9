// rendered backend, only for origins that answer plain clients with a javascript challenge
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, GetResponseBodyParams, Headers, ResourceType,
    SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::{Stream, StreamExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::server::{
    error::{AppResult, Error},
    services::fetch_services::{FetchResult, FetchServiceTrait},
    utils::header_utils::HeaderSet,
};

const LAUNCH_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-setuid-sandbox",
    "--no-zygote",
    "--disable-extensions",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
];

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub executable: Option<String>,
    pub headless: bool,
    pub request_timeout: Duration,
}

impl From<&AppConfig> for BrowserOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            executable: config
                .browser_path
                .clone()
                .filter(|path| !path.trim().is_empty()),
            headless: config.headless,
            request_timeout: config.fetch_timeout(),
        }
    }
}

/// one chromium process and the single browsing context all pages are opened in
struct BrowserSession {
    browser: Browser,
    context: BrowserContextId,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(options: &BrowserOptions) -> AppResult<Self> {
        info!("Launching browser...");

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .request_timeout(options.request_timeout)
            .args(LAUNCH_ARGS.iter().copied());
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(|e| {
            error!("Invalid browser configuration: {}", e);
            Error::Browser(e)
        })?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            error!("Failed to launch browser: {}", e);
            Error::Browser(e.to_string())
        })?;

        // the handler drives the devtools connection, when it ends the browser is gone
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser connection closed: {}", e);
                    break;
                }
            }
        });

        let context = match browser.execute(CreateBrowserContextParams::default()).await {
            Ok(created) => created.result.browser_context_id.clone(),
            Err(e) => {
                handler.abort();
                error!("Failed to create browser context: {}", e);
                return Err(Error::Browser(e.to_string()));
            }
        };

        info!("Browser launched successfully");
        Ok(Self {
            browser,
            context,
            handler,
        })
    }

    fn is_connected(&self) -> bool {
        !self.handler.is_finished()
    }

    async fn open_page(&self) -> AppResult<Page> {
        let mut params = CreateTargetParams::new("about:blank");
        params.browser_context_id = Some(self.context.clone());

        self.browser
            .new_page(params)
            .await
            .map_err(|e| Error::Browser(format!("Failed to open page: {}", e)))
    }

    async fn close(&self) {
        if let Err(e) = self.browser.execute(CloseParams::default()).await {
            warn!("Error closing browser: {}", e);
        }
        self.handler.abort();
        info!("Browser closed");
    }
}

/// closes its page when dropped, so cancelled requests don't leave pages behind
struct PageGuard(Option<Page>);

impl PageGuard {
    async fn close(mut self) {
        if let Some(page) = self.0.take() {
            if let Err(e) = page.close().await {
                warn!("Failed to close page: {}", e);
            }
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        let Some(page) = self.0.take() else {
            return;
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    warn!("Failed to close abandoned page: {}", e);
                }
            });
        }
    }
}

/// fetches through a real chromium so javascript challenges get solved on the way
///
/// The browser is started on first use and started again if it's found disconnected. Every
/// fetch gets its own page, and that page is closed whatever happens to the request.
/// no network response for this long counts as settled
const NETWORK_QUIET: Duration = Duration::from_millis(500);
/// upper bound on waiting for the network to settle after the load event
const NETWORK_SETTLE_LIMIT: Duration = Duration::from_secs(5);

/// waits until `events` stays quiet for `quiet` or ends, gives up after `limit`.
/// returns whether the network settled in time
pub async fn wait_for_network_idle<S>(events: &mut S, quiet: Duration, limit: Duration) -> bool
where
    S: Stream + Unpin,
{
    let settle = async {
        while let Ok(Some(_)) = tokio::time::timeout(quiet, events.next()).await {}
    };
    tokio::time::timeout(limit, settle).await.is_ok()
}

pub struct BrowserFetchService {
    options: BrowserOptions,
    session: RwLock<Option<Arc<BrowserSession>>>,
}

impl BrowserFetchService {
    pub fn new(options: BrowserOptions) -> Self {
        Self {
            options,
            session: RwLock::new(None),
        }
    }

    async fn session(&self) -> AppResult<Arc<BrowserSession>> {
        {
            let current = self.session.read().await;
            if let Some(session) = current.as_ref().filter(|s| s.is_connected()) {
                return Ok(session.clone());
            }
        }

        let mut current = self.session.write().await;
        // someone else may have relaunched while we waited for the write lock
        if let Some(session) = current.as_ref() {
            if session.is_connected() {
                return Ok(session.clone());
            }
            warn!("Browser is not connected, relaunching...");
        }

        let session = Arc::new(BrowserSession::launch(&self.options).await?);
        *current = Some(session.clone());
        Ok(session)
    }

    fn map_cdp_error(e: CdpError, timeout: Duration) -> Error {
        match e {
            CdpError::Timeout => Error::Timeout(timeout.as_secs()),
            other => {
                let message = other.to_string();
                // chromium reports dns/connect failures as net::ERR_*
                if message.contains("net::") {
                    Error::Network(message)
                } else {
                    Error::Browser(message)
                }
            }
        }
    }

    fn extra_headers(headers: &HeaderSet) -> Headers {
        // chromium negotiates and decodes content encodings itself
        let object: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("accept-encoding"))
            .map(|(n, v)| (n.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        Headers::new(serde_json::Value::Object(object))
    }

    fn response_headers(headers: &Headers) -> HeaderMap {
        let mut map = HeaderMap::new();
        let Some(object) = headers.inner().as_object() else {
            return map;
        };

        for (name, value) in object {
            let (Ok(name), Some(value)) = (HeaderName::from_bytes(name.as_bytes()), value.as_str())
            else {
                continue;
            };
            // repeated headers arrive joined with newlines
            for part in value.split('\n') {
                if let Ok(value) = HeaderValue::from_str(part) {
                    map.append(name.clone(), value);
                }
            }
        }

        // the body we get back is already decoded
        map.remove(header::CONTENT_ENCODING);
        map.remove(header::CONTENT_LENGTH);
        map
    }

    async fn capture(
        page: &Page,
        target: &Url,
        headers: &HeaderSet,
        timeout: Duration,
    ) -> AppResult<FetchResult> {
        let cdp = |e: CdpError| Self::map_cdp_error(e, timeout);

        // subscribe before navigating so the document response can't slip past
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(cdp)?;

        page.execute(SetExtraHttpHeadersParams::new(Self::extra_headers(headers)))
            .await
            .map_err(cdp)?;

        debug!("Browser navigating to {}", target);
        // goto only waits for the load event
        page.goto(target.as_str()).await.map_err(cdp)?;

        let document = loop {
            match responses.next().await {
                Some(event) if matches!(event.r#type, ResourceType::Document) => break event,
                Some(_) => continue,
                None => {
                    return Err(Error::Browser(
                        "No response received from page".to_string(),
                    ));
                }
            }
        };

        let limit = NETWORK_SETTLE_LIMIT.min(timeout);
        if !wait_for_network_idle(&mut responses, NETWORK_QUIET, limit).await {
            debug!("Network still busy after {:?} on {}, reading body anyway", limit, target);
        }

        let status = u16::try_from(document.response.status)
            .ok()
            .and_then(|s| StatusCode::from_u16(s).ok())
            .ok_or_else(|| {
                Error::Browser(format!("Invalid status {}", document.response.status))
            })?;

        let body = page
            .execute(GetResponseBodyParams::new(document.request_id.clone()))
            .await
            .map_err(cdp)?;

        let bytes = if body.result.base64_encoded {
            STANDARD
                .decode(body.result.body.as_bytes())
                .map_err(|e| Error::Browser(format!("Invalid response body encoding: {}", e)))?
        } else {
            body.result.body.clone().into_bytes()
        };

        debug!("Browser captured {} ({} bytes) from {}", status, bytes.len(), target);

        Ok(FetchResult {
            status,
            headers: Self::response_headers(&document.response.headers),
            body: Bytes::from(bytes),
        })
    }
}

#[async_trait]
impl FetchServiceTrait for BrowserFetchService {
    async fn fetch(
        &self,
        target: &Url,
        headers: &HeaderSet,
        timeout: Duration,
    ) -> AppResult<FetchResult> {
        let session = self.session().await?;
        let page = session.open_page().await?;
        let guard = PageGuard(Some(page.clone()));

        let result =
            tokio::time::timeout(timeout, Self::capture(&page, target, headers, timeout)).await;
        guard.close().await;

        match result {
            Ok(result) => result,
            Err(_) => {
                error!("Browser navigation to {} timed out", target);
                Err(Error::Timeout(timeout.as_secs()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "rendered"
    }

    async fn shutdown(&self) {
        if let Some(session) = self.session.write().await.take() {
            session.close().await;
        }
    }
}
