use axum::{
    Router,
    http::{HeaderMap, header},
    response::Response,
    routing::get,
};
use tracing::{debug, error, warn};

use crate::server::{
    dtos::proxy_dto::ProxyQuery,
    error::{AppResult, Error},
    extractors::{RelayClient, RelayOrigin, ValidatedQuery},
    services::{DynFetchService, RelayServices},
    utils::{
        content_utils::ContentKind,
        header_utils::{HeaderSet, HeaderSynthesizer},
        playlist_utils::{PlaylistKind, PlaylistRewriter, RelayEndpoints, RewriteTarget},
        response_utils::ResponseEmitter,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Direct,
    Rendered,
}

/// one relay route: which backend fetches and whether the result may be a playlist
#[derive(Debug, Clone, Copy)]
struct Route {
    endpoint: &'static str,
    backend: Backend,
    role: RewriteTarget,
}

impl Route {
    const PROXY: Self = Self {
        endpoint: "proxy",
        backend: Backend::Direct,
        role: RewriteTarget::Playlist,
    };
    const TS_PROXY: Self = Self {
        endpoint: "ts-proxy",
        backend: Backend::Direct,
        role: RewriteTarget::Segment,
    };
    const BROWSER_PROXY: Self = Self {
        endpoint: "browser-proxy",
        backend: Backend::Rendered,
        role: RewriteTarget::Playlist,
    };
    const BROWSER_TS_PROXY: Self = Self {
        endpoint: "browser-ts-proxy",
        backend: Backend::Rendered,
        role: RewriteTarget::Segment,
    };

    /// rewritten playlists stay on the backend they were fetched with
    fn endpoints(&self) -> RelayEndpoints {
        match self.backend {
            Backend::Direct => RelayEndpoints::DIRECT,
            Backend::Rendered => RelayEndpoints::RENDERED,
        }
    }

    fn fetcher<'a>(&self, services: &'a RelayServices) -> AppResult<&'a DynFetchService> {
        match self.backend {
            Backend::Direct => Ok(&services.direct),
            Backend::Rendered => services.rendered_backend(),
        }
    }
}

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new()
            .route("/proxy", get(Self::proxy_get).options(Self::proxy_options))
            .route("/ts-proxy", get(Self::ts_proxy_get).options(Self::proxy_options))
            .route(
                "/browser-proxy",
                get(Self::browser_proxy_get).options(Self::proxy_options),
            )
            .route(
                "/browser-ts-proxy",
                get(Self::browser_ts_proxy_get).options(Self::proxy_options),
            )
    }

    async fn proxy_get(
        RelayClient(client_id, services): RelayClient,
        RelayOrigin(origin): RelayOrigin,
        ValidatedQuery(query): ValidatedQuery<ProxyQuery>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        Self::relay(Route::PROXY, &client_id, &services, &origin, &query, &headers).await
    }

    async fn ts_proxy_get(
        RelayClient(client_id, services): RelayClient,
        RelayOrigin(origin): RelayOrigin,
        ValidatedQuery(query): ValidatedQuery<ProxyQuery>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        Self::relay(Route::TS_PROXY, &client_id, &services, &origin, &query, &headers).await
    }

    async fn browser_proxy_get(
        RelayClient(client_id, services): RelayClient,
        RelayOrigin(origin): RelayOrigin,
        ValidatedQuery(query): ValidatedQuery<ProxyQuery>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        Self::relay(Route::BROWSER_PROXY, &client_id, &services, &origin, &query, &headers).await
    }

    async fn browser_ts_proxy_get(
        RelayClient(client_id, services): RelayClient,
        RelayOrigin(origin): RelayOrigin,
        ValidatedQuery(query): ValidatedQuery<ProxyQuery>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        Self::relay(Route::BROWSER_TS_PROXY, &client_id, &services, &origin, &query, &headers)
            .await
    }

    async fn proxy_options() -> Response {
        ResponseEmitter::preflight()
    }

    async fn relay(
        route: Route,
        client_id: &str,
        services: &RelayServices,
        origin: &str,
        query: &ProxyQuery,
        inbound: &HeaderMap,
    ) -> AppResult<Response> {
        let result = Self::handle(route, client_id, services, origin, query, inbound).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!("relay_requests_total", "endpoint" => route.endpoint, "outcome" => outcome)
            .increment(1);

        if let Err(e) = &result {
            match e {
                Error::Validation(_) | Error::Parse(_) | Error::RateLimited { .. } => {
                    warn!("Rejected /api/{} for {}: {}", route.endpoint, client_id, e)
                }
                _ => error!(
                    "Relay of {} through /api/{} failed: {}",
                    query.target(),
                    route.endpoint,
                    e
                ),
            }
        }

        result
    }

    async fn handle(
        route: Route,
        client_id: &str,
        services: &RelayServices,
        origin: &str,
        query: &ProxyQuery,
        inbound: &HeaderMap,
    ) -> AppResult<Response> {
        // headers parse before the validator charges the rate limit
        let custom = HeaderSet::from_json(query.headers.as_deref())?;
        let target = services.validator.validate(query.target(), client_id).await?;

        let referer = target
            .host_str()
            .and_then(|host| services.referers.resolve_host(host));
        debug!("Relaying {} (referer {:?})", target, referer);

        let forwarded = HeaderSynthesizer::forwarded(&custom, referer);
        let mut outbound = HeaderSynthesizer::build(&target, referer, &custom);
        // range is per request, it never travels inside rewritten urls, and a partial playlist
        // can't be rewritten
        let ranged = route.role == RewriteTarget::Segment || !ContentKind::is_playlist_url(&target);
        if let Some(range) = inbound.get(header::RANGE).and_then(|v| v.to_str().ok()) {
            if ranged {
                outbound.set("Range", range);
            } else {
                debug!("Dropping Range for playlist {}", target);
            }
        }

        let fetcher = route.fetcher(services)?;
        let fetched = fetcher
            .fetch(&target, &outbound, services.fetch_timeout())
            .await?
            .error_for_status()?;
        debug!("{} backend answered {} for {}", fetcher.name(), fetched.status, target);

        if route.role == RewriteTarget::Segment {
            return Ok(ResponseEmitter::media(fetched));
        }

        match ContentKind::classify(&target, fetched.content_type()) {
            ContentKind::DirectMedia => Ok(ResponseEmitter::media(fetched)),
            ContentKind::Playlist => {
                let document = fetched.text();
                let kind = PlaylistKind::detect(&document);

                let rewriter = PlaylistRewriter::new(origin, route.endpoints(), &forwarded);
                let rewritten = rewriter.rewrite(&document, &target, kind);
                metrics::counter!("relay_playlists_rewritten_total", "kind" => kind.as_str())
                    .increment(1);

                Ok(ResponseEmitter::playlist(rewritten))
            }
        }
    }
}
