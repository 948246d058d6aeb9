use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::{
    config::AppConfig,
    database::RedisDatabase,
    server::{
        error::{AppResult, Error},
        services::{
            fetch_services::{DirectFetchService, DynFetchService},
            rate_limit_services::{
                DynRateLimitService, InMemoryRateLimitService, RateLimitConfig,
                RedisRateLimitService,
            },
            validation_services::RequestValidator,
        },
        utils::{referer_utils::RefererResolver, url_guard_utils::UrlGuard},
    },
};

/// everything a relay request needs, cloned into every handler through an extension
#[derive(Clone)]
pub struct RelayServices {
    pub config: Arc<AppConfig>,
    pub validator: RequestValidator,
    pub rate_limit: DynRateLimitService,
    pub referers: Arc<RefererResolver>,
    pub direct: DynFetchService,
    /// `None` when the rendered backend is disabled or compiled out
    pub rendered: Option<DynFetchService>,
    pub redis: Option<Arc<RedisDatabase>>,
}

impl RelayServices {
    pub fn new(config: Arc<AppConfig>, redis_db: Option<RedisDatabase>) -> AppResult<Self> {
        info!("starting relay services...");

        let redis = redis_db.map(Arc::new);
        let limits = RateLimitConfig::from(config.as_ref());

        let rate_limit = match &redis {
            Some(redis) => {
                info!("rate limits are shared through redis");
                Arc::new(RedisRateLimitService::new(redis.clone(), limits)) as DynRateLimitService
            }
            None => {
                info!("rate limits are kept in memory");
                Arc::new(InMemoryRateLimitService::new(limits)) as DynRateLimitService
            }
        };

        let direct = Arc::new(DirectFetchService::new(config.max_redirects)?) as DynFetchService;
        let rendered = rendered_backend(&config);

        info!(
            "relay services ok, rendered backend {}",
            if rendered.is_some() { "enabled" } else { "disabled" }
        );

        let mut services = Self::from_parts(config, rate_limit, direct, rendered);
        services.redis = redis;
        Ok(services)
    }

    /// wires the services around backends built elsewhere, tests hand in mocks here
    pub fn from_parts(
        config: Arc<AppConfig>,
        rate_limit: DynRateLimitService,
        direct: DynFetchService,
        rendered: Option<DynFetchService>,
    ) -> Self {
        let guard = UrlGuard::new(config.allowed_domains.clone());
        let validator = RequestValidator::new(guard, rate_limit.clone());
        let referers = Arc::new(RefererResolver::with_mode(config.referer_match));

        Self {
            config,
            validator,
            rate_limit,
            referers,
            direct,
            rendered,
            redis: None,
        }
    }

    /// the rendered backend, or a browser error when there isn't one
    pub fn rendered_backend(&self) -> AppResult<&DynFetchService> {
        self.rendered
            .as_ref()
            .ok_or_else(|| Error::Browser("Rendered backend is not enabled".to_string()))
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.config.fetch_timeout()
    }

    pub async fn shutdown(&self) {
        info!("shutting down fetch backends...");
        self.direct.shutdown().await;
        if let Some(rendered) = &self.rendered {
            rendered.shutdown().await;
        }
    }
}

#[cfg(feature = "browser")]
fn rendered_backend(config: &AppConfig) -> Option<DynFetchService> {
    use crate::server::services::browser_services::{BrowserFetchService, BrowserOptions};

    if !config.browser_enabled {
        return None;
    }
    Some(Arc::new(BrowserFetchService::new(BrowserOptions::from(config))) as DynFetchService)
}

#[cfg(not(feature = "browser"))]
fn rendered_backend(config: &AppConfig) -> Option<DynFetchService> {
    if config.browser_enabled {
        tracing::warn!("BROWSER_ENABLED is set but the relay was built without the browser feature");
    }
    None
}
