use tracing::debug;
use url::Url;

use crate::server::{
    error::{AppResult, Error},
    services::rate_limit_services::{DynRateLimitService, RateLimitResult},
    utils::url_guard_utils::UrlGuard,
};

/// first stop of every relay request: target checks, then the client's request budget
///
/// Targets are checked before the budget so a rejected url doesn't cost the client anything.
#[derive(Clone)]
pub struct RequestValidator {
    guard: UrlGuard,
    rate_limit: DynRateLimitService,
}

impl RequestValidator {
    pub fn new(guard: UrlGuard, rate_limit: DynRateLimitService) -> Self {
        Self { guard, rate_limit }
    }

    pub async fn validate(&self, raw_url: &str, client_id: &str) -> AppResult<Url> {
        let url = self.guard.check(raw_url)?;

        match self.rate_limit.check_rate_limit(client_id).await {
            RateLimitResult::Allowed { remaining, .. } => {
                debug!("Client {} allowed, {} requests left in window", client_id, remaining);
                Ok(url)
            }
            RateLimitResult::RateLimited { retry_after } => {
                Err(Error::RateLimited { retry_after })
            }
        }
    }
}
