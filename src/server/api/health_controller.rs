use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::error;

use crate::database::RedisDatabase;
use crate::server::dtos::health_dto::{
    BrowserHealth, HealthResponse, HealthStatus, RateLimiterHealth, RedisHealth,
    ServiceHealthDetails,
};
use crate::server::services::RelayServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// health endpoint, only redis can make the relay unhealthy, a requested but missing browser
/// only degrades it
pub async fn health_endpoint(
    Extension(services): Extension<RelayServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let redis_health = match &services.redis {
        Some(redis) => Some(check_redis_health(redis).await),
        None => None,
    };

    let browser_missing = services.config.browser_enabled && services.rendered.is_none();

    let overall_status = match &redis_health {
        Some(redis) if redis.status == HealthStatus::Unhealthy => HealthStatus::Unhealthy,
        _ if browser_missing => HealthStatus::Degraded,
        _ => HealthStatus::Healthy,
    };

    let response = HealthResponse {
        status: overall_status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        services: ServiceHealthDetails {
            rate_limiter: RateLimiterHealth {
                backend: services.rate_limit.backend().to_string(),
            },
            browser: BrowserHealth {
                enabled: services.rendered.is_some(),
            },
            redis: redis_health,
        },
    };

    let http_status = match overall_status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}

async fn check_redis_health(redis: &RedisDatabase) -> RedisHealth {
    match redis.health_check().await {
        Ok(response_time) => RedisHealth {
            status: HealthStatus::Healthy,
            response_time_ms: response_time,
        },
        Err(e) => {
            error!("Redis health check failed: {}", e);
            RedisHealth {
                status: HealthStatus::Unhealthy,
                response_time_ms: 0.0,
            }
        }
    }
}
