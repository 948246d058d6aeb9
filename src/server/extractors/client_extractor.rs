use std::net::{IpAddr, SocketAddr};

use axum::Extension;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{HOST, ORIGIN};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use tracing::{debug, warn};

use crate::server::error::{AppResult, Error};
use crate::server::services::RelayServices;

/// the calling client's identifier plus the services, rejects origins that aren't allowed
pub struct RelayClient(pub String, pub RelayServices);

/// where rewritten playlists point back to, without a trailing slash
pub struct RelayOrigin(pub String);

/// first hop of X-Forwarded-For, X-Real-IP, CF-Connecting-IP, then the socket peer
pub fn client_identifier(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    };

    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| header("x-real-ip"))
        .or_else(|| header("cf-connecting-ip"))
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// an empty allowlist lets everyone through, otherwise the Origin header has to be on it
pub fn check_origin(allowed_origins: &[String], origin: Option<&str>) -> AppResult<()> {
    if allowed_origins.is_empty() {
        return Ok(());
    }

    let normalize = |s: &str| s.trim().trim_end_matches('/').to_ascii_lowercase();
    let Some(origin) = origin.map(normalize) else {
        return Err(Error::Forbidden("Origin header is required".to_string()));
    };

    if allowed_origins.iter().any(|allowed| normalize(allowed) == origin) {
        Ok(())
    } else {
        Err(Error::Forbidden(format!("Origin {} is not allowed", origin)))
    }
}

/// `PUBLIC_URL` when set, otherwise the scheme and host this request came in on
pub fn relay_origin(
    public_origin: Option<String>,
    headers: &HeaderMap,
    authority: Option<&str>,
) -> AppResult<String> {
    if let Some(origin) = public_origin {
        return Ok(origin);
    }

    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or(authority)
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::Validation("Missing Host header".to_string()))?;

    let scheme = match headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
    {
        Some(proto) if proto.trim().to_ascii_lowercase().starts_with("https") => "https",
        _ => "http",
    };

    Ok(format!("{}://{}", scheme, host))
}

async fn relay_services<S>(parts: &mut Parts, state: &S) -> AppResult<RelayServices>
where
    S: Send + Sync,
{
    let Extension(services): Extension<RelayServices> =
        Extension::from_request_parts(parts, state)
            .await
            .map_err(|err| Error::InternalServerErrorWithContext(err.to_string()))?;
    Ok(services)
}

impl<S> FromRequestParts<S> for RelayClient
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let services = relay_services(parts, state).await?;

        let origin = parts.headers.get(ORIGIN).and_then(|h| h.to_str().ok());
        if let Err(e) = check_origin(&services.config.allowed_origins, origin) {
            warn!("Rejected request from origin {:?}", origin);
            return Err(e);
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip());
        let client_id = client_identifier(&parts.headers, peer);
        debug!("Client id: {}", client_id);

        Ok(RelayClient(client_id, services))
    }
}

impl<S> FromRequestParts<S> for RelayOrigin
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let services = relay_services(parts, state).await?;
        let authority = parts.uri.authority().map(|a| a.as_str());

        relay_origin(services.config.public_origin(), &parts.headers, authority).map(RelayOrigin)
    }
}
