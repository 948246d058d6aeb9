use std::net::Ipv6Addr;

use tracing::debug;
use url::{Host, Url};

use crate::server::error::{AppResult, Error};

/// hosts that are refused outright, matched against the literal hostname
const BLOCKED_HOSTS: &[&str] = &["localhost", "0.0.0.0", "[::1]"];

/// textual prefixes of loopback and private ipv4 ranges (127/8, 10/8, 172.16/12, 192.168/16)
const BLOCKED_PREFIXES: &[&str] = &[
    "127.", "10.", "192.168.", "172.16.", "172.17.", "172.18.", "172.19.", "172.20.", "172.21.",
    "172.22.", "172.23.", "172.24.", "172.25.", "172.26.", "172.27.", "172.28.", "172.29.",
    "172.30.", "172.31.",
];

/// scheme, ssrf and optional domain allowlist checks for relay targets
///
/// Nothing here resolves dns, a public name pointing at a private address still gets through.
/// The url parser normalizes numeric hosts (`0x7f.1`, `2130706433`) into dotted quads before the
/// prefix check runs, so those spellings are caught.
#[derive(Debug, Clone, Default)]
pub struct UrlGuard {
    allowed_domains: Vec<String>,
}

impl UrlGuard {
    pub fn new(allowed_domains: Vec<String>) -> Self {
        let allowed_domains = allowed_domains
            .into_iter()
            .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();

        Self { allowed_domains }
    }

    pub fn check(&self, raw_url: &str) -> AppResult<Url> {
        let raw_url = raw_url.trim();
        if raw_url.is_empty() {
            return Err(Error::Validation("URL parameter is required".to_string()));
        }

        let url = Url::parse(raw_url)
            .map_err(|_| Error::Validation("Invalid URL format".to_string()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::Validation(
                "Only HTTP and HTTPS protocols are allowed".to_string(),
            ));
        }

        let hostname = url
            .host_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| Error::Validation("Invalid URL format".to_string()))?;

        let blocked_ip = match url.host() {
            Some(Host::Ipv6(addr)) => Self::is_blocked_ipv6(&addr),
            _ => false,
        };
        if blocked_ip || Self::is_blocked_host(&hostname) {
            debug!("Blocked private/local target host: {}", hostname);
            return Err(Error::Validation(
                "Private/local URLs are not allowed".to_string(),
            ));
        }

        if !self.is_allowed_domain(&hostname) {
            debug!("Target host {} is not on the domain allowlist", hostname);
            return Err(Error::Validation(format!(
                "Domain {} is not allowed",
                hostname
            )));
        }

        Ok(url)
    }

    pub fn is_blocked_host(hostname: &str) -> bool {
        BLOCKED_HOSTS.contains(&hostname)
            || BLOCKED_PREFIXES
                .iter()
                .any(|prefix| hostname.starts_with(prefix))
    }

    /// loopback, unspecified, unique local (fc00::/7), link local (fe80::/10) and v4-mapped
    /// addresses whose v4 form is blocked
    pub fn is_blocked_ipv6(addr: &Ipv6Addr) -> bool {
        if let Some(mapped) = addr.to_ipv4_mapped() {
            return Self::is_blocked_host(&mapped.to_string());
        }

        let first = addr.segments()[0];
        addr.is_loopback()
            || addr.is_unspecified()
            || (first & 0xfe00) == 0xfc00
            || (first & 0xffc0) == 0xfe80
    }

    fn is_allowed_domain(&self, hostname: &str) -> bool {
        self.allowed_domains.is_empty()
            || self.allowed_domains.iter().any(|domain| {
                hostname == domain
                    || hostname
                        .strip_suffix(domain.as_str())
                        .is_some_and(|rest| rest.ends_with('.'))
            })
    }
}
