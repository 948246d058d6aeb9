use tracing::debug;
use url::Url;

use crate::config::RefererMatch;

/// one row of the referer table: hosts under `domain` are fetched with `referer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefererRule {
    pub domain: &'static str,
    pub referer: &'static str,
}

const fn rule(domain: &'static str, referer: &'static str) -> RefererRule {
    RefererRule { domain, referer }
}

/// order matters, the first rule that matches wins
pub const DEFAULT_REFERER_RULES: &[RefererRule] = &[
    rule("megaplay.buzz", "https://megaplay.buzz/"),
    rule("megacloud.club", "https://megacloud.club/"),
    rule("vidwish.live", "https://vidwish.live/"),
    rule("streamwish.to", "https://streamwish.to/"),
    rule("dotstream.buzz", "https://dotstream.buzz/"),
    rule("cdn.dotstream.buzz", "https://dotstream.buzz/"),
    rule("tubeplx.viddsn.cfd", "https://tubeplx.viddsn.cfd/"),
    rule("youtube.com", "https://www.youtube.com/"),
    rule("youtu.be", "https://www.youtube.com/"),
    rule("googlevideo.com", "https://www.youtube.com/"),
    rule("watching.onl", "https://watching.onl/"),
    rule("fxpy7.watching.onl", "https://watching.onl/"),
];

/// maps a target hostname to a referer origins are known to accept
#[derive(Debug, Clone)]
pub struct RefererResolver {
    rules: Vec<RefererRule>,
    mode: RefererMatch,
}

impl Default for RefererResolver {
    fn default() -> Self {
        Self::new(DEFAULT_REFERER_RULES.to_vec(), RefererMatch::default())
    }
}

impl RefererResolver {
    pub fn new(rules: Vec<RefererRule>, mode: RefererMatch) -> Self {
        Self { rules, mode }
    }

    pub fn with_mode(mode: RefererMatch) -> Self {
        Self::new(DEFAULT_REFERER_RULES.to_vec(), mode)
    }

    /// unparseable urls are a miss, not an error
    pub fn resolve(&self, target_url: &str) -> Option<&'static str> {
        let url = match Url::parse(target_url) {
            Ok(url) => url,
            Err(e) => {
                debug!("Could not parse {} for referer lookup: {}", target_url, e);
                return None;
            }
        };

        self.resolve_host(url.host_str()?)
    }

    pub fn resolve_host(&self, hostname: &str) -> Option<&'static str> {
        if let Some(exact) = self.rules.iter().find(|r| r.domain == hostname) {
            return Some(exact.referer);
        }

        let matched = match self.mode {
            RefererMatch::Strict => self.rules.iter().find(|r| {
                hostname
                    .strip_suffix(r.domain)
                    .is_some_and(|rest| rest.ends_with('.'))
            }),
            RefererMatch::Compatible => {
                let tail = last_two_labels(hostname);
                self.rules
                    .iter()
                    .find(|r| hostname.ends_with(r.domain) || r.domain.ends_with(tail.as_str()))
            }
        };

        matched.map(|r| r.referer)
    }
}

// "a.b.example.com" -> "example.com", a single label comes back as is
fn last_two_labels(hostname: &str) -> String {
    let labels: Vec<&str> = hostname.split('.').collect();
    labels[labels.len().saturating_sub(2)..].join(".")
}
