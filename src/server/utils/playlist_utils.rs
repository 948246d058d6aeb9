use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::server::utils::header_utils::HeaderSet;

static URI_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"URI="([^"]+)""#).expect("Static regex should compile"));

/// decided once per document, never per line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    /// lists variant playlists, every uri line is itself a playlist
    Master,
    /// lists segments, every uri line is opaque media
    Media,
}

impl PlaylistKind {
    pub fn detect(document: &str) -> Self {
        if document.contains("RESOLUTION=") || document.contains("#EXT-X-STREAM-INF") {
            Self::Master
        } else {
            Self::Media
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Media => "media",
        }
    }
}

/// which relay endpoint a rewritten reference points at
///
/// Playlist targets get fetched and rewritten again on the next hop, segment targets are
/// streamed back verbatim. Sending a nested playlist to the segment endpoint hands the player
/// urls that skip the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteTarget {
    Playlist,
    Segment,
}

/// the pair of relay paths a rewritten document points back at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayEndpoints {
    pub playlist: &'static str,
    pub segment: &'static str,
}

impl RelayEndpoints {
    pub const DIRECT: Self = Self {
        playlist: "/api/proxy",
        segment: "/api/ts-proxy",
    };

    pub const RENDERED: Self = Self {
        playlist: "/api/browser-proxy",
        segment: "/api/browser-ts-proxy",
    };

    pub fn path(&self, target: RewriteTarget) -> &'static str {
        match target {
            RewriteTarget::Playlist => self.playlist,
            RewriteTarget::Segment => self.segment,
        }
    }
}

/// tags carrying a `URI="..."` attribute and where that uri should be routed
fn uri_tag_target(tag_line: &str) -> Option<RewriteTarget> {
    if tag_line.starts_with("#EXT-X-KEY:")
        || tag_line.starts_with("#EXT-X-SESSION-KEY:")
        || tag_line.starts_with("#EXT-X-MAP:")
    {
        Some(RewriteTarget::Segment)
    } else if tag_line.starts_with("#EXT-X-MEDIA:")
        || tag_line.starts_with("#EXT-X-I-FRAME-STREAM-INF:")
    {
        Some(RewriteTarget::Playlist)
    } else {
        None
    }
}

/// resolves a playlist reference against the playlist's own url
///
/// Absolute http(s) references are kept exactly as written. Anything that resolves to another
/// scheme (`skd://`, `data:`) can't be relayed and is reported as a failure.
pub fn resolve_reference(reference: &str, base: &Url) -> Result<String, String> {
    let lowered = reference.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        return Ok(reference.to_string());
    }

    let resolved = base.join(reference).map_err(|e| e.to_string())?;
    match resolved.scheme() {
        "http" | "https" => Ok(resolved.to_string()),
        other => Err(format!("unsupported scheme {}", other)),
    }
}

/// rewrites every reference in a playlist so the next request comes back through the relay
pub struct PlaylistRewriter<'a> {
    relay_origin: &'a str,
    endpoints: RelayEndpoints,
    encoded_headers: String,
}

impl<'a> PlaylistRewriter<'a> {
    pub fn new(relay_origin: &'a str, endpoints: RelayEndpoints, headers: &HeaderSet) -> Self {
        Self {
            relay_origin: relay_origin.trim_end_matches('/'),
            endpoints,
            encoded_headers: urlencoding::encode(&headers.to_json()).into_owned(),
        }
    }

    /// `<origin><endpoint>?url=<absolute>&headers=<json>`, both values percent encoded
    pub fn proxy_url(&self, absolute_url: &str, target: RewriteTarget) -> String {
        format!(
            "{}{}?url={}&headers={}",
            self.relay_origin,
            self.endpoints.path(target),
            urlencoding::encode(absolute_url),
            self.encoded_headers
        )
    }

    /// line count, order, blank lines and line endings all survive untouched
    pub fn rewrite(&self, document: &str, base: &Url, kind: PlaylistKind) -> String {
        debug!(
            "Rewriting {} playlist ({} bytes) against {}",
            kind.as_str(),
            document.len(),
            base
        );

        // a byte order mark would turn the #EXTM3U header into a uri line
        let document = document.strip_prefix('\u{feff}').unwrap_or(document);

        document
            .split('\n')
            .map(|raw_line| {
                // keep the \r of crlf documents out of parsing and put it back afterwards
                let (line, terminator) = match raw_line.strip_suffix('\r') {
                    Some(line) => (line, "\r"),
                    None => (raw_line, ""),
                };

                match self.rewrite_line(line, base, kind) {
                    Some(rewritten) => format!("{}{}", rewritten, terminator),
                    None => raw_line.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // None means the line is emitted unchanged
    fn rewrite_line(&self, line: &str, base: &Url, kind: PlaylistKind) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        if trimmed.starts_with('#') {
            return self.rewrite_tag(line, base);
        }

        let target = match kind {
            PlaylistKind::Master => RewriteTarget::Playlist,
            PlaylistKind::Media => RewriteTarget::Segment,
        };

        match resolve_reference(trimmed, base) {
            Ok(absolute) => Some(self.proxy_url(&absolute, target)),
            Err(e) => {
                Self::record_failure(trimmed, &e);
                None
            }
        }
    }

    fn rewrite_tag(&self, line: &str, base: &Url) -> Option<String> {
        let target = uri_tag_target(line.trim_start())?;
        let captures = URI_ATTRIBUTE.captures(line)?;
        let uri = captures.get(1)?;

        match resolve_reference(uri.as_str(), base) {
            Ok(absolute) => Some(format!(
                "{}{}{}",
                &line[..uri.start()],
                self.proxy_url(&absolute, target),
                &line[uri.end()..]
            )),
            Err(e) => {
                Self::record_failure(uri.as_str(), &e);
                None
            }
        }
    }

    fn record_failure(reference: &str, reason: &str) {
        warn!("Failed to resolve playlist reference {}: {}", reference, reason);
        metrics::counter!("relay_rewrite_line_failures_total").increment(1);
    }
}
