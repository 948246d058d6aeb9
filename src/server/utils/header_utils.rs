use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::server::error::{AppResult, Error};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const SEC_CH_UA: &str = r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#;
/// only codings the relay can decode itself, see `content_utils::decode_body`
pub const ACCEPT_ENCODING: &str = "gzip, deflate, zstd";

/// ordered header list with case-insensitive replacement
///
/// Names keep the case they were last set with. That matters for the json blob embedded in
/// rewritten playlist urls, the next hop reads the caller's headers back exactly as given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// parses the `headers` query parameter, which must be a flat json object of strings
    pub fn from_json(raw: Option<&str>) -> AppResult<Self> {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Ok(Self::new());
        };

        let parsed: BTreeMap<String, String> = serde_json::from_str(raw)
            .map_err(|_| Error::Parse("Invalid headers JSON".to_string()))?;

        let mut headers = Self::new();
        for (name, value) in parsed {
            if HeaderName::from_bytes(name.as_bytes()).is_err()
                || HeaderValue::from_str(&value).is_err()
            {
                return Err(Error::Parse(format!("Invalid header in headers JSON: {}", name)));
            }
            headers.set(name, value);
        }

        Ok(headers)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// later entries win over earlier ones with the same name
    pub fn merged_with(mut self, overrides: &HeaderSet) -> Self {
        for (name, value) in overrides.iter() {
            self.set(name, value);
        }
        self
    }

    pub fn to_json(&self) -> String {
        let object: serde_json::Map<String, serde_json::Value> = self
            .iter()
            .map(|(n, v)| (n.to_string(), serde_json::Value::String(v.to_string())))
            .collect();

        serde_json::Value::Object(object).to_string()
    }

    pub fn to_header_map(&self) -> AppResult<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in self.iter() {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::Parse(format!("Invalid header name: {}", name)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| Error::Parse(format!("Invalid value for header {}", name)))?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

/// builds the browser-looking header set sent to origins
pub struct HeaderSynthesizer;

impl HeaderSynthesizer {
    /// the caller's headers plus the resolved referer when they didn't bring one
    ///
    /// This is the set carried along in rewritten playlist urls, the fingerprint defaults are
    /// recomputed by every hop so there's no point shipping them around.
    pub fn forwarded(custom: &HeaderSet, resolved_referer: Option<&str>) -> HeaderSet {
        let mut forwarded = custom.clone();
        match resolved_referer {
            Some(referer) if !forwarded.contains("referer") => forwarded.set("referer", referer),
            _ => {}
        }
        forwarded
    }

    /// precedence, lowest first: fingerprint defaults, resolved referer, caller headers
    ///
    /// Without a resolved or caller supplied referer the target's own origin is used.
    pub fn build(target: &Url, resolved_referer: Option<&str>, custom: &HeaderSet) -> HeaderSet {
        let origin = target.origin().ascii_serialization();

        let mut headers = HeaderSet::new();
        headers.set("User-Agent", USER_AGENT);
        headers.set("Accept", "*/*");
        headers.set("Accept-Language", "en-US,en;q=0.9");
        headers.set("Accept-Encoding", ACCEPT_ENCODING);
        headers.set("Sec-Fetch-Dest", "empty");
        headers.set("Sec-Fetch-Mode", "cors");
        headers.set("Sec-Fetch-Site", "cross-site");
        headers.set("Sec-Ch-Ua", SEC_CH_UA);
        headers.set("Sec-Ch-Ua-Mobile", "?0");
        headers.set("Sec-Ch-Ua-Platform", "\"Windows\"");
        headers.set("Origin", origin.as_str());
        headers.set("Referer", origin.as_str());

        if let Some(referer) = resolved_referer {
            headers.set("Referer", referer);
        }

        headers.merged_with(custom)
    }
}
