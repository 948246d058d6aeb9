use std::io::Read;

use flate2::read::{GzDecoder, ZlibDecoder};
use tracing::{debug, warn};
use url::Url;

const MEDIA_EXTENSIONS: &[&str] = &["mp4", "webm", "mp3", "ts", "m4s", "aac", "m4a"];
const MEDIA_TYPES: &[&str] = &[
    "video/mp4",
    "video/webm",
    "audio/mpeg",
    "video/mp2t",
    "audio/mp4",
    "audio/aac",
];

/// what a fetched body gets treated as on the playlist endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// passed through byte for byte
    DirectMedia,
    /// textual playlist, goes through the rewriter
    Playlist,
}

impl ContentKind {
    /// m3u8 signals always win, anything that isn't recognizable media is assumed to be a playlist
    pub fn classify(url: &Url, content_type: Option<&str>) -> Self {
        let extension = path_extension(url);
        let content_type = content_type.unwrap_or("").to_ascii_lowercase();

        let is_m3u8 = extension.as_deref() == Some("m3u8")
            || content_type.contains("mpegurl")
            || content_type.contains("m3u8");
        if is_m3u8 {
            return Self::Playlist;
        }

        let is_media = extension
            .as_deref()
            .is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext))
            || MEDIA_TYPES.iter().any(|t| content_type.contains(t));

        if is_media {
            Self::DirectMedia
        } else {
            Self::Playlist
        }
    }

    /// m3u8 by path extension alone, before anything was fetched
    pub fn is_playlist_url(url: &Url) -> bool {
        path_extension(url).as_deref() == Some("m3u8")
    }
}

// lowercase extension of the last path segment, query and fragment don't count
fn path_extension(url: &Url) -> Option<String> {
    let last_segment = url.path_segments()?.next_back()?;
    let (stem, extension) = last_segment.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

/// undoes `content-encoding` for the codings advertised in our `Accept-Encoding`
///
/// Returns `None` when the body was left as is, either because it wasn't encoded, the coding is
/// unknown, or decoding failed (some origins label plain bodies as gzip).
pub fn decode_body(content_encoding: Option<&str>, bytes: &[u8]) -> Option<Vec<u8>> {
    let encoding = content_encoding?.trim().to_ascii_lowercase();

    let decoded = match encoding.as_str() {
        "" | "identity" => return None,
        "gzip" | "x-gzip" => {
            let mut out = Vec::new();
            GzDecoder::new(bytes).read_to_end(&mut out).map(|_| out)
        }
        "deflate" => {
            let mut out = Vec::new();
            ZlibDecoder::new(bytes).read_to_end(&mut out).map(|_| out)
        }
        "zstd" => zstd::decode_all(bytes),
        other => {
            debug!("Leaving body with unsupported content-encoding {} as is", other);
            return None;
        }
    };

    match decoded {
        Ok(decoded) => {
            debug!(
                "Decoded {} body from {} to {} bytes",
                encoding,
                bytes.len(),
                decoded.len()
            );
            Some(decoded)
        }
        Err(e) => {
            warn!("Failed to decode {} body, passing it through: {}", encoding, e);
            None
        }
    }
}
