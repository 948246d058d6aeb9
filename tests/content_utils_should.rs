use std::io::Write;

use flate2::{Compression, write::GzEncoder};
use relay::server::utils::content_utils::{ContentKind, decode_body};
use url::Url;

fn classify(url: &str, content_type: Option<&str>) -> ContentKind {
    ContentKind::classify(&Url::parse(url).unwrap(), content_type)
}

#[test]
fn test_classifies_by_extension() {
    assert_eq!(classify("https://cdn.example.com/seg001.ts", None), ContentKind::DirectMedia);
    assert_eq!(classify("https://cdn.example.com/video.MP4", None), ContentKind::DirectMedia);
    assert_eq!(classify("https://cdn.example.com/chunk.m4s?token=1", None), ContentKind::DirectMedia);
    assert_eq!(classify("https://cdn.example.com/index.m3u8", None), ContentKind::Playlist);
    // the query string is not part of the path
    assert_eq!(classify("https://cdn.example.com/stream?file=a.ts", None), ContentKind::Playlist);
}

#[test]
fn test_classifies_by_content_type() {
    assert_eq!(
        classify("https://cdn.example.com/stream", Some("video/MP2T")),
        ContentKind::DirectMedia
    );
    assert_eq!(
        classify("https://cdn.example.com/stream", Some("application/vnd.apple.mpegurl")),
        ContentKind::Playlist
    );
    // m3u8 signals win over media ones
    assert_eq!(
        classify("https://cdn.example.com/index.m3u8", Some("video/mp2t")),
        ContentKind::Playlist
    );
    assert_eq!(
        classify("https://cdn.example.com/stream", Some("text/html")),
        ContentKind::Playlist
    );
}

#[test]
fn test_decodes_gzip_bodies() {
    let plain = b"#EXTM3U\n#EXTINF:6.0,\nseg.ts\n";
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(plain).unwrap();
    let compressed = encoder.finish().unwrap();

    assert_eq!(decode_body(Some("gzip"), &compressed).unwrap(), plain);
    assert_eq!(decode_body(Some(" GZIP "), &compressed).unwrap(), plain);
}

#[test]
fn test_decodes_zstd_bodies() {
    let plain = b"#EXTM3U\n";
    let compressed = zstd::encode_all(&plain[..], 3).unwrap();

    assert_eq!(decode_body(Some("zstd"), &compressed).unwrap(), plain);
}

#[test]
fn test_leaves_other_bodies_alone() {
    assert!(decode_body(None, b"plain").is_none());
    assert!(decode_body(Some("identity"), b"plain").is_none());
    assert!(decode_body(Some("br"), b"plain").is_none());
    // labelled gzip but isn't
    assert!(decode_body(Some("gzip"), b"plain").is_none());
}

#[test]
fn test_recognizes_playlist_urls_before_fetching() {
    let playlist = |url: &str| ContentKind::is_playlist_url(&Url::parse(url).unwrap());

    assert!(playlist("https://cdn.example.com/hls/index.m3u8"));
    assert!(playlist("https://cdn.example.com/hls/INDEX.M3U8?token=abc"));
    assert!(!playlist("https://cdn.example.com/video.mp4"));
    assert!(!playlist("https://cdn.example.com/seg001.ts"));
    assert!(!playlist("https://cdn.example.com/stream"));
    assert!(!playlist("https://cdn.example.com/m3u8/"));
}
