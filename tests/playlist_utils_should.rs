use relay::server::utils::header_utils::HeaderSet;
use relay::server::utils::playlist_utils::{
    PlaylistKind, PlaylistRewriter, RelayEndpoints, RewriteTarget, resolve_reference,
};
use url::Url;

const RELAY: &str = "http://relay.test";

fn base() -> Url {
    Url::parse("https://cdn.example.com/path/master.m3u8").unwrap()
}

// value of a query parameter on an emitted proxy url, already percent decoded
fn query_param(proxy_url: &str, name: &str) -> String {
    Url::parse(proxy_url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

#[test]
fn test_detects_master_and_media() {
    assert_eq!(
        PlaylistKind::detect("#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow.m3u8\n"),
        PlaylistKind::Master
    );
    // RESOLUTION= alone is enough
    assert_eq!(
        PlaylistKind::detect("#EXTM3U\n#EXT-X-FOO:RESOLUTION=1280x720\n"),
        PlaylistKind::Master
    );
    assert_eq!(
        PlaylistKind::detect("#EXTM3U\n#EXTINF:6.0,\nseg001.ts\n"),
        PlaylistKind::Media
    );
}

#[test]
fn test_resolves_relative_references() {
    assert_eq!(
        resolve_reference("seg001.ts", &base()).unwrap(),
        "https://cdn.example.com/path/seg001.ts"
    );
    assert_eq!(
        resolve_reference("/root/seg.ts", &base()).unwrap(),
        "https://cdn.example.com/root/seg.ts"
    );
    assert_eq!(
        resolve_reference("../up.ts", &base()).unwrap(),
        "https://cdn.example.com/up.ts"
    );
    // absolute urls are kept exactly as written
    assert_eq!(
        resolve_reference("https://other.example.com/a b.ts", &base()).unwrap(),
        "https://other.example.com/a b.ts"
    );
    assert!(resolve_reference("skd://key-id", &base()).is_err());
}

#[test]
fn test_comment_only_documents_are_untouched() {
    let rewriter = PlaylistRewriter::new(RELAY, RelayEndpoints::DIRECT, &HeaderSet::new());
    let document = "#EXTM3U\n\n# just a comment\n#EXT-X-VERSION:3\n\n\n#EXT-X-ENDLIST\n";

    let rewritten = rewriter.rewrite(document, &base(), PlaylistKind::Media);

    assert_eq!(rewritten, document);
}

#[test]
fn test_media_playlist_lines_go_to_segment_endpoint() {
    let rewriter = PlaylistRewriter::new(RELAY, RelayEndpoints::DIRECT, &HeaderSet::new());
    let document = "#EXTM3U\n#EXTINF:6.0,\nseg001.ts\n#EXTINF:6.0,\nhttps://other.example.com/seg002.ts\n";

    let rewritten = rewriter.rewrite(document, &base(), PlaylistKind::Media);
    let lines: Vec<&str> = rewritten.split('\n').collect();

    assert_eq!(lines.len(), document.split('\n').count());
    assert_eq!(lines[0], "#EXTM3U");
    assert_eq!(lines[1], "#EXTINF:6.0,");
    assert_eq!(
        lines[2],
        "http://relay.test/api/ts-proxy?url=https%3A%2F%2Fcdn.example.com%2Fpath%2Fseg001.ts&headers=%7B%7D"
    );
    assert!(lines[4].starts_with("http://relay.test/api/ts-proxy?url="));
    assert_eq!(
        query_param(lines[4], "url"),
        "https://other.example.com/seg002.ts"
    );
    assert_eq!(lines[5], "");
}

#[test]
fn test_master_playlist_lines_go_to_playlist_endpoint() {
    let rewriter = PlaylistRewriter::new(RELAY, RelayEndpoints::DIRECT, &HeaderSet::new());
    let document = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow/index.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=2000000\nhigh/index.m3u8";

    let rewritten = rewriter.rewrite(document, &base(), PlaylistKind::Master);
    let lines: Vec<&str> = rewritten.split('\n').collect();

    assert_eq!(lines.len(), 5);
    assert!(lines[2].starts_with("http://relay.test/api/proxy?url="));
    assert_eq!(
        query_param(lines[2], "url"),
        "https://cdn.example.com/path/low/index.m3u8"
    );
    assert_eq!(
        query_param(lines[4], "url"),
        "https://cdn.example.com/path/high/index.m3u8"
    );
}

#[test]
fn test_rewrites_key_and_media_uris_in_place() {
    let rewriter = PlaylistRewriter::new(RELAY, RelayEndpoints::DIRECT, &HeaderSet::new());
    let document = concat!(
        "#EXT-X-KEY:METHOD=AES-128,URI=\"keys/key.bin\",IV=0x1234\n",
        "#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"en\",URI=\"audio/en.m3u8\"\n",
        "#EXT-X-KEY:METHOD=NONE\n",
    );

    let rewritten = rewriter.rewrite(document, &base(), PlaylistKind::Master);
    let lines: Vec<&str> = rewritten.split('\n').collect();

    let key_prefix = "#EXT-X-KEY:METHOD=AES-128,URI=\"";
    assert!(lines[0].starts_with(key_prefix));
    assert!(lines[0].ends_with("\",IV=0x1234"));
    let key_url = &lines[0][key_prefix.len()..lines[0].len() - "\",IV=0x1234".len()];
    assert!(key_url.starts_with("http://relay.test/api/ts-proxy?"));
    assert_eq!(
        query_param(key_url, "url"),
        "https://cdn.example.com/path/keys/key.bin"
    );

    assert!(lines[1].starts_with(
        "#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"en\",URI=\"http://relay.test/api/proxy?url="
    ));

    // no URI attribute, nothing to do
    assert_eq!(lines[2], "#EXT-X-KEY:METHOD=NONE");
}

#[test]
fn test_rewrites_map_and_iframe_tags() {
    let rewriter = PlaylistRewriter::new(RELAY, RelayEndpoints::DIRECT, &HeaderSet::new());
    let document = concat!(
        "#EXT-X-MAP:URI=\"init.mp4\"\n",
        "#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=86000,URI=\"iframe.m3u8\"\n",
        "#EXT-X-SESSION-KEY:METHOD=AES-128,URI=\"session.key\"",
    );

    let rewritten = rewriter.rewrite(document, &base(), PlaylistKind::Master);
    let lines: Vec<&str> = rewritten.split('\n').collect();

    assert!(lines[0].starts_with("#EXT-X-MAP:URI=\"http://relay.test/api/ts-proxy?url="));
    assert!(lines[1].contains("URI=\"http://relay.test/api/proxy?url="));
    assert!(lines[2].contains("URI=\"http://relay.test/api/ts-proxy?url="));
}

#[test]
fn test_unresolvable_references_pass_through() {
    let rewriter = PlaylistRewriter::new(RELAY, RelayEndpoints::DIRECT, &HeaderSet::new());
    let document = "#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"skd://key-id\"\nskd://other\nseg.ts";

    let rewritten = rewriter.rewrite(document, &base(), PlaylistKind::Media);
    let lines: Vec<&str> = rewritten.split('\n').collect();

    assert_eq!(lines[0], "#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"skd://key-id\"");
    assert_eq!(lines[1], "skd://other");
    assert!(lines[2].starts_with("http://relay.test/api/ts-proxy?url="));
}

#[test]
fn test_keeps_crlf_line_endings() {
    let rewriter = PlaylistRewriter::new(RELAY, RelayEndpoints::DIRECT, &HeaderSet::new());
    let document = "#EXTM3U\r\n#EXTINF:6.0,\r\nseg001.ts\r\n";

    let rewritten = rewriter.rewrite(document, &base(), PlaylistKind::Media);

    assert!(rewritten.starts_with("#EXTM3U\r\n#EXTINF:6.0,\r\nhttp://relay.test/api/ts-proxy?url="));
    assert!(rewritten.ends_with("&headers=%7B%7D\r\n"));
    assert_eq!(rewritten.matches("\r\n").count(), 3);
}

#[test]
fn test_embeds_headers_as_json() {
    let mut headers = HeaderSet::new();
    headers.set("referer", "https://megaplay.buzz/");
    let rewriter = PlaylistRewriter::new(RELAY, RelayEndpoints::DIRECT, &headers);

    let proxied = rewriter.proxy_url("https://cdn.example.com/a.ts", RewriteTarget::Segment);
    let embedded = query_param(&proxied, "headers");

    assert_eq!(
        HeaderSet::from_json(Some(&embedded)).unwrap(),
        headers
    );
}

#[test]
fn test_rendered_endpoints_stay_rendered() {
    let rewriter = PlaylistRewriter::new(
        "https://relay.example.com/",
        RelayEndpoints::RENDERED,
        &HeaderSet::new(),
    );
    let document = "#EXT-X-STREAM-INF:BANDWIDTH=1\nvariant.m3u8\n#EXT-X-KEY:METHOD=AES-128,URI=\"k\"";

    let rewritten = rewriter.rewrite(document, &base(), PlaylistKind::Master);
    let lines: Vec<&str> = rewritten.split('\n').collect();

    assert!(lines[1].starts_with("https://relay.example.com/api/browser-proxy?url="));
    assert!(lines[2].contains("URI=\"https://relay.example.com/api/browser-ts-proxy?url="));
}

#[test]
fn test_byte_order_mark_does_not_hide_the_header() {
    let rewriter = PlaylistRewriter::new(RELAY, RelayEndpoints::DIRECT, &HeaderSet::new());
    let document = "\u{feff}#EXTM3U\n#EXTINF:6.0,\nseg001.ts\n";

    let rewritten = rewriter.rewrite(document, &base(), PlaylistKind::Media);
    let lines: Vec<&str> = rewritten.split('\n').collect();

    assert_eq!(lines[0], "#EXTM3U");
    assert_eq!(lines[1], "#EXTINF:6.0,");
    assert_eq!(query_param(lines[2], "url"), "https://cdn.example.com/path/seg001.ts");
}
