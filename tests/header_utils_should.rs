use relay::server::error::Error;
use relay::server::utils::header_utils::{HeaderSet, HeaderSynthesizer, USER_AGENT};
use url::Url;

fn target() -> Url {
    Url::parse("https://cdn.example.com/hls/index.m3u8").unwrap()
}

#[test]
fn test_custom_headers_win() {
    let custom = HeaderSet::from_json(Some(r#"{"referer":"https://override.example/"}"#)).unwrap();

    let headers = HeaderSynthesizer::build(&target(), Some("https://auto.example/"), &custom);

    assert_eq!(headers.get("Referer"), Some("https://override.example/"));
    // replaced, not duplicated
    assert_eq!(
        headers.iter().filter(|(n, _)| n.eq_ignore_ascii_case("referer")).count(),
        1
    );
}

#[test]
fn test_resolved_referer_beats_default() {
    let headers = HeaderSynthesizer::build(&target(), Some("https://auto.example/"), &HeaderSet::new());

    assert_eq!(headers.get("referer"), Some("https://auto.example/"));
    assert_eq!(headers.get("User-Agent"), Some(USER_AGENT));
    assert_eq!(headers.get("Accept-Encoding"), Some("gzip, deflate, zstd"));
    assert!(headers.contains("Sec-Ch-Ua"));
    assert!(headers.contains("Sec-Fetch-Mode"));
}

#[test]
fn test_referer_defaults_to_target_origin() {
    let headers = HeaderSynthesizer::build(&target(), None, &HeaderSet::new());

    assert_eq!(headers.get("Referer"), Some("https://cdn.example.com"));
    assert_eq!(headers.get("Origin"), Some("https://cdn.example.com"));
}

#[test]
fn test_forwarded_set_only_adds_missing_referer() {
    let empty = HeaderSynthesizer::forwarded(&HeaderSet::new(), Some("https://auto.example/"));
    assert_eq!(empty.get("referer"), Some("https://auto.example/"));
    assert_eq!(empty.len(), 1);

    let custom = HeaderSet::from_json(Some(r#"{"Referer":"https://mine.example/","X-Token":"a"}"#)).unwrap();
    let forwarded = HeaderSynthesizer::forwarded(&custom, Some("https://auto.example/"));
    assert_eq!(forwarded, custom);

    assert!(HeaderSynthesizer::forwarded(&HeaderSet::new(), None).is_empty());
}

#[test]
fn test_rejects_malformed_json() {
    for raw in [
        "not json",
        "[1, 2]",
        r#"{"a": {"nested": true}}"#,
        r#"{"a": 1}"#,
        r#"{"bad header": "x"}"#,
    ] {
        assert!(
            matches!(HeaderSet::from_json(Some(raw)), Err(Error::Parse(_))),
            "{} should be rejected",
            raw
        );
    }

    assert!(HeaderSet::from_json(None).unwrap().is_empty());
    assert!(HeaderSet::from_json(Some("  ")).unwrap().is_empty());
}

#[test]
fn test_case_insensitive_set_keeps_latest_name() {
    let mut headers = HeaderSet::new();
    headers.set("X-Custom", "one");
    headers.set("x-custom", "two");

    assert_eq!(headers.len(), 1);
    assert_eq!(headers.iter().next(), Some(("x-custom", "two")));
    assert_eq!(headers.to_json(), r#"{"x-custom":"two"}"#);

    let map = headers.to_header_map().unwrap();
    assert_eq!(map.get("X-CUSTOM").unwrap(), "two");
}
