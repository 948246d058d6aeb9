use relay::server::error::Error;
use relay::server::utils::url_guard_utils::UrlGuard;

fn rejected(guard: &UrlGuard, url: &str) -> bool {
    matches!(guard.check(url), Err(Error::Validation(_)))
}

#[test]
fn test_rejects_private_and_local_hosts() {
    let guard = UrlGuard::default();

    for url in [
        "http://127.0.0.1/live.m3u8",
        "http://10.0.0.5/live.m3u8",
        "http://192.168.1.1/live.m3u8",
        "http://localhost:8080/live.m3u8",
        "http://0.0.0.0/live.m3u8",
        "http://172.20.1.1/live.m3u8",
        "http://[::1]/live.m3u8",
        "http://[::]/live.m3u8",
        "http://[::ffff:127.0.0.1]/live.m3u8",
        "http://[::ffff:10.0.0.5]/live.m3u8",
        "http://[::ffff:192.168.1.1]/live.m3u8",
        "http://[fd12:3456::1]/live.m3u8",
        "http://[fe80::1]/live.m3u8",
        // numeric spellings get normalized by the url parser first
        "http://0x7f.1/live.m3u8",
        "http://2130706433/live.m3u8",
    ] {
        assert!(rejected(&guard, url), "{} should be rejected", url);
    }
}

#[test]
fn test_accepts_public_hosts() {
    let guard = UrlGuard::default();

    assert!(guard.check("https://example.com/live.m3u8").is_ok());
    assert!(guard.check("http://172.32.0.1/live.m3u8").is_ok());
    assert!(guard.check("http://[2001:db8::1]/live.m3u8").is_ok());
    assert!(guard.check("http://[::ffff:93.184.216.34]/live.m3u8").is_ok());
    assert_eq!(
        guard.check("  https://cdn.example.com/a.ts  ").unwrap().as_str(),
        "https://cdn.example.com/a.ts"
    );
}

#[test]
fn test_rejects_bad_input() {
    let guard = UrlGuard::default();

    assert!(rejected(&guard, ""));
    assert!(rejected(&guard, "not a url"));
    assert!(rejected(&guard, "ftp://example.com/file"));
    assert!(rejected(&guard, "file:///etc/passwd"));

    match guard.check("") {
        Err(e) => assert_eq!(e.to_string(), "URL parameter is required"),
        Ok(_) => panic!("empty url accepted"),
    }
}

#[test]
fn test_domain_allowlist() {
    let guard = UrlGuard::new(vec!["example.com".to_string(), " .media.test ".to_string()]);

    assert!(guard.check("https://example.com/a.m3u8").is_ok());
    assert!(guard.check("https://cdn.example.com/a.m3u8").is_ok());
    assert!(guard.check("https://edge.media.test/a.m3u8").is_ok());

    assert!(rejected(&guard, "https://badexample.com/a.m3u8"));
    assert!(rejected(&guard, "https://example.com.evil.net/a.m3u8"));
}
