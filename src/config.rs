#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum CargoEnv {
    Development,
    Production,
}

/// how the referer table is matched against a target hostname
#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq, Default)]
pub enum RefererMatch {
    /// exact host, then `host == domain` or `host` ends with `.domain`
    #[default]
    Strict,
    /// exact host, then the old loose suffix check in both directions
    Compatible,
}

#[derive(clap::Parser, Clone, Debug)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum, default_value = "development")]
    pub cargo_env: CargoEnv,

    #[clap(long, env, default_value = "0.0.0.0")]
    pub host: String,

    // port that the app will bind to
    #[clap(long, env, default_value = "8080")]
    pub port: u16,

    // the origin rewritten playlists point back at, like https://relay.example.com
    // when it's not set the Host header of each request is used instead
    #[clap(long, env)]
    pub public_url: Option<String>,

    // comma seperated list of browser origins allowed to use the relay, empty means everyone
    #[clap(long, env, value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    // comma seperated list of target domains that can be relayed, empty means every public host
    #[clap(long, env, value_delimiter = ',')]
    pub allowed_domains: Vec<String>,

    #[clap(long, env, default_value = "100")]
    pub rate_limit_max_requests: u32,

    #[clap(long, env, default_value = "60")]
    pub rate_limit_window_seconds: u64,

    // how often expired in-memory rate limit records get dropped
    #[clap(long, env, default_value = "300")]
    pub rate_limit_sweep_seconds: u64,

    // optional, only needed when several relays should share one rate limit budget
    #[clap(long, env)]
    pub redis_url: Option<String>,

    #[clap(long, env, default_value = "30")]
    pub fetch_timeout_seconds: u64,

    #[clap(long, env, default_value = "5")]
    pub max_redirects: usize,

    #[clap(long, env, value_enum, default_value = "strict")]
    pub referer_match: RefererMatch,

    // the rendered backend launches chromium lazily on the first browser request
    #[clap(long, env, default_value_t = true, action = clap::ArgAction::Set)]
    pub browser_enabled: bool,

    // chromium executable, auto detected when empty
    #[clap(long, env)]
    pub browser_path: Option<String>,

    #[clap(long, env, default_value_t = true, action = clap::ArgAction::Set)]
    pub headless: bool,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_seconds)
    }

    /// public url without the trailing slash so endpoint paths can be appended directly
    pub fn public_origin(&self) -> Option<String> {
        self.public_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| url.trim_end_matches('/').to_string())
    }
}

impl Default for AppConfig {
    // same values as the clap defaults, mostly used by tests
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: None,
            allowed_origins: Vec::new(),
            allowed_domains: Vec::new(),
            rate_limit_max_requests: 100,
            rate_limit_window_seconds: 60,
            rate_limit_sweep_seconds: 300,
            redis_url: None,
            fetch_timeout_seconds: 30,
            max_redirects: 5,
            referer_match: RefererMatch::Strict,
            browser_enabled: true,
            browser_path: None,
            headless: true,
            sentry_dsn: None,
        }
    }
}
