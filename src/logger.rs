/* Logger initialization */
use std::{panic, thread};

use tracing::{error, level_filters::LevelFilter};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{AppConfig, CargoEnv};

const LOG_DIRECTORY: &str = "logs";
const LOG_FILE_PREFIX: &str = "daily.log";

pub struct LoggerGuards {
    pub _tracing_guard: WorkerGuard,
    // only there when a dsn was configured
    pub _sentry_guard: Option<sentry::ClientInitGuard>,
}

pub struct Logger {}

impl Logger {
    pub fn init(config: &AppConfig) -> LoggerGuards {
        // development is read off the terminal, production is shipped from the rolling file
        let (non_blocking, guard) = match config.cargo_env {
            CargoEnv::Development => tracing_appender::non_blocking(std::io::stdout()),
            CargoEnv::Production => tracing_appender::non_blocking(
                tracing_appender::rolling::daily(LOG_DIRECTORY, LOG_FILE_PREFIX),
            ),
        };

        let sentry_guard = config
            .sentry_dsn
            .clone()
            .map(|dsn| Self::init_sentry(dsn, config.cargo_env));

        let registry = tracing_subscriber::registry()
            .with(Self::max_level(config.cargo_env))
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking));

        if sentry_guard.is_some() {
            registry.with(sentry_tracing::layer()).init();
        } else {
            registry.init();
        }

        panic::set_hook(Box::new(Self::log_panic));

        LoggerGuards {
            _tracing_guard: guard,
            _sentry_guard: sentry_guard,
        }
    }

    // relay debug logs are one line per pipeline step per request, too loud for a terminal
    fn max_level(cargo_env: CargoEnv) -> LevelFilter {
        match cargo_env {
            CargoEnv::Development => LevelFilter::INFO,
            CargoEnv::Production => LevelFilter::DEBUG,
        }
    }

    fn init_sentry(dsn: String, cargo_env: CargoEnv) -> sentry::ClientInitGuard {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(
                    match cargo_env {
                        CargoEnv::Development => "development",
                        CargoEnv::Production => "production",
                    }
                    .into(),
                ),
                attach_stacktrace: true,
                ..Default::default()
            },
        ))
    }

    fn log_panic(info: &panic::PanicHookInfo<'_>) {
        let thread = thread::current();
        let thread = thread.name().unwrap_or("unknown");

        let msg = match info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match info.payload().downcast_ref::<String>() {
                Some(s) => s.as_str(),
                None => "Box<Any>",
            },
        };

        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        // "notrace - " panics are expected enough that the backtrace is noise
        match msg.strip_prefix("notrace - ") {
            Some(msg) => error!(
                target: "panic", "thread '{}' panicked at '{}': {}",
                thread, msg, location
            ),
            None => error!(
                target: "panic", "thread '{}' panicked at '{}': {}\n{:?}",
                thread,
                msg,
                location,
                backtrace::Backtrace::new()
            ),
        }
    }
}
