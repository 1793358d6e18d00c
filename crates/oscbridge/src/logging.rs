use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Per-crate directives (e.g. `oscbridge_peer=trace,oscbridge_xml=debug`)
/// that override `--log-level`.
pub const LOG_ENV: &str = "OSCBRIDGE_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// `--log-level` everywhere, unless `directives` names something finer.
fn log_filter(level: LogLevel, directives: Option<&str>) -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(level.as_filter().into());
    match directives.map(str::trim) {
        Some(directives) if !directives.is_empty() => builder.parse_lossy(directives),
        _ => builder.parse_lossy(""),
    }
}

/// Logs go to stderr so stdout stays machine-readable.
///
/// Thread names are included: each peer runs on its own named workers.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let directives = std::env::var(LOG_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(level, directives.as_deref()))
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().flatten_event(true).try_init();
        }
    }
}
