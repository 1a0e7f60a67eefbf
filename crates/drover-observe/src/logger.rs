use thiserror::Error;
use time::{format_description::well_known::Rfc3339, UtcOffset};
use tracing::Subscriber;
use tracing_subscriber::{
    fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Output format for the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Level directive, e.g. `"info"` or `"info,drover_engine=debug"`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || atty::is(atty::Stream::Stdout);
        Self {
            format: LogFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogInitError {
    #[error("invalid log level directive: {0}")]
    InvalidLevel(String),

    #[error("logging already initialized")]
    AlreadyInitialized,

    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Install the process-wide subscriber. Call once, before anything logs.
pub fn init_logging(cfg: &LogConfig) -> Result<(), LogInitError> {
    let filter = EnvFilter::try_new(&cfg.level)
        .map_err(|_| LogInitError::InvalidLevel(cfg.level.clone()))?;

    match cfg.format {
        LogFormat::Text => {
            let layer = fmt::layer()
                .with_ansi(cfg.use_color)
                .with_target(cfg.with_targets)
                .with_timer(timer());
            install(tracing_subscriber::registry().with(filter).with(layer))
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(cfg.with_targets)
                .with_timer(timer());
            install(tracing_subscriber::registry().with(filter).with(layer))
        }
    }
}

fn timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn install<S>(subscriber: S) -> Result<(), LogInitError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber.try_init().map_err(|e| {
        let text = e.to_string();
        if text.contains("SetGlobalDefaultError") {
            LogInitError::AlreadyInitialized
        } else {
            LogInitError::InitFailed(text)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names() {
        assert_eq!(LogFormat::from_name("text"), Some(LogFormat::Text));
        assert_eq!(LogFormat::from_name("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::from_name("journald"), None);
    }

    #[test]
    fn bad_level_is_rejected() {
        let cfg = LogConfig {
            level: "not a directive!!".into(),
            ..Default::default()
        };
        assert!(matches!(
            init_logging(&cfg),
            Err(LogInitError::InvalidLevel(_))
        ));
    }
}
