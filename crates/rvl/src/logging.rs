use rvl_engine::LogLevel;
use tracing::level_filters::LevelFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Host-side verbosity. Wider than the engine's [`LogLevel`], and the only
/// mapping onto `tracing` filters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogFilter {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogFilter {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogFilter::Error => LevelFilter::ERROR,
            LogFilter::Warn => LevelFilter::WARN,
            LogFilter::Info => LevelFilter::INFO,
            LogFilter::Debug => LevelFilter::DEBUG,
            LogFilter::Trace => LevelFilter::TRACE,
        }
    }
}

impl From<LogLevel> for LogFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LogFilter::Error,
            LogLevel::Info => LogFilter::Info,
            LogLevel::Debug => LogFilter::Debug,
        }
    }
}

/// Install a stderr subscriber. Does nothing if one is already installed.
///
/// Accepts a host [`LogFilter`] or an engine [`LogLevel`].
pub fn init_logging(format: LogFormat, filter: impl Into<LogFilter>) {
    let filter: LogFilter = filter.into();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(filter.as_filter())
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_levels_map_to_filters() {
        assert_eq!(LogFilter::from(LogLevel::Error), LogFilter::Error);
        assert_eq!(LogFilter::from(LogLevel::Info), LogFilter::Info);
        assert_eq!(LogFilter::from(LogLevel::Debug).as_filter(), LevelFilter::DEBUG);
        assert_eq!(LogFilter::Trace.as_filter(), LevelFilter::TRACE);
    }

    #[test]
    fn init_is_idempotent() {
        init_logging(LogFormat::Text, LogFilter::Warn);
        init_logging(LogFormat::Json, LogLevel::Debug);
        tracing::warn!("still logging");
    }
}
