use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

/// Targets that follow `--log-level`. Everything else is capped at warn.
const PLAYERLINK_TARGETS: [&str; 4] = [
    "playerlink",
    "playerlink_client",
    "playerlink_frame",
    "playerlink_transport",
];

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

/// Per-target filter: the playerlink crates log at `level`, other crates
/// at `level` or warn, whichever is quieter.
pub fn log_targets(level: LogLevel) -> Targets {
    let level = level.as_filter();
    PLAYERLINK_TARGETS.iter().fold(
        Targets::new().with_default(level.min(LevelFilter::WARN)),
        |targets, name| targets.with_target(*name, level),
    )
}

/// Install the stderr subscriber. Stdout is reserved for command output.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let targets = log_targets(level);
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);

    let _ = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(layer.with_filter(targets))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(layer.json().with_filter(targets))
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn client_crates_follow_requested_level() {
        let targets = log_targets(LogLevel::Debug);
        assert!(targets.would_enable("playerlink_client::client", &Level::DEBUG));
        assert!(targets.would_enable("playerlink::cmd::watch", &Level::DEBUG));
        assert!(!targets.would_enable("playerlink_frame::reader", &Level::TRACE));
    }

    #[test]
    fn other_crates_are_capped_at_warn() {
        let targets = log_targets(LogLevel::Trace);
        assert!(!targets.would_enable("mio::poll", &Level::DEBUG));
        assert!(targets.would_enable("mio::poll", &Level::WARN));
    }

    #[test]
    fn quieter_levels_apply_everywhere() {
        let targets = log_targets(LogLevel::Error);
        assert!(!targets.would_enable("playerlink_transport::tcp", &Level::WARN));
        assert!(!targets.would_enable("mio::poll", &Level::WARN));
        assert!(targets.would_enable("mio::poll", &Level::ERROR));
    }
}
