use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    fmt::format::{Format, Writer},
    EnvFilter,
};

/// Timestamp format for log lines: "DD Month - HH:MM:SS.micros".
struct CustomTimer;

impl tracing_subscriber::fmt::time::FormatTime for CustomTimer {
    fn format_time(&self, writer: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Local::now();
        write!(writer, "{} - {}", now.format("%d %B"), now.format("%H:%M:%S%.6f"))
    }
}

/// Sets up the global logger with the specified log level.
///
/// Configures tracing with:
/// - Custom timestamp formatting
/// - `RUST_LOG` override support
/// - Level and message display (no target)
/// - Output on stderr, so command output on stdout stays clean
///
/// # Arguments
/// * `log_level` - The minimum log level to display
///
/// # Note
/// If a global logger is already set, this function silently does nothing.
pub fn setup_logger(log_level: LevelFilter) {
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    let format = Format::default().with_timer(CustomTimer).with_level(true).with_target(false);

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .event_format(format)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Sets up the global logger with INFO level.
pub fn setup_info_logger() {
    setup_logger(LevelFilter::INFO);
}
