use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// File rotation period, from the `rotation` config key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Hourly,
    Daily,
    Never,
}

impl Rotation {
    /// Unknown values fall back to a single never-rotated file
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "hourly" => Rotation::Hourly,
            "daily" => Rotation::Daily,
            _ => Rotation::Never,
        }
    }

    fn appender(self, config: &AppConfig) -> RollingFileAppender {
        let (dir, file) = (&config.log_dir, &config.log_file);
        match self {
            Rotation::Hourly => tracing_appender::rolling::hourly(dir, file),
            Rotation::Daily => tracing_appender::rolling::daily(dir, file),
            Rotation::Never => tracing_appender::rolling::never(dir, file),
        }
    }
}

/// Configured level plus quiet defaults for chatty dependencies
fn filter_directives(log_level: &str) -> String {
    format!("{log_level},sqlx=warn,hyper=warn,reqwest=warn")
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides the configured level. Keep the returned guard alive
/// until exit or buffered lines are lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = Rotation::parse(&config.rotation).appender(config);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    tracing::debug!(
        rotation = ?Rotation::parse(&config.rotation),
        masked = config.mask_sensitive_logs,
        "Logging initialised"
    );
    guard
}
