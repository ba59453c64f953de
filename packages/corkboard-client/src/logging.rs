/// Logger setup for the client binary.
use std::io::Write;

use log::SetLoggerError;

pub const DEFAULT_FILTER: &str = "info";

fn format_log_line(timestamp_ms: u64, level: log::Level, target: &str, message: &str) -> String {
    format!(
        "{} [{}] [{}] {}",
        timestamp_ms,
        level.as_str(),
        target,
        message.replace('\n', "\\n")
    )
}

/// Install `env_logger` with an `info` default, overridable by `RUST_LOG`.
pub fn init() -> Result<(), SetLoggerError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_FILTER))
        .format(|buf, record| {
            let timestamp_ms = std::time::SystemTime::now()
                .duration_since(std::time::SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64;
            writeln!(
                buf,
                "{}",
                format_log_line(
                    timestamp_ms,
                    record.level(),
                    record.target(),
                    &record.args().to_string()
                )
            )
        })
        .try_init()
}
