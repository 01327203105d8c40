use anyhow::Result;
use std::io::{self, IsTerminal};
use sgsync_config::LoggingConfig;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Verbosity to filter directives. RUST_LOG wins unless quiet.
fn build_filter(verbose_level: u8, quiet: bool, configured_level: &str) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }
    let default = match verbose_level {
        0 => configured_level,
        // -v: debug, but keep the HTTP connection chatter out
        1 => "debug,hyper::proto::h1=warn,hyper::client::pool=warn",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// RUST_LOG_JSON decides when set; otherwise JSON when configured or when
/// stdout is not a terminal.
fn json_format(env_value: Option<&str>, configured: bool, stdout_is_terminal: bool) -> bool {
    match env_value {
        Some(value) => value == "true",
        None => configured || !stdout_is_terminal,
    }
}

fn json_requested(configured: bool) -> bool {
    let env_value = std::env::var("RUST_LOG_JSON").ok();
    json_format(env_value.as_deref(), configured, io::stdout().is_terminal())
}

/// Rotation prefix for a log path: `sgsync.log` rotates as `sgsync.2026-01-17`.
fn rotation_prefix(log_path: &Path) -> Result<(&Path, &str)> {
    let log_dir = log_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Log file path has no parent directory"))?;
    let log_filename = log_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid log filename"))?;
    let prefix = log_filename.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(log_filename);
    Ok((log_dir, prefix))
}

/// Logs go to stderr, or to a daily rotated file when `log_file` is given.
/// RUST_LOG and RUST_LOG_JSON override the configured level and format.
pub fn init_logging_with_file(
    verbose_level: u8,
    quiet: bool,
    log_file: Option<&Path>,
    config: &LoggingConfig,
) -> Result<()> {
    let filter = build_filter(verbose_level, quiet, &config.level);
    let json = json_requested(config.json);
    let registry = Registry::default().with(filter);

    if let Some(log_path) = log_file {
        let (log_dir, prefix) = rotation_prefix(log_path)?;
        std::fs::create_dir_all(log_dir)?;
        let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, prefix);

        if json {
            let json_layer = fmt::layer()
                .json()
                .with_timer(ChronoUtc::rfc_3339())
                .with_writer(file_appender);
            registry.with(json_layer).try_init()?;
        } else {
            let fmt_layer = fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .with_writer(file_appender);
            registry.with(fmt_layer).try_init()?;
        }
    } else if json {
        let json_layer = fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(io::stderr);
        registry.with(json_layer).try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(io::stderr);
        registry.with(fmt_layer).try_init()?;
    }

    Ok(())
}
