//! # Structured Logging Module
//!
//! Environment-aware structured logging for applications embedding the
//! cache. Console output by default; set `CACHEABLE_LOG_FORMAT=json` for one
//! JSON object per event. `RUST_LOG` overrides the environment's default
//! level.

use crate::caching::CacheSource;
use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once and alongside a subscriber installed by the
/// host application; only the first successful installation wins.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = use_json_format();

        let console_layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            json = json,
            "Structured logging initialized"
        );
    });
}

/// Current environment from `CACHEABLE_ENV`, then `APP_ENV`
pub fn get_environment() -> String {
    std::env::var("CACHEABLE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Default log level for an environment
pub fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        "test" => "warn".to_string(),
        _ => "debug".to_string(),
    }
}

fn use_json_format() -> bool {
    std::env::var("CACHEABLE_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for a cached call
pub fn log_cache_operation(
    operation: &str,
    callable: &str,
    source: CacheSource,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        callable = %callable,
        source = %source,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "CACHE_OPERATION"
    );
}
