//! Shared logging utilities for consistent tracing across all processes

use crate::types::Participant;
use chrono::{DateTime, Utc};
use tracing::{error, info};

/// Initialize tracing subscriber with process-specific configuration
/// Uses the global participant identity that must be initialized first
pub fn init_tracing() {
    init_tracing_with_level(None);
}

/// Initialize tracing with an explicit base log level (trace..error)
pub fn init_tracing_with_level(log_level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let participant = Participant::current();
    let base_level = log_level.unwrap_or("info");

    let env_filter = match participant {
        Participant::Monitor => {
            format!("monitor={base_level},shared={base_level},reqwest=warn,hyper=warn")
        }
        Participant::Http | Participant::Https => {
            format!("shared={base_level}")
        }
    };

    fmt()
        .with_env_filter(EnvFilter::new(&env_filter))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for process-aware info logging
#[macro_export]
macro_rules! process_info {
    ($participant:expr, $($arg:tt)*) => {
        tracing::info!(
            process = %$participant,
            timestamp = shared::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware warning logging
#[macro_export]
macro_rules! process_warn {
    ($participant:expr, $($arg:tt)*) => {
        tracing::warn!(
            process = %$participant,
            timestamp = shared::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware error logging
#[macro_export]
macro_rules! process_error {
    ($participant:expr, $($arg:tt)*) => {
        tracing::error!(
            process = %$participant,
            timestamp = shared::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware debug logging
#[macro_export]
macro_rules! process_debug {
    ($participant:expr, $($arg:tt)*) => {
        tracing::debug!(
            process = %$participant,
            timestamp = shared::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(participant: &Participant, details: &str) {
    info!(
        process = %participant,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(participant: &Participant, reason: &str) {
    info!(
        process = %participant,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(participant: &Participant, context: &str, error: &dyn std::fmt::Display) {
    error!(
        process = %participant,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(participant: &Participant, message: &str) {
    info!(
        process = %participant,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}
