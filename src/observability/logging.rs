//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Configure log level from config, overridable by `RUST_LOG`
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Initialization is fallible and happens once per process

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::ObservabilityError;
use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), ObservabilityError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.log_level)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json().with_current_span(true)).try_init()?,
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init()?,
    }
    Ok(())
}

/// A bare level applies to this crate only; anything else is a full directive.
fn build_filter(level: &str) -> Result<EnvFilter, ObservabilityError> {
    let directive = match level {
        "trace" | "debug" | "info" | "warn" | "error" => format!("handler_dispatch={}", level),
        other => other.to_string(),
    };
    Ok(EnvFilter::try_new(directive)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_targets_crate() {
        let filter = build_filter("debug").unwrap();
        assert!(filter.to_string().contains("handler_dispatch=debug"));
    }

    #[test]
    fn directive_passes_through() {
        assert!(build_filter("warn,handler_dispatch::server=trace").is_ok());
        assert!(build_filter("handler_dispatch=loud").is_err());
    }
}
