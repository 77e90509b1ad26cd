//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the handler
//! process. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::routing::registry::method_key;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Event loop settings.
    pub server: ServerConfig,

    /// Proxy connections polled by the loop.
    pub transports: Vec<TransportConfig>,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Ordered, nestable route table.
    pub routes: Vec<RouteConfig>,
}

/// Event loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bounded wait of one poll, in milliseconds.
    pub poll_timeout_ms: u64,

    /// Expose handler error text and tested routes in error bodies.
    pub debug: bool,

    /// Stripped from request paths before matching; prepended by reverse lookups.
    pub url_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 1000,
            debug: false,
            url_prefix: String::new(),
        }
    }
}

/// One upstream proxy connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Identifier for logging.
    pub name: String,

    /// Address frames arrive from (e.g., "127.0.0.1:9997").
    pub inbound: String,

    /// Address replies are pushed to.
    pub outbound: String,

    /// Optional control channel address.
    #[serde(default)]
    pub control: Option<String>,

    /// Largest frame accepted from the proxy, in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_max_frame_bytes() -> usize {
    16 * 1024 * 1024
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Human-readable or JSON lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// One route table record.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Pattern matched at the current position of the path.
    pub regex: String,

    /// Handler for leaf routes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewRef>,

    /// Symbolic name for reverse lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Registry keys of guards run before the view, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub precondition: Vec<String>,

    /// Opaque data passed through to the view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Nested routes matched against the remainder of the path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub: Vec<RouteConfig>,
}

/// How a route names its handler.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ViewRef {
    /// Registry key, e.g. `"views::echo"`.
    Direct(String),
    /// `["controller", "method"]`.
    Method([String; 2]),
}

impl ViewRef {
    /// Registry key this reference resolves through.
    pub fn key(&self) -> String {
        match self {
            ViewRef::Direct(key) => key.clone(),
            ViewRef::Method([controller, method]) => method_key(controller, method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_section_has_only_loop_settings() {
        let value = serde_json::to_value(ServerConfig::default()).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["debug", "poll_timeout_ms", "url_prefix"]);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.poll_timeout_ms, 1000);
        assert!(!config.server.debug);
        assert!(config.transports.is_empty());
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn parses_nested_routes_and_view_forms() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            url_prefix = "/app"

            [[transports]]
            name = "main"
            inbound = "127.0.0.1:9997"
            outbound = "127.0.0.1:9996"

            [observability]
            log_format = "json"

            [[routes]]
            regex = '^/home/(\d+)$'
            view = "views::echo"
            name = "home"
            params = { greeting = "hi" }

            [[routes]]
            regex = "^/blog"

            [[routes.sub]]
            regex = '^/(\d+)$'
            view = ["Blog", "show"]
            precondition = ["auth::login_required"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.url_prefix, "/app");
        assert_eq!(config.transports[0].control, None);
        assert_eq!(config.transports[0].max_frame_bytes, 16 * 1024 * 1024);
        assert_eq!(config.observability.log_format, LogFormat::Json);

        let home = &config.routes[0];
        assert_eq!(home.view, Some(ViewRef::Direct("views::echo".into())));
        assert_eq!(home.params.as_ref().unwrap()["greeting"], "hi");

        let post = &config.routes[1].sub[0];
        assert_eq!(post.view.as_ref().unwrap().key(), "Blog::show");
        assert_eq!(post.precondition, vec!["auth::login_required"]);
    }
}
