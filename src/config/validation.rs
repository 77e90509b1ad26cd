//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check route shape (leaf has a view, branch has sub-routes, never both)
//! - Validate value ranges (poll timeout > 0, ports valid)
//! - Detect duplicate names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Duplicate route names are warnings; reverse lookups take the first depth-first match

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{AppConfig, RouteConfig};
use crate::routing::RoutePattern;

/// One semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted location, e.g. `routes[1].sub[0].regex`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.poll_timeout_ms == 0 {
        errors.push(ValidationError::new("server.poll_timeout_ms", "must be greater than zero"));
    }

    let mut transport_names = HashSet::new();
    for (i, transport) in config.transports.iter().enumerate() {
        let at = format!("transports[{}]", i);
        if transport.name.is_empty() {
            errors.push(ValidationError::new(format!("{}.name", at), "must not be empty"));
        } else if !transport_names.insert(transport.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", at),
                format!("duplicate transport name {:?}", transport.name),
            ));
        }
        check_address(&mut errors, &format!("{}.inbound", at), &transport.inbound);
        check_address(&mut errors, &format!("{}.outbound", at), &transport.outbound);
        if let Some(control) = &transport.control {
            check_address(&mut errors, &format!("{}.control", at), control);
        }
        if transport.max_frame_bytes == 0 {
            errors.push(ValidationError::new(format!("{}.max_frame_bytes", at), "must be greater than zero"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {:?}", config.observability.metrics_address),
        ));
    }

    validate_routes(&mut errors, "routes", &config.routes);

    for name in duplicate_route_names(&config.routes) {
        tracing::warn!(route = %name, "Duplicate route name; reverse lookups use the first match");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Route names declared more than once anywhere in the tree.
pub fn duplicate_route_names(routes: &[RouteConfig]) -> Vec<String> {
    fn walk<'a>(routes: &'a [RouteConfig], seen: &mut HashSet<&'a str>, dups: &mut Vec<String>) {
        for route in routes {
            if let Some(name) = route.name.as_deref() {
                if !seen.insert(name) && !dups.iter().any(|d| d == name) {
                    dups.push(name.to_string());
                }
            }
            walk(&route.sub, seen, dups);
        }
    }

    let mut dups = Vec::new();
    walk(routes, &mut HashSet::new(), &mut dups);
    dups
}

fn validate_routes(errors: &mut Vec<ValidationError>, at: &str, routes: &[RouteConfig]) {
    for (i, route) in routes.iter().enumerate() {
        let here = format!("{}[{}]", at, i);
        if route.regex.is_empty() {
            errors.push(ValidationError::new(format!("{}.regex", here), "must not be empty"));
        } else if let Err(e) = RoutePattern::new(&route.regex) {
            errors.push(ValidationError::new(format!("{}.regex", here), e.to_string()));
        }

        match (&route.view, route.sub.is_empty()) {
            (None, true) => errors.push(ValidationError::new(&here, "needs a view or sub-routes")),
            (Some(_), false) => errors.push(ValidationError::new(&here, "cannot have both a view and sub-routes")),
            _ => {}
        }
        if route.view.is_none() && (!route.precondition.is_empty() || route.params.is_some()) {
            errors.push(ValidationError::new(&here, "precondition and params apply to leaf routes only"));
        }

        validate_routes(errors, &format!("{}.sub", here), &route.sub);
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, address: &str) {
    let valid = address
        .rsplit_once(':')
        .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
        .unwrap_or(false);
    if !valid {
        errors.push(ValidationError::new(field, format!("expected host:port, got {:?}", address)));
    }
}
