//! Named handlers and preconditions referenced from route configuration.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::route::{Gate, Handler, HandlerResult, Precondition};
use crate::config::ViewRef;
use crate::http::Request;

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    views: HashMap<String, Handler>,
    preconditions: HashMap<String, Precondition>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view under a direct key, e.g. `views::echo`.
    pub fn register_view<F>(&mut self, key: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&mut Request, &[String], Option<&Value>) -> HandlerResult + Send + Sync + 'static,
    {
        self.views.insert(key.into(), Arc::new(handler));
        self
    }

    /// Register a view reachable through the `[controller, method]` form.
    pub fn register_method<F>(&mut self, controller: &str, method: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut Request, &[String], Option<&Value>) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_view(method_key(controller, method), handler)
    }

    pub fn register_precondition<F>(&mut self, key: impl Into<String>, precondition: F) -> &mut Self
    where
        F: Fn(&mut Request) -> Gate + Send + Sync + 'static,
    {
        self.preconditions.insert(key.into(), Arc::new(precondition));
        self
    }

    pub fn view(&self, view: &ViewRef) -> Option<Handler> {
        self.views.get(&view.key()).cloned()
    }

    pub fn precondition(&self, key: &str) -> Option<Precondition> {
        self.preconditions.get(key).cloned()
    }

    pub fn view_keys(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .field("preconditions", &self.preconditions.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) fn method_key(controller: &str, method: &str) -> String {
    format!("{}::{}", controller, method)
}
