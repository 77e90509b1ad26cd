//! Route tree nodes.
//!
//! A route is either a leaf bound to a handler or a branch that consumes a
//! path prefix and hands the remainder to its children. Trees are built once
//! and never mutated afterwards.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::pattern::RoutePattern;
use super::RouteError;
use crate::http::{Reply, Request, Response};

/// Error type handlers may fail with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = Result<Reply, HandlerError>;

/// A view: `(request, captured groups, static params) -> reply`.
pub type Handler = Arc<dyn Fn(&mut Request, &[String], Option<&Value>) -> HandlerResult + Send + Sync>;

/// Guard run before a handler.
pub type Precondition = Arc<dyn Fn(&mut Request) -> Gate + Send + Sync>;

/// Outcome of a precondition.
#[derive(Debug)]
pub enum Gate {
    /// Let dispatch proceed to the next precondition or the handler.
    Continue,
    /// Stop here and send this response instead.
    Respond(Response),
}

pub enum Route {
    Leaf(LeafRoute),
    Branch(BranchRoute),
}

impl Route {
    /// A leaf bound to `handler`.
    pub fn leaf<F>(pattern: &str, handler: F) -> Result<LeafRoute, RouteError>
    where
        F: Fn(&mut Request, &[String], Option<&Value>) -> HandlerResult + Send + Sync + 'static,
    {
        Ok(LeafRoute::new(compile(pattern)?, Arc::new(handler), pattern.to_string()))
    }

    /// A sub-tree mounted under `pattern`.
    pub fn branch(pattern: &str, children: Vec<Route>) -> Result<Route, RouteError> {
        Ok(Route::Branch(BranchRoute {
            pattern: compile(pattern)?,
            children,
        }))
    }

    pub fn pattern(&self) -> &RoutePattern {
        match self {
            Route::Leaf(leaf) => &leaf.pattern,
            Route::Branch(branch) => &branch.pattern,
        }
    }
}

impl From<LeafRoute> for Route {
    fn from(leaf: LeafRoute) -> Self {
        Route::Leaf(leaf)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Leaf(leaf) => leaf.fmt(f),
            Route::Branch(branch) => branch.fmt(f),
        }
    }
}

pub struct LeafRoute {
    pub(crate) pattern: RoutePattern,
    pub(crate) handler: Handler,
    /// Registry key or pattern, used in logs.
    pub(crate) view: String,
    pub(crate) name: Option<String>,
    pub(crate) preconditions: Vec<(String, Precondition)>,
    pub(crate) params: Option<Value>,
}

impl LeafRoute {
    pub(crate) fn new(pattern: RoutePattern, handler: Handler, view: String) -> Self {
        Self {
            pattern,
            handler,
            view,
            name: None,
            preconditions: Vec::new(),
            params: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_precondition<F>(mut self, label: impl Into<String>, precondition: F) -> Self
    where
        F: Fn(&mut Request) -> Gate + Send + Sync + 'static,
    {
        self.preconditions.push((label.into(), Arc::new(precondition)));
        self
    }

    pub(crate) fn push_precondition(&mut self, label: String, precondition: Precondition) {
        self.preconditions.push((label, precondition));
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn params(&self) -> Option<&Value> {
        self.params.as_ref()
    }

    /// Label for logs and metrics: the route name, else its pattern.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.pattern.source())
    }
}

impl fmt::Debug for LeafRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafRoute")
            .field("pattern", &self.pattern.source())
            .field("view", &self.view)
            .field("name", &self.name)
            .field(
                "preconditions",
                &self.preconditions.iter().map(|(label, _)| label).collect::<Vec<_>>(),
            )
            .field("params", &self.params)
            .finish()
    }
}

pub struct BranchRoute {
    pub(crate) pattern: RoutePattern,
    pub(crate) children: Vec<Route>,
}

impl BranchRoute {
    pub fn children(&self) -> &[Route] {
        &self.children
    }
}

impl fmt::Debug for BranchRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchRoute")
            .field("pattern", &self.pattern.source())
            .field("children", &self.children)
            .finish()
    }
}

pub(crate) fn compile(pattern: &str) -> Result<RoutePattern, RouteError> {
    RoutePattern::new(pattern).map_err(|source| RouteError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
