//! The dispatch boundary: one request in, one reply out.
//!
//! Every failure below this point is turned into a response here. Unmatched
//! paths become 404s; handler errors and panics become 500s. Nothing
//! propagates to the server loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::route::{Gate, HandlerError, LeafRoute};
use super::table::RouteTable;
use crate::http::{Reply, Request, Response};
use crate::wire::Message;

/// Called with every disconnect notification.
pub type DisconnectHook = Arc<dyn Fn(&Message) + Send + Sync>;

pub struct Dispatcher {
    table: Arc<RouteTable>,
    debug: bool,
    on_disconnect: Option<DisconnectHook>,
}

impl Dispatcher {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: Arc::new(table),
            debug: false,
            on_disconnect: None,
        }
    }

    /// Show error text and tested patterns in error bodies.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_disconnect_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(hook));
        self
    }

    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    /// Swap in a new route generation. Takes effect on the next dispatch.
    pub fn replace_table(&mut self, table: RouteTable) {
        self.table = Arc::new(table);
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn dispatch(&self, request: &mut Request) -> Reply {
        self.dispatch_labeled(request).0
    }

    /// Like `dispatch`, also returning the matched route's label.
    pub fn dispatch_labeled(&self, request: &mut Request) -> (Reply, Option<String>) {
        let table = Arc::clone(&self.table);
        let found = match table.find(&request.path) {
            Ok(found) => found,
            Err(missing) => {
                tracing::debug!(path = %missing.path, tested = missing.tested.len(), "No route matched");
                let detail = self.debug.then(|| {
                    format!("{}\n\ntested:\n{}", missing.path, missing.tested.join("\n"))
                });
                return (Response::not_found(detail.as_deref()).into(), None);
            }
        };

        let route = found.route;
        let label = Some(route.label().to_string());
        let outcome = catch_unwind(AssertUnwindSafe(|| send(route, &found.groups, request)));
        let error = match outcome {
            Ok(Ok(reply)) => return (reply, label),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };

        tracing::error!(
            request_id = %request.request_id,
            route = %route.label(),
            view = %route.view(),
            error = %error,
            "Handler failed"
        );
        let detail = self.debug.then_some(error.as_str());
        (Response::server_error(detail).into(), label)
    }

    /// Surface a disconnect notification. Never answered.
    pub fn disconnect(&self, message: &Message) {
        tracing::debug!(sender = %message.sender, conn_id = %message.conn_id, "Client disconnected");
        if let Some(hook) = &self.on_disconnect {
            if catch_unwind(AssertUnwindSafe(|| hook(message))).is_err() {
                tracing::error!(conn_id = %message.conn_id, "Disconnect hook panicked");
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("table", &self.table)
            .field("debug", &self.debug)
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}

/// Run preconditions in order, then the handler.
pub fn send(route: &LeafRoute, groups: &[String], request: &mut Request) -> Result<Reply, HandlerError> {
    for (label, precondition) in &route.preconditions {
        if let Gate::Respond(response) = precondition(request) {
            tracing::debug!(precondition = %label, route = %route.label(), "Precondition answered");
            return Ok(response.into());
        }
    }
    (route.handler)(request, groups, route.params())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
