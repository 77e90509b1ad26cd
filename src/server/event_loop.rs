//! The polling loop.
//!
//! One frame at a time: wait (bounded) for any transport to produce a frame,
//! parse it, dispatch it to completion, push the reply, run the request's
//! deferred work, release the request. Nothing from one iteration survives
//! into the next except the route table, the connection tracker and the
//! outbox queue.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::future::select_all;
use tokio::sync::mpsc;
use tracing::Instrument;

use super::ServerError;
use crate::config::RouteConfig;
use crate::http::{Reply, Request};
use crate::lifecycle::Shutdown;
use crate::net::{ClientKey, ConnectionTracker, Outbox, Outgoing, Transport};
use crate::observability::metrics;
use crate::routing::{Dispatcher, HandlerRegistry, RouteTable};
use crate::wire::{reply, Message};

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Source of new route generations.
struct RouteReload {
    registry: HandlerRegistry,
    prefix: String,
    updates: mpsc::UnboundedReceiver<Vec<RouteConfig>>,
}

/// What woke the loop up.
enum Wake {
    Frame(usize, Option<Bytes>),
    Outgoing(Outgoing),
    Idle,
}

pub struct Server<T> {
    transports: Vec<T>,
    dispatcher: Dispatcher,
    shutdown: Shutdown,
    connections: ConnectionTracker,
    poll_timeout: Duration,
    idle_timeout: Duration,
    reload: Option<RouteReload>,
    outbox: Outbox,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,
    /// Transport name each proxy sender was last seen on.
    proxies: HashMap<String, String>,
}

impl<T: Transport> Server<T> {
    pub fn new(transports: Vec<T>, dispatcher: Dispatcher, shutdown: Shutdown) -> Self {
        let (outbox, outgoing) = Outbox::channel();
        Self {
            transports,
            dispatcher,
            shutdown,
            connections: ConnectionTracker::new(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            reload: None,
            outbox,
            outgoing,
            proxies: HashMap::new(),
        }
    }

    /// Bounded wait of one poll. Housekeeping runs at least this often,
    /// whether or not frames are arriving.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Client connections silent for longer than this are forgotten.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Share a tracker, e.g. with a view reporting live connections.
    pub fn with_connections(mut self, connections: ConnectionTracker) -> Self {
        self.connections = connections;
        self
    }

    /// Rebuild the route table from each route list received on `updates`.
    pub fn with_route_reload(
        mut self,
        registry: HandlerRegistry,
        prefix: impl Into<String>,
        updates: mpsc::UnboundedReceiver<Vec<RouteConfig>>,
    ) -> Self {
        self.reload = Some(RouteReload {
            registry,
            prefix: prefix.into(),
            updates,
        });
        self
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    /// Handle for out-of-band replies; every request served also carries one.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Run until shutdown or until every transport has closed.
    pub async fn run(mut self) -> Result<(), ServerError> {
        if self.transports.is_empty() {
            return Err(ServerError::NoTransports);
        }
        let mut shutdown_rx = self.shutdown.subscribe();
        let poll_timeout = self.poll_timeout;
        let mut last_housekeeping = Instant::now();

        tracing::info!(
            transports = self.transports.len(),
            poll_timeout_ms = poll_timeout.as_millis() as u64,
            "Server loop starting"
        );

        while !self.shutdown.is_triggered() {
            self.apply_reloads();

            let wake = tokio::select! {
                _ = shutdown_rx.recv() => break,
                Some(outgoing) = self.outgoing.recv() => Wake::Outgoing(outgoing),
                polled = tokio::time::timeout(poll_timeout, poll_inbound(&mut self.transports)) => match polled {
                    Ok((index, frame)) => Wake::Frame(index, frame),
                    Err(_elapsed) => Wake::Idle,
                },
            };

            match wake {
                Wake::Frame(index, Some(frame)) => self.handle_frame(index, frame).await,
                Wake::Frame(index, None) => {
                    let closed = self.transports.remove(index);
                    tracing::warn!(transport = %closed.name(), "Transport closed");
                    if self.transports.is_empty() {
                        tracing::info!("All transports closed");
                        break;
                    }
                }
                Wake::Outgoing(outgoing) => self.push_outgoing(outgoing).await,
                Wake::Idle => {}
            }

            if last_housekeeping.elapsed() >= poll_timeout {
                self.housekeeping();
                last_housekeeping = Instant::now();
            }
        }

        tracing::info!("Server loop stopped");
        Ok(())
    }

    async fn handle_frame(&mut self, index: usize, frame: Bytes) {
        let started = Instant::now();
        let transport = &mut self.transports[index];

        let message = match Message::parse(frame) {
            Ok(message) => message,
            Err(e) => {
                metrics::record_framing_error(transport.name());
                tracing::warn!(transport = %transport.name(), error = %e, "Dropping malformed frame");
                return;
            }
        };

        if self.proxies.get(&message.sender).map(String::as_str) != Some(transport.name()) {
            self.proxies.insert(message.sender.clone(), transport.name().to_string());
        }

        let key = ClientKey::new(message.sender.as_str(), message.conn_id.as_str());
        if message.is_disconnect() {
            metrics::record_disconnect();
            self.connections.close(&key);
            self.dispatcher.disconnect(&message);
            return;
        }
        self.connections.touch(key);

        let mut request = Request::from_message(message);
        request.attach_outbox(self.outbox.clone());
        let span = tracing::info_span!(
            "request",
            request_id = %request.request_id,
            sender = %request.sender,
            conn_id = %request.conn_id,
            method = %request.method,
            path = %request.path,
        );

        let (outcome, route) = span.in_scope(|| self.dispatcher.dispatch_labeled(&mut request));
        let deferred_work = request.take_after_answer();
        let status = metrics::status_label(&outcome);

        match outcome {
            Reply::Respond(response) => {
                let frame = reply::reply(&request.sender, &request.conn_id, &response.to_http_bytes());
                if let Err(e) = transport.send(frame).instrument(span.clone()).await {
                    tracing::error!(parent: &span, transport = %transport.name(), error = %e, "Failed to send reply");
                }
            }
            Reply::Deferred => {
                tracing::debug!(parent: &span, "Reply deferred by handler");
            }
        }

        let elapsed = started.elapsed();
        metrics::record_request(&request.method, &status, route.as_deref().unwrap_or("none"), elapsed);
        tracing::info!(parent: &span, status = %status, elapsed_ms = elapsed.as_millis() as u64, "Request completed");

        // The body buffer goes with the request, before any deferred work runs.
        drop(request);

        for work in deferred_work {
            if catch_unwind(AssertUnwindSafe(work)).is_err() {
                tracing::error!(parent: &span, "After-answer task panicked");
            }
        }
    }

    /// Push a queued delivery to the transport its proxy was last seen on,
    /// or to every transport when that is unknown or gone.
    async fn push_outgoing(&mut self, outgoing: Outgoing) {
        let frames = reply::deliver(&outgoing.sender, &outgoing.conn_ids, &outgoing.payload);
        let known = self
            .proxies
            .get(&outgoing.sender)
            .filter(|name| self.transports.iter().any(|t| t.name() == name.as_str()));

        for transport in self.transports.iter_mut() {
            if known.is_some_and(|name| transport.name() != name.as_str()) {
                continue;
            }
            for frame in &frames {
                if let Err(e) = transport.send(frame.clone()).await {
                    tracing::error!(
                        transport = %transport.name(),
                        sender = %outgoing.sender,
                        error = %e,
                        "Failed to push out-of-band reply"
                    );
                    break;
                }
            }
        }

        metrics::record_outbox_frames(frames.len());
        tracing::debug!(
            sender = %outgoing.sender,
            connections = outgoing.conn_ids.len(),
            frames = frames.len(),
            close = outgoing.payload.is_empty(),
            "Out-of-band reply pushed"
        );
    }

    fn apply_reloads(&mut self) {
        let Some(reload) = self.reload.as_mut() else {
            return;
        };
        let mut latest = None;
        while let Ok(routes) = reload.updates.try_recv() {
            latest = Some(routes);
        }
        let Some(routes) = latest else {
            return;
        };

        match RouteTable::from_config(&routes, &reload.registry) {
            Ok(table) => {
                self.dispatcher.replace_table(table.with_prefix(reload.prefix.clone()));
                metrics::record_reload(true);
                tracing::info!(routes = routes.len(), "Route table reloaded");
            }
            Err(e) => {
                metrics::record_reload(false);
                tracing::error!(error = %e, "Route reload rejected; keeping current table");
            }
        }
    }

    fn housekeeping(&mut self) {
        let pruned = self.connections.prune_idle(self.idle_timeout);
        if pruned > 0 {
            tracing::debug!(pruned, active = self.connections.active_count(), "Pruned idle client connections");
        }
    }
}

/// Wait for the first transport to yield. `transports` must not be empty.
async fn poll_inbound<T: Transport>(transports: &mut [T]) -> (usize, Option<Bytes>) {
    let polls = transports.iter_mut().map(|t| Box::pin(t.recv()));
    let (frame, index, _pending) = select_all(polls).await;
    (index, frame)
}
