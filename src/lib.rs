//! Request ingestion and dispatch for handlers behind a message-queue HTTP proxy.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod multipart;
pub mod net;
pub mod observability;
pub mod routing;
pub mod server;
pub mod views;
pub mod wire;

pub use config::AppConfig;
pub use http::{Reply, Request, Response};
pub use lifecycle::Shutdown;
pub use routing::{Dispatcher, HandlerRegistry, Route, RouteTable};
pub use server::Server;
pub use wire::Message;
