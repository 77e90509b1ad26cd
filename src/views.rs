//! Built-in views registered by the server binary.
//!
//! - `views::echo` answers with a JSON description of the request it got,
//!   including decoded form fields and uploaded file sizes.
//! - `views::health` reports liveness and the number of tracked client connections.

use http::StatusCode;
use serde_json::{json, Map, Value};

use crate::http::{Reply, Request, Response};
use crate::net::ConnectionTracker;
use crate::routing::{HandlerRegistry, HandlerResult};

pub const ECHO: &str = "views::echo";
pub const HEALTH: &str = "views::health";

pub fn register_builtin(registry: &mut HandlerRegistry, connections: ConnectionTracker) {
    registry
        .register_view(ECHO, echo)
        .register_view(HEALTH, move |_, _, _| health(&connections));
}

pub fn echo(request: &mut Request, groups: &[String], params: Option<&Value>) -> HandlerResult {
    let mut body = Map::new();
    body.insert("request_id".into(), json!(request.request_id.to_string()));
    body.insert("method".into(), json!(request.method));
    body.insert("path".into(), json!(request.path));
    body.insert("groups".into(), json!(groups));
    body.insert("params".into(), params.cloned().unwrap_or(Value::Null));
    body.insert("query".into(), pairs(&request.get));

    if request.has_body() {
        let form = request.form().clone();
        body.insert("form".into(), pairs(&form.fields));
        let files: Map<String, Value> = form
            .files
            .iter()
            .map(|(name, file)| {
                (
                    name.clone(),
                    json!({
                        "filename": file.filename,
                        "content_type": file.content_type,
                        "size": file.size(),
                    }),
                )
            })
            .collect();
        body.insert("files".into(), Value::Object(files));
        if let Some(error) = form.error {
            body.insert("form_error".into(), json!(error));
        }
    }

    Ok(Response::json(StatusCode::OK, &Value::Object(body))?.into())
}

fn health(connections: &ConnectionTracker) -> HandlerResult {
    let body = json!({ "status": "ok", "connections": connections.active_count() });
    Ok(Reply::from(Response::json(StatusCode::OK, &body)?))
}

fn pairs(pairs: &[(String, String)]) -> Value {
    Value::Array(pairs.iter().map(|(k, v)| json!([k, v])).collect())
}
