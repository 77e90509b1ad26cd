//! Request objects built from decoded wire messages.
//!
//! # Responsibilities
//! - Lift a `Message` into a request (method, path, query, cookies, headers)
//! - Generate a unique request ID for tracing
//! - Decode form bodies on first access (urlencoded or multipart)
//! - Hold deferred work to run once the reply has gone out
//!
//! # Design Decisions
//! - The request owns the body handle; dropping the request releases the frame
//! - Multipart files are exposed as byte ranges, read through the handle on demand
//! - A malformed upload yields the parts decoded so far, never an error response

use std::fmt;
use std::io;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::multipart::{FilePart, MultipartDecoder, MultipartError, PartKind};
use crate::net::Outbox;
use crate::wire::message::{Body, BodyHandle, Headers, Message, METHOD};

/// Work queued by a handler to run after its reply has been pushed.
pub type AfterAnswer = Box<dyn FnOnce() + Send>;

/// Decoded form body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pub fields: Vec<(String, String)>,
    pub files: Vec<(String, FilePart)>,
    /// Why decoding stopped early, if it did.
    pub error: Option<String>,
}

impl FormData {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn file(&self, name: &str) -> Option<&FilePart> {
        self.files.iter().find(|(k, _)| k == name).map(|(_, f)| f)
    }
}

pub struct Request {
    pub request_id: Uuid,
    pub sender: String,
    pub conn_id: String,
    pub method: String,
    pub path: String,
    pub uri: String,
    /// Raw query string, without the `?`.
    pub query: String,
    pub headers: Headers,
    /// Decoded query parameters, in order.
    pub get: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    body: Option<BodyHandle>,
    json: Option<Value>,
    form: Option<FormData>,
    after_answer: Vec<AfterAnswer>,
    outbox: Option<Outbox>,
}

impl Request {
    pub fn from_message(mut message: Message) -> Self {
        let method = message.method().to_string();
        let query = message.headers.get("QUERY").unwrap_or_default().to_string();
        let uri = message
            .headers
            .get("URI")
            .map(str::to_string)
            .unwrap_or_else(|| message.path.clone());
        let get = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        let cookies = message
            .headers
            .get_all("cookie")
            .into_iter()
            .flat_map(parse_cookies)
            .collect();

        let (body, json) = match message.take_body() {
            Body::Empty => (None, None),
            Body::Json(value) => (None, Some(value)),
            Body::Stream(handle) => (Some(handle), None),
        };

        Self {
            request_id: Uuid::new_v4(),
            sender: message.sender,
            conn_id: message.conn_id,
            method,
            path: message.path,
            uri,
            query,
            headers: message.headers,
            get,
            cookies,
            body,
            json,
            form: None,
            after_answer: Vec::new(),
            outbox: None,
        }
    }

    /// A request with no connection behind it, for internal dispatch.
    pub fn internal(method: &str, path: &str) -> Self {
        let mut headers = Map::new();
        headers.insert(METHOD.to_string(), Value::String(method.to_string()));
        Self {
            request_id: Uuid::new_v4(),
            sender: String::new(),
            conn_id: String::new(),
            method: method.to_string(),
            path: path.to_string(),
            uri: path.to_string(),
            query: String::new(),
            headers: Headers::new(headers),
            get: Vec::new(),
            cookies: Vec::new(),
            body: None,
            json: None,
            form: None,
            after_answer: Vec::new(),
            outbox: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.get.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Body of a `JSON` control message.
    pub fn json(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn body_mut(&mut self) -> Option<&mut BodyHandle> {
        self.body.as_mut()
    }

    /// Lazily split a multipart body. Part offsets are relative to the start
    /// of the body; the handle is rewound first.
    pub fn multipart(&mut self) -> Result<MultipartDecoder<&mut BodyHandle>, MultipartError> {
        let content_type = self.headers.get("content-type").unwrap_or_default().to_string();
        let body = self
            .body
            .as_mut()
            .ok_or_else(|| MultipartError::MalformedMultipart("request has no body".to_string()))?;
        io::Seek::rewind(body)?;
        MultipartDecoder::new(body, &content_type)
    }

    /// Decoded form body, computed on first access.
    pub fn form(&mut self) -> &FormData {
        let form = match self.form.take() {
            Some(form) => form,
            None => self.decode_form(),
        };
        self.form.insert(form)
    }

    /// POSTed field value.
    pub fn post(&mut self, name: &str) -> Option<&str> {
        self.form().field(name)
    }

    /// Read an uploaded file's bytes. The body position is left untouched.
    pub fn read_file(&mut self, file: &FilePart) -> io::Result<Vec<u8>> {
        match self.body.as_mut() {
            Some(body) => file.read_from(body),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "request has no body")),
        }
    }

    /// Queue work to run once the reply has been sent.
    pub fn after_answer<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.after_answer.push(Box::new(f));
    }

    /// Give the handler a way to answer after returning `Reply::Deferred`.
    pub fn attach_outbox(&mut self, outbox: Outbox) {
        self.outbox = Some(outbox);
    }

    /// Handle for replying out-of-band. Set for requests served by the loop.
    pub fn outbox(&self) -> Option<&Outbox> {
        self.outbox.as_ref()
    }

    pub fn take_after_answer(&mut self) -> Vec<AfterAnswer> {
        std::mem::take(&mut self.after_answer)
    }

    fn decode_form(&mut self) -> FormData {
        let content_type = self.headers.get("content-type").unwrap_or_default().to_ascii_lowercase();
        let mut form = FormData::default();

        if content_type.starts_with("multipart/") {
            match self.multipart() {
                Ok(mut decoder) => {
                    for part in decoder.by_ref() {
                        match part.kind {
                            PartKind::Field(value) => form.fields.push((part.name, value)),
                            PartKind::File(file) => form.files.push((part.name, file)),
                        }
                    }
                    form.error = decoder.error().map(ToString::to_string);
                }
                Err(e) => form.error = Some(e.to_string()),
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            if let Some(body) = self.body.as_ref() {
                match body.read_range(0..body.len()) {
                    Ok(bytes) => {
                        form.fields = url::form_urlencoded::parse(&bytes).into_owned().collect();
                    }
                    Err(e) => form.error = Some(e.to_string()),
                }
            }
        }

        if let Some(error) = &form.error {
            tracing::debug!(request_id = %self.request_id, error = %error, "Form body only partially decoded");
        }
        form
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("request_id", &self.request_id)
            .field("sender", &self.sender)
            .field("conn_id", &self.conn_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("has_body", &self.body.is_some())
            .field("after_answer", &self.after_answer.len())
            .finish()
    }
}

fn parse_cookies(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}
