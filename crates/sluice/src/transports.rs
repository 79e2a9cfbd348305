//! 🚚 Transports — the part that actually talks to the network. Or pretends to.
//!
//! 🎬 *[the client hands over a request. the transport disappears into the wire.
//! it comes back with a response, or with a story about why it couldn't.]*
//!
//! 🧠 Knowledge graph:
//! - `Transport` trait: one async method, `execute(connection, request)`. The only
//!   suspension point in a request's life is in here.
//! - Connectivity failures come back as `TransportError`. HTTP error statuses come
//!   back as a perfectly normal `Response`. The failover loop only cares about the former.
//! - Concrete impls: `HttpTransport` (reqwest, http + https), `NullTransport`
//!   (no network, echoes the request), `InMemoryTransport` (scripted nodes for tests).
//! - `TransportBackend`: the default transport. Routes each request by the
//!   connection's `TransportKind`. 🦆

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::connection::{Connection, TransportKind};
use crate::error::{ClientError, Result, TransportError};

mod http;
mod in_mem;
mod null;

pub use http::HttpTransport;
pub use in_mem::{Behavior, InMemoryTransport, RecordedCall};
pub use null::NullTransport;

/// 📬 HTTP-ish verbs. Just the ones a search cluster answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            other => Err(ClientError::Configuration(format!(
                "unsupported http method '{other}'"
            ))),
        }
    }
}

/// 📨 One logical request. Connection-agnostic: the same value is replayed on failover.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// 🧭 Path relative to the connection's base URL, e.g. `idx/t/_bulk`.
    pub path: String,
    pub method: Method,
    pub body: Option<String>,
    pub query: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: None,
            query: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// 📬 What came back. Status plus raw body; parse on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 🎯 A 200 with a JSON body. Mostly for tests and the null transport.
    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// 📦 Parse the body. An empty body is an empty object, not an error.
    pub fn data(&self) -> Result<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 💀 The server's complaint, if it made one.
    pub fn error_message(&self) -> Option<String> {
        match self.data() {
            Ok(data) => data.get("error").map(describe_error),
            Err(_) if !self.is_success() => Some(self.body.clone()),
            Err(_) => None,
        }
    }

    pub fn has_error(&self) -> bool {
        !self.is_success() || self.error_message().is_some()
    }

    pub fn is_ok(&self) -> bool {
        !self.has_error()
    }
}

/// 💬 Flatten a server `error` value: strings as-is, `{type, reason}` as `type: reason`.
pub(crate) fn describe_error(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => {
            match (
                fields.get("type").and_then(Value::as_str),
                fields.get("reason").and_then(Value::as_str),
            ) {
                (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
                (None, Some(reason)) => reason.to_string(),
                _ => error.to_string(),
            }
        }
        other => other.to_string(),
    }
}

/// 🚚 Sends one request over one connection. That's the whole job.
///
/// # Contract
/// - `Err(TransportError)` means the exchange did not complete. Drives failover,
///   except `TransportError::Request`: the request itself is unsendable, so it is
///   returned to the caller and no connection is disabled.
/// - `Ok(Response)` for anything the server said, including 4xx/5xx.
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    async fn execute(
        &self,
        connection: &Connection,
        request: &Request,
    ) -> std::result::Result<Response, TransportError>;
}

/// 🎭 The default transport: routes by the connection's `TransportKind`.
#[derive(Debug, Default)]
pub struct TransportBackend {
    http: HttpTransport,
    null: NullTransport,
}

#[async_trait]
impl Transport for TransportBackend {
    async fn execute(
        &self,
        connection: &Connection,
        request: &Request,
    ) -> std::result::Result<Response, TransportError> {
        match connection.transport() {
            TransportKind::Http | TransportKind::Https => {
                self.http.execute(connection, request).await
            }
            TransportKind::Null => self.null.execute(connection, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_an_error_status_is_still_a_response() {
        let response = Response::json(409, &json!({"error": {"type": "version_conflict_engine_exception", "reason": "doc exists"}}));
        assert!(!response.is_success());
        assert!(response.has_error());
        assert_eq!(
            response.error_message().as_deref(),
            Some("version_conflict_engine_exception: doc exists")
        );
    }

    #[test]
    fn the_one_where_an_empty_body_is_an_empty_object() -> anyhow::Result<()> {
        let response = Response::new(200, "");
        assert_eq!(response.data()?, json!({}));
        assert!(response.is_ok());
        Ok(())
    }

    #[test]
    fn the_one_where_plain_text_errors_are_kept_verbatim() {
        let response = Response::new(502, "Bad Gateway");
        assert_eq!(response.error_message().as_deref(), Some("Bad Gateway"));
    }

    #[test]
    fn the_one_where_methods_parse_case_insensitively() -> anyhow::Result<()> {
        assert_eq!("put".parse::<Method>()?, Method::Put);
        assert_eq!(Method::Delete.to_string(), "DELETE");
        assert!("PATCH".parse::<Method>().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_backend_routes_null_connections_away_from_the_network() -> anyhow::Result<()> {
        let connection = Connection::from_config(
            &crate::connection::ConnectionConfig::new("nowhere.invalid", 9200)
                .with_transport(TransportKind::Null),
        )?;
        let request = Request::new(Method::Get, "_cluster/health");
        let response = TransportBackend::default().execute(&connection, &request).await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.data()?["params"]["path"], "_cluster/health");
        Ok(())
    }
}
