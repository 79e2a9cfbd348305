//! # 📡 THE HTTP TRANSPORT
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! The monitoring dashboard glows amber in the dark. One node of three has stopped
//! answering. The other two are fine. The client doesn't know that yet. It is about
//! to find out, one refused connection at a time.
//!
//! 🚀 This module sends requests into the elastic void over reqwest, and classifies
//! whatever comes back: a response (any status, even the sad ones) or a
//! `TransportError` (the wire itself gave up). The failover loop upstream only
//! reacts to the second kind.
//!
//! 🧠 Knowledge graph:
//! - reqwest only takes `connect_timeout` and idle-pool settings on the *builder*, so
//!   we cache one `reqwest::Client` per `(connect_timeout, persistent)` pair.
//!   The whole-request timeout is per request, straight from the connection.
//! - `_bulk` paths get `application/x-ndjson`. Everything else gets `application/json`.
//! - `compression = true` gzips the body with flate2 and says so in `Content-Encoding`.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

use std::collections::HashMap;
use std::error::Error as StdError;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::Url;
use tracing::{debug, trace};

use super::{Method, Request, Response, Transport};
use crate::connection::Connection;
use crate::error::TransportError;

type ClientKey = (Option<Duration>, bool);

/// 📡 reqwest-backed transport for `http` and `https` connections.
#[derive(Debug, Default)]
pub struct HttpTransport {
    // 🔧 one reqwest::Client per builder-only knob combination. reqwest::Client is an
    // Arc inside, so handing out clones is cheap.
    clients: Mutex<HashMap<ClientKey, reqwest::Client>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_for(&self, connection: &Connection) -> Result<reqwest::Client, TransportError> {
        let key = (connection.connect_timeout(), connection.persistent());
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder();
        if let Some(connect_timeout) = key.0 {
            builder = builder.connect_timeout(connect_timeout);
        }
        if !key.1 {
            // 🔄 non-persistent: no idle sockets kept between requests
            builder = builder.pool_max_idle_per_host(0);
        }
        let client = builder.build().map_err(|e| {
            TransportError::Request(format!(
                "💀 The HTTP client refused to be born. Probably a missing TLS cert or a cursed system setup: {}",
                error_chain(&e)
            ))
        })?;
        debug!(
            "🏗️ Built a reqwest client for connect_timeout={:?}, persistent={}",
            key.0, key.1
        );
        clients.insert(key, client.clone());
        Ok(client)
    }
}

/// 🧭 `base_url/path?query`, with exactly one slash between base and path.
pub(crate) fn build_url(connection: &Connection, request: &Request) -> Result<Url, TransportError> {
    let raw = format!(
        "{}/{}",
        connection.base_url(),
        request.path.trim_start_matches('/')
    );
    let mut url = Url::parse(&raw).map_err(|e| {
        TransportError::Connect(format!("'{raw}' is not a usable URL: {e}"))
    })?;
    if !request.query.is_empty() {
        url.query_pairs_mut().extend_pairs(request.query.iter());
    }
    Ok(url)
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}

// 📡 NDJSON for the bulk endpoint, plain JSON for everything else.
fn content_type_for(path: &str) -> &'static str {
    if path.trim_end_matches('/').ends_with("_bulk") {
        "application/x-ndjson"
    } else {
        "application/json"
    }
}

fn gzip(body: &str) -> Result<Vec<u8>, TransportError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(body.as_bytes())
        .map_err(|e| TransportError::Request(format!("gzip of request body failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| TransportError::Request(format!("gzip of request body failed: {e}")))
}

// 🧅 reqwest's top-level Display is terse. The juicy part is down the source chain.
fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// 🔍 did an actual socket give up somewhere down the chain?
fn has_io_cause(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        if cause.is::<std::io::Error>() {
            return true;
        }
        source = cause.source();
    }
    false
}

fn classify(error: reqwest::Error) -> TransportError {
    let message = error_chain(&error);
    if error.is_timeout() {
        TransportError::Timeout(message)
    } else if error.is_connect() {
        TransportError::Connect(message)
    } else if error.is_builder() || (error.is_request() && !has_io_cause(&error)) {
        // 🧾 the request was malformed before any node got a say
        TransportError::Request(message)
    } else {
        TransportError::Io(message)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        connection: &Connection,
        request: &Request,
    ) -> Result<Response, TransportError> {
        let client = self.client_for(connection)?;
        let url = build_url(connection, request)?;
        trace!("📡 {} {}", request.method, url);

        let mut builder = client
            .request(to_reqwest_method(request.method), url)
            .timeout(connection.timeout())
            .header("Content-Type", content_type_for(&request.path));

        for (name, value) in connection.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            builder = if connection.compression() {
                builder
                    .header("Content-Encoding", "gzip")
                    .body(gzip(body)?)
            } else {
                builder.body(body.clone())
            };
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        // 💀 a body that dies mid-read is a connectivity failure too, the exchange never completed
        let body = response.text().await.map_err(classify)?;
        trace!("📬 {} answered {} ({} bytes)", connection, status, body.len());

        Ok(Response::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionConfig, TransportKind};
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connection_to(server: &MockServer) -> Connection {
        let address = server.address();
        Connection::new(address.ip().to_string(), address.port()).expect("valid mock connection")
    }

    #[test]
    fn the_one_where_urls_get_exactly_one_slash() -> anyhow::Result<()> {
        let mut config = ConnectionConfig::new("es-1", 9200).with_transport(TransportKind::Https);
        config.path = Some("proxy".to_string());
        let connection = Connection::from_config(&config)?;
        let request = Request::new(Method::Put, "/idx/t/_bulk").with_query("refresh", "true");
        let url = build_url(&connection, &request)?;
        assert_eq!(url.as_str(), "https://es-1:9200/proxy/idx/t/_bulk?refresh=true");
        Ok(())
    }

    #[test]
    fn the_one_where_bulk_gets_its_special_content_type() {
        assert_eq!(content_type_for("idx/_bulk"), "application/x-ndjson");
        assert_eq!(content_type_for("_bulk"), "application/x-ndjson");
        assert_eq!(content_type_for("idx/_search"), "application/json");
    }

    #[tokio::test]
    async fn the_one_where_the_bulk_body_lands_with_the_right_headers() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/idx/_bulk"))
            .and(query_param("refresh", "true"))
            .and(header("content-type", "application/x-ndjson"))
            .and(body_string("{\"delete\":{\"_id\":\"1\"}}\n"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"took": 1, "items": []})))
            .expect(1)
            .mount(&server)
            .await;

        let request = Request::new(Method::Put, "idx/_bulk")
            .with_body("{\"delete\":{\"_id\":\"1\"}}\n")
            .with_query("refresh", "true");
        let response = HttpTransport::new()
            .execute(&connection_to(&server), &request)
            .await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.data()?["took"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_500_is_a_response_not_a_failover() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("{\"error\":\"boom\"}"))
            .mount(&server)
            .await;

        let response = HttpTransport::new()
            .execute(&connection_to(&server), &Request::new(Method::Get, ""))
            .await?;
        assert_eq!(response.status(), 500);
        assert_eq!(response.error_message().as_deref(), Some("boom"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_connection_headers_tag_along() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-tenant", "blue"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let address = server.address();
        let mut config = ConnectionConfig::new(address.ip().to_string(), address.port());
        config.headers.insert("x-tenant".to_string(), "blue".to_string());
        let response = HttpTransport::new()
            .execute(&Connection::from_config(&config)?, &Request::new(Method::Get, ""))
            .await?;
        assert_eq!(response.status(), 200);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_compression_announces_itself() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-encoding", "gzip"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let address = server.address();
        let mut config = ConnectionConfig::new(address.ip().to_string(), address.port());
        config.compression = true;
        let request = Request::new(Method::Post, "idx/_search").with_body("{\"query\":{}}");
        let response = HttpTransport::new()
            .execute(&Connection::from_config(&config)?, &request)
            .await?;
        assert_eq!(response.status(), 200);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_closed_port_is_a_connect_error() -> anyhow::Result<()> {
        // 🔌 bind, remember the port, hang up. nobody lives there anymore.
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        drop(listener);

        let connection = Connection::new("127.0.0.1", port)?;
        let result = HttpTransport::new()
            .execute(&connection, &Request::new(Method::Get, ""))
            .await;
        assert!(matches!(result, Err(TransportError::Connect(_))), "got {result:?}");
        Ok(())
    }

    #[test]
    fn the_one_where_a_malformed_header_is_not_a_dead_node() {
        let built = reqwest::Client::new()
            .get("http://127.0.0.1:9200/")
            .header("x bad", "v")
            .build();
        let Err(error) = built else {
            panic!("a header name with a space must not build");
        };
        let classified = classify(error);
        assert!(matches!(classified, TransportError::Request(_)), "got {classified:?}");
        assert!(!classified.is_connectivity());
    }
}
