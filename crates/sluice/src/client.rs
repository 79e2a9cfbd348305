// ai
//! 🚀 Client — the failover loop, and the front door for everything else.
//!
//! 🎬 COLD OPEN — INT. OPS CHANNEL — 2:14 AM
//!
//! "es-2 is down." "Did the app notice?" "The app retried on es-3 and didn't
//! even wake anyone up." "...I love this app." "It's a `loop`, Kevin."
//!
//! 🧠 Knowledge graph:
//! - `execute(request)`: acquire from the pool → send through the transport →
//!   on `TransportError`, `pool.on_fail` and go again. At most `pool.len()`
//!   attempts, snapshotted on entry; each failure disables one connection, so
//!   the loop cannot outlive the pool.
//! - Pool exhausted on the FIRST acquisition → `PoolExhausted`, zero transport calls.
//!   Pool drained by our own failures → `Connectivity` carrying the last failure.
//! - A response is a response. 409, 500, whatever: returned, never retried.
//! - A request the transport refuses to build (`TransportError::Request`) is the
//!   caller's problem, not the node's: returned as `ClientError::Request`, nothing disabled.
//! - `last_request` / `last_response`: observability only. Last writer wins when
//!   requests overlap.
//! - Cheap to clone: all state behind one `Arc`. Bulk batches hold a clone. 🦆

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, trace, warn};

use crate::app_config::ClientConfig;
use crate::bulk::{BulkBatch, BulkOutcomeSet, Document, OpType};
use crate::error::{ClientError, Result, TransportError};
use crate::pool::ConnectionPool;
use crate::transports::{Method, Request, Response, Transport, TransportBackend};

struct ClientInner {
    config: ClientConfig,
    pool: Arc<ConnectionPool>,
    transport: Arc<dyn Transport>,
    last_request: Mutex<Option<Request>>,
    last_response: Mutex<Option<Response>>,
}

/// 🚀 Talks to the cluster through a pool of connections, failing over when nodes vanish.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("pool", &self.inner.pool)
            .field("transport", &self.inner.transport)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// 🏗️ Pool from config, default transport (routes by each connection's `transport`).
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_transport(config, Arc::new(TransportBackend::default()))
    }

    /// 🏗️ Pool from config, your transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let pool = ConnectionPool::from_config(&config)?;
        Ok(Self::from_pool(Arc::new(pool), transport, config))
    }

    /// 🏗️ Bring your own pool (with a failure listener, custom connections, ...).
    /// The config still supplies the bulk defaults and the UDP endpoint.
    pub fn from_pool(pool: Arc<ConnectionPool>, transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                pool,
                transport,
                last_request: Mutex::new(None),
                last_response: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// 📨 One logical request, failed over across the pool.
    pub async fn request(
        &self,
        path: impl Into<String>,
        method: Method,
        body: Option<String>,
        query: Vec<(String, String)>,
    ) -> Result<Response> {
        let request = Request {
            path: path.into(),
            method,
            body,
            query,
        };
        self.execute(request).await
    }

    /// 🔁 The failover loop.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let pool = &self.inner.pool;
        let max_attempts = pool.len();
        let mut last_failure: Option<(String, TransportError)> = None;

        for attempt in 1..=max_attempts {
            let connection = match pool.get_connection() {
                Ok(connection) => connection,
                Err(exhausted) => return Err(self.give_up(last_failure, exhausted)),
            };
            trace!(
                "📡 Attempt {}/{}: {} {} via {}",
                attempt, max_attempts, request.method, request.path, connection
            );

            match self.inner.transport.execute(&connection, &request).await {
                Ok(response) => {
                    debug!(
                        "📬 {} {} → {} via {}",
                        request.method,
                        request.path,
                        response.status(),
                        connection
                    );
                    self.remember(request, response.clone());
                    return Ok(response);
                }
                Err(cause) if !cause.is_connectivity() => {
                    // 🧾 the next node would refuse it just the same. nobody gets disabled.
                    warn!(
                        "💀 {} {} could not be sent via {}: {}",
                        request.method, request.path, connection, cause
                    );
                    return Err(ClientError::Request {
                        connection: connection.to_string(),
                        source: cause,
                    });
                }
                Err(cause) => {
                    pool.on_fail(&connection, &cause, self);
                    last_failure = Some((connection.to_string(), cause));
                }
            }
        }

        Err(self.give_up(last_failure, ClientError::PoolExhausted))
    }

    // 🪦 nothing left to try. our own failures → Connectivity, otherwise whatever the pool said.
    fn give_up(&self, last_failure: Option<(String, TransportError)>, otherwise: ClientError) -> ClientError {
        match last_failure {
            Some((connection, source)) => {
                error!(
                    "💀 Every connection is disabled. Last one down was {}: {}",
                    connection, source
                );
                ClientError::Connectivity { connection, source }
            }
            None => {
                error!("💀 No enabled connection in the pool, nothing was sent");
                otherwise
            }
        }
    }

    fn remember(&self, request: Request, response: Response) {
        *self
            .inner
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request);
        *self
            .inner
            .last_response
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(response);
    }

    /// 🔍 The last request that got a response. For debugging, not for logic.
    pub fn last_request(&self) -> Option<Request> {
        self.inner
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_response(&self) -> Option<Response> {
        self.inner
            .last_response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 📦 An empty bulk batch bound to this client.
    pub fn bulk(&self) -> BulkBatch {
        BulkBatch::new(self.clone())
    }

    /// 📄 Index every document in one bulk.
    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<BulkOutcomeSet> {
        self.send_documents(OpType::Index, documents).await
    }

    /// 🔁 Partial-update every document in one bulk. Each needs an id.
    pub async fn update_documents(&self, documents: Vec<Document>) -> Result<BulkOutcomeSet> {
        if let Some(position) = documents.iter().position(|d| !d.has_id()) {
            return Err(ClientError::InvalidAction(format!(
                "document at position {position} has no id, and an update needs one"
            )));
        }
        self.send_documents(OpType::Update, documents).await
    }

    /// 🗑️ Delete every document in one bulk, by the metadata each one carries.
    pub async fn delete_documents(&self, documents: Vec<Document>) -> Result<BulkOutcomeSet> {
        self.send_documents(OpType::Delete, documents).await
    }

    /// 🗑️ Delete by id from one index, optionally with a type and a routing value.
    pub async fn delete_ids(
        &self,
        ids: Vec<String>,
        index: &str,
        type_name: Option<&str>,
        routing: Option<&str>,
    ) -> Result<BulkOutcomeSet> {
        if ids.is_empty() {
            return Err(ClientError::InvalidAction(
                "delete_ids needs at least one id".to_string(),
            ));
        }
        let mut batch = self.bulk().with_index(index);
        if let Some(type_name) = type_name {
            batch = batch.with_type(type_name);
        }
        for id in ids {
            let mut document = Document::default().with_id(id);
            document.routing = routing.map(str::to_string);
            batch.add_document(OpType::Delete, document);
        }
        batch.send().await
    }

    async fn send_documents(&self, op_type: OpType, documents: Vec<Document>) -> Result<BulkOutcomeSet> {
        if documents.is_empty() {
            return Err(ClientError::InvalidAction(format!(
                "no documents given to {op_type}"
            )));
        }
        let mut batch = self.bulk();
        batch.add_documents(op_type, documents);
        batch.send().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Connection, ConnectionConfig};
    use crate::transports::{Behavior, InMemoryTransport};
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cluster(nodes: &[&str], round_robin: bool) -> ClientConfig {
        let mut config = ClientConfig::with_connections(
            nodes.iter().map(|host| ConnectionConfig::new(*host, 9200)).collect(),
        );
        config.round_robin = round_robin;
        config
    }

    fn scripted(config: ClientConfig) -> anyhow::Result<(Client, InMemoryTransport)> {
        let transport = InMemoryTransport::new();
        let client = Client::with_transport(config, Arc::new(transport.clone()))?;
        Ok((client, transport))
    }

    fn ok() -> Response {
        Response::json(200, &json!({"acknowledged": true}))
    }

    #[tokio::test]
    async fn the_one_where_two_dead_nodes_cost_three_attempts() -> anyhow::Result<()> {
        let (client, transport) = scripted(cluster(&["a", "b", "c", "d"], false))?;
        transport.unreachable("a:9200").unreachable("b:9200");
        transport.respond("c:9200", ok()).respond("d:9200", ok());

        let response = client.request("_cluster/health", Method::Get, None, Vec::new()).await?;

        assert_eq!(response.status(), 200);
        assert_eq!(transport.visited(), vec!["a:9200", "b:9200", "c:9200"]);
        let enabled: Vec<bool> = client.pool().connections().iter().map(|c| c.is_enabled()).collect();
        assert_eq!(enabled, vec![false, false, true, true]);
        assert_eq!(
            client.last_request().map(|r| r.path),
            Some("_cluster/health".to_string())
        );
        assert_eq!(client.last_response(), Some(response));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_round_robin_failover_skips_the_dead() -> anyhow::Result<()> {
        let (client, transport) = scripted(cluster(&["a", "b", "c"], true))?;
        transport
            .respond("a:9200", ok())
            .set_behavior("b:9200", Behavior::Timeout)
            .respond("c:9200", ok());

        for _ in 0..3 {
            client.request("", Method::Get, None, Vec::new()).await?;
        }
        assert_eq!(transport.visited(), vec!["a:9200", "b:9200", "c:9200", "a:9200"]);
        assert_eq!(client.pool().enabled_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_everybody_is_gone() -> anyhow::Result<()> {
        let (client, transport) = scripted(cluster(&["a", "b", "c"], false))?;

        let err = client
            .request("idx/_doc/1", Method::Get, None, Vec::new())
            .await
            .expect_err("nobody is home");

        assert!(err.is_connectivity(), "got {err:?}");
        match &err {
            ClientError::Connectivity { connection, source } => {
                assert_eq!(connection, "c:9200");
                assert!(matches!(source, TransportError::Connect(_)));
            }
            other => panic!("expected connectivity, got {other:?}"),
        }
        assert_eq!(transport.call_count(), 3);
        assert!(!client.pool().has_connection());
        assert!(matches!(client.pool().get_connection(), Err(ClientError::PoolExhausted)));

        // 🏜️ and the next request doesn't even try
        let again = client.request("", Method::Get, None, Vec::new()).await;
        assert!(matches!(again, Err(ClientError::PoolExhausted)));
        assert_eq!(transport.call_count(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_conflict_is_not_a_reason_to_leave() -> anyhow::Result<()> {
        let (client, transport) = scripted(cluster(&["a", "b"], false))?;
        transport.respond(
            "a:9200",
            Response::json(409, &json!({"error": {"type": "version_conflict_engine_exception", "reason": "conflict"}})),
        );
        transport.respond("b:9200", ok());

        let response = client
            .request("idx/_create/1", Method::Put, Some("{}".to_string()), Vec::new())
            .await?;

        assert_eq!(response.status(), 409);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(client.pool().enabled_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_listener_is_told_once_per_casualty() -> anyhow::Result<()> {
        let casualties = Arc::new(Mutex::new(Vec::<String>::new()));
        let notebook = Arc::clone(&casualties);
        let connections = vec![
            Arc::new(Connection::new("a", 9200)?),
            Arc::new(Connection::new("b", 9200)?),
        ];
        let pool = ConnectionPool::new(connections, crate::strategies::Strategy::default())?
            .with_failure_listener(move |connection: &Connection, _: &TransportError, client: &Client| {
                notebook
                    .lock()
                    .expect("notebook")
                    .push(format!("{connection} ({} left)", client.pool().enabled_count()));
            });
        let transport = InMemoryTransport::new();
        transport.respond("b:9200", ok());
        let client = Client::from_pool(Arc::new(pool), Arc::new(transport.clone()), ClientConfig::default());

        client.request("", Method::Get, None, Vec::new()).await?;
        client.request("", Method::Get, None, Vec::new()).await?;

        assert_eq!(*casualties.lock().expect("notebook"), vec!["a:9200 (1 left)".to_string()]);
        assert_eq!(transport.visited(), vec!["a:9200", "b:9200", "b:9200"]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_malformed_request_disables_nobody() -> anyhow::Result<()> {
        let (client, transport) = scripted(cluster(&["a", "b", "c"], false))?;
        transport
            .set_behavior("a:9200", Behavior::Reject)
            .respond("b:9200", ok())
            .respond("c:9200", ok());

        let err = client
            .request("idx/_doc/1", Method::Get, None, Vec::new())
            .await
            .expect_err("the request itself is broken");

        assert!(matches!(err, ClientError::Request { .. }), "got {err:?}");
        assert!(!err.is_connectivity());
        assert_eq!(transport.call_count(), 1);
        assert_eq!(client.pool().enabled_count(), 3);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn the_one_where_a_stampede_buries_the_dead_node_once() -> anyhow::Result<()> {
        let funerals = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&funerals);
        let connections = vec![
            Arc::new(Connection::new("a", 9200)?),
            Arc::new(Connection::new("b", 9200)?),
            Arc::new(Connection::new("c", 9200)?),
        ];
        let strategy = crate::strategies::Strategy::RoundRobin(Default::default());
        let pool = ConnectionPool::new(connections, strategy)?.with_failure_listener(
            move |_: &Connection, _: &TransportError, _: &Client| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            },
        );
        let transport = InMemoryTransport::new();
        transport
            .unreachable("a:9200")
            .respond("b:9200", ok())
            .respond("c:9200", ok());
        let client = Client::from_pool(Arc::new(pool), Arc::new(transport.clone()), ClientConfig::default());

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move { client.request("", Method::Get, None, Vec::new()).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await??.status(), 200);
        }

        assert_eq!(funerals.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(client.pool().enabled_count(), 2);
        assert!(!client.pool().connections()[0].is_enabled());
        assert!(transport.visited().iter().any(|node| node == "a:9200"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_real_sockets_fail_over_too() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cluster_name": "alive"})))
            .expect(1)
            .mount(&server)
            .await;

        let dead = std::net::TcpListener::bind("127.0.0.1:0")?;
        let dead_port = dead.local_addr()?.port();
        drop(dead);

        let alive = server.address();
        let config = ClientConfig::with_connections(vec![
            ConnectionConfig::new("127.0.0.1", dead_port),
            ConnectionConfig::new(alive.ip().to_string(), alive.port()),
        ]);
        let client = Client::new(config)?;

        let response = client.request("", Method::Get, None, Vec::new()).await?;
        assert_eq!(response.data()?["cluster_name"], "alive");
        assert!(!client.pool().connections()[0].is_enabled());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_conveniences_build_the_right_batches() -> anyhow::Result<()> {
        let (client, transport) = scripted(cluster(&["a"], false))?;
        transport.respond(
            "a:9200",
            Response::json(200, &json!({"items": [
                {"delete": {"_id": "1", "status": 200}},
                {"delete": {"_id": "2", "status": 200}}
            ]})),
        );

        let outcomes = client
            .delete_ids(vec!["1".to_string(), "2".to_string()], "idx", Some("t"), Some("r"))
            .await?;
        assert!(outcomes.is_ok());

        let calls = transport.calls();
        assert_eq!(calls[0].request.path, "idx/t/_bulk");
        assert_eq!(
            calls[0].request.body.as_deref(),
            Some(
                "{\"delete\":{\"_index\":\"idx\",\"_type\":\"t\",\"_id\":\"1\",\"_routing\":\"r\"}}\n\
                 {\"delete\":{\"_index\":\"idx\",\"_type\":\"t\",\"_id\":\"2\",\"_routing\":\"r\"}}\n"
            )
        );

        assert!(matches!(client.add_documents(Vec::new()).await, Err(ClientError::InvalidAction(_))));
        assert!(matches!(
            client.update_documents(vec![Document::new(json!({"n": 1}))]).await,
            Err(ClientError::InvalidAction(_))
        ));
        assert_eq!(transport.call_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_add_documents_indexes_in_order() -> anyhow::Result<()> {
        let (client, transport) = scripted(cluster(&["a"], false))?;
        transport.respond(
            "a:9200",
            Response::json(200, &json!({"items": [
                {"index": {"_id": "x", "status": 201}},
                {"index": {"_id": "y", "status": 201}}
            ]})),
        );

        let outcomes = client
            .add_documents(vec![
                Document::new(json!({"n": 1})).with_id("x").with_index("idx"),
                Document::new(json!({"n": 2})).with_id("y").with_index("idx"),
            ])
            .await?;
        assert_eq!(outcomes.iter().filter_map(|o| o.id()).collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(transport.calls()[0].request.path, "_bulk");
        Ok(())
    }
}
