//! 🏊 ConnectionPool — an ordered list of endpoints, a strategy, and a snitch.
//!
//! 🎬 *[a request knocks. the pool points at a node. the node doesn't answer.
//! the pool crosses it off the list and tells whoever asked to be told.]*
//!
//! 🧠 Knowledge graph:
//! - Order matters: `SimpleStrategy` always favors the earliest enabled entry.
//! - `get_connection` delegates to the `Strategy`. Nothing enabled → `PoolExhausted`.
//! - `on_fail` disables the connection, then notifies the `FailureListener` once per
//!   connection actually disabled (the atomic swap in `Connection::disable` decides
//!   who "actually" did it when two requests fail against the same node at once).
//! - The listener runs synchronously on the failing request's task. It is best-effort:
//!   a panicking listener is caught and logged, the pool carries on.
//! - The connection list sits behind an `RwLock` so `add_connection` and
//!   `set_connections` can happen while requests are in flight. 🦆

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use tracing::{debug, error, warn};

use crate::app_config::ClientConfig;
use crate::client::Client;
use crate::connection::Connection;
use crate::error::{ClientError, Result, TransportError};
use crate::strategies::{SelectionStrategy, Strategy};

/// 📣 Hears about every connection the pool gives up on.
///
/// Called synchronously, once per disabled connection, with the connection, the
/// connectivity failure that killed it, and the client that noticed.
/// Keep it quick and non-blocking: the request that failed is waiting on you.
pub trait FailureListener: Send + Sync {
    fn on_failure(&self, connection: &Connection, cause: &TransportError, client: &Client);
}

impl<F> FailureListener for F
where
    F: Fn(&Connection, &TransportError, &Client) + Send + Sync,
{
    fn on_failure(&self, connection: &Connection, cause: &TransportError, client: &Client) {
        self(connection, cause, client)
    }
}

/// 🏊 The pool. Owns the connections, asks the strategy, tells the listener.
pub struct ConnectionPool {
    connections: RwLock<Vec<Arc<Connection>>>,
    strategy: Strategy,
    listener: Option<Arc<dyn FailureListener>>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 🎭 the listener is a closure more often than not, and closures don't do Debug
        f.debug_struct("ConnectionPool")
            .field("connections", &*self.read())
            .field("strategy", &self.strategy)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl ConnectionPool {
    /// 🏗️ A pool over `connections`, in that order. At least one is required.
    pub fn new(connections: Vec<Arc<Connection>>, strategy: Strategy) -> Result<Self> {
        if connections.is_empty() {
            return Err(ClientError::Configuration(
                "a connection pool needs at least one connection".to_string(),
            ));
        }
        debug!(
            "🏊 Pool ready: {} connection(s), strategy '{}'",
            connections.len(),
            strategy.name()
        );
        Ok(Self {
            connections: RwLock::new(connections),
            strategy,
            listener: None,
        })
    }

    /// 🔧 Connections and strategy straight from client config.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let connections = config
            .resolved_connections()?
            .iter()
            .map(|c| Connection::from_config(c).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Self::new(connections, Strategy::from_config(config))
    }

    /// 📣 Register the one listener told about every disabled connection.
    pub fn with_failure_listener(mut self, listener: impl FailureListener + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Connection>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// 🎯 Ask the strategy for the next connection.
    pub fn get_connection(&self) -> Result<Arc<Connection>> {
        self.strategy
            .select(&self.read())
            .ok_or(ClientError::PoolExhausted)
    }

    /// 🗑️ Take `connection` out of rotation and tell the listener about it.
    pub fn on_fail(&self, connection: &Connection, cause: &TransportError, client: &Client) {
        if !connection.disable() {
            // 🔄 someone else already buried this one. no double funeral.
            debug!("🔄 {} was already disabled, skipping notification", connection);
            return;
        }
        warn!(
            "🔌 Disabling connection {} after connectivity failure: {} ({} enabled left)",
            connection,
            cause,
            self.enabled_count()
        );

        if let Some(listener) = &self.listener {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener.on_failure(connection, cause, client)
            }));
            if outcome.is_err() {
                error!(
                    "💀 Failure listener panicked while handling {}. The pool shrugs and carries on.",
                    connection
                );
            }
        }
    }

    /// ➕ Append a connection at the end of the selection order.
    pub fn add_connection(&self, connection: Arc<Connection>) {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(connection);
    }

    /// 🔁 Replace the whole list. Must not be empty.
    pub fn set_connections(&self, connections: Vec<Arc<Connection>>) -> Result<()> {
        if connections.is_empty() {
            return Err(ClientError::Configuration(
                "cannot replace the pool's connections with an empty list".to_string(),
            ));
        }
        *self.connections.write().unwrap_or_else(PoisonError::into_inner) = connections;
        Ok(())
    }

    /// ✅ True iff at least one connection is still enabled.
    pub fn has_connection(&self) -> bool {
        self.read().iter().any(|c| c.is_enabled())
    }

    /// 📋 Snapshot of every connection, enabled or not, in pool order.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.read().iter().filter(|c| c.is_enabled()).count()
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }
}
