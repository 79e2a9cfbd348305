//! # Previously, on Sluice...
//!
//! 🎬 The cluster was a lie. Three nodes, all imaginary, all scripted.
//! One answers politely. One refuses the connection. One takes so long it times out.
//! None of them exist. All of them are extremely useful.
//!
//! `InMemoryTransport` lets tests (yours and ours) decide, per `host:port`, how a
//! node behaves, and then records every call that reached it. The state lives
//! behind an `Arc<Mutex<...>>` so clones handed to the client still report back
//! to the test that kept the original. 🦆
//!
//! ⚠️ This is for tests. If you're deploying this to prod, please also deploy a therapist.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{Request, Response, Transport};
use crate::connection::Connection;
use crate::error::TransportError;

/// 🎭 How a scripted node reacts to a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    /// ✅ Answer with this response, every time.
    Respond(Response),
    /// 🔌 Refuse the connection.
    Unreachable,
    /// ⏱️ Pretend we waited and gave up.
    Timeout,
    /// 🧾 Refuse the request itself, as if it could not be built.
    Reject,
}

/// 📋 One call that reached the transport, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// `host:port` the call was routed to
    pub connection: String,
    pub request: Request,
}

#[derive(Debug, Default)]
struct InMemoryState {
    behaviors: HashMap<String, Behavior>,
    calls: Vec<RecordedCall>,
}

/// 🧪 Scripted, recording transport. Unscripted nodes are unreachable.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 🎭 Script the node at `host:port`.
    pub fn set_behavior(&self, node: impl Into<String>, behavior: Behavior) -> &Self {
        self.state().behaviors.insert(node.into(), behavior);
        self
    }

    /// ✅ Shorthand: this node answers with `response`.
    pub fn respond(&self, node: impl Into<String>, response: Response) -> &Self {
        self.set_behavior(node, Behavior::Respond(response))
    }

    /// 🔌 Shorthand: this node refuses connections.
    pub fn unreachable(&self, node: impl Into<String>) -> &Self {
        self.set_behavior(node, Behavior::Unreachable)
    }

    /// 📋 Every call so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// 📋 The `host:port` of every call so far, oldest first.
    pub fn visited(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .map(|call| call.connection.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn execute(
        &self,
        connection: &Connection,
        request: &Request,
    ) -> Result<Response, TransportError> {
        let node = connection.to_string();
        let mut state = self.state();
        state.calls.push(RecordedCall {
            connection: node.clone(),
            request: request.clone(),
        });
        match state.behaviors.get(&node) {
            Some(Behavior::Respond(response)) => Ok(response.clone()),
            Some(Behavior::Timeout) => Err(TransportError::Timeout(format!(
                "{node} did not answer within {:?}",
                connection.timeout()
            ))),
            Some(Behavior::Reject) => Err(TransportError::Request(format!(
                "{node}: request for '{}' could not be built",
                request.path
            ))),
            Some(Behavior::Unreachable) | None => Err(TransportError::Connect(format!(
                "{node}: connection refused"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transports::Method;

    #[tokio::test]
    async fn the_one_where_scripted_nodes_stay_in_character() -> anyhow::Result<()> {
        let transport = InMemoryTransport::new();
        transport
            .respond("up:9200", Response::new(200, "{}"))
            .set_behavior("slow:9200", Behavior::Timeout);

        let up = Connection::new("up", 9200)?;
        let slow = Connection::new("slow", 9200)?;
        let ghost = Connection::new("ghost", 9200)?;
        let request = Request::new(Method::Get, "");

        assert_eq!(transport.execute(&up, &request).await?.status(), 200);
        assert!(matches!(
            transport.execute(&slow, &request).await,
            Err(TransportError::Timeout(_))
        ));
        assert!(matches!(
            transport.execute(&ghost, &request).await,
            Err(TransportError::Connect(_))
        ));
        assert_eq!(transport.visited(), vec!["up:9200", "slow:9200", "ghost:9200"]);
        Ok(())
    }
}
