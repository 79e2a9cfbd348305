//! 💀 Errors — the taxonomy of things that go bump in the cluster.
//!
//! 🎬 *[a node goes dark. then another. the pool holds its breath.]*
//!
//! Two layers live here:
//! - [`TransportError`]: the wire gave up. Timeout, refused, DNS, a socket that
//!   hung up mid-sentence. Only transports produce these, and only the failover
//!   loop in [`crate::client`] consumes them directly.
//! - [`ClientError`]: what callers actually see. Connectivity (after the pool is
//!   drained), pool exhaustion, protocol breakage, partial bulk failure, and
//!   config mistakes caught at construction time.
//!
//! An HTTP response with a 4xx/5xx status is NOT an error at this layer. It is a
//! [`crate::transports::Response`] with a sad body. We hand it back and let the caller cry. 🦆

use thiserror::Error;

use crate::bulk::BulkOutcomeSet;

/// 📡 The transport could not complete the exchange. Drives failover.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// ⏱️ The node took too long. We stopped waiting.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// 🔌 Refused, unreachable, DNS said "who?".
    #[error("could not connect: {0}")]
    Connect(String),
    /// 🧦 Anything else that broke below the HTTP layer.
    #[error("transport i/o failure: {0}")]
    Io(String),
    /// 🧾 The request could not be built or sent as written. No node is to blame.
    #[error("request could not be sent as written: {0}")]
    Request(String),
}

impl TransportError {
    /// 📡 True when the node is at fault and the next connection deserves a try.
    pub fn is_connectivity(&self) -> bool {
        !matches!(self, TransportError::Request(_))
    }
}

/// 🚨 Everything a caller of the client or a bulk batch can be handed back.
#[derive(Debug, Error)]
pub enum ClientError {
    /// 📡 Every connection we tried was unreachable; this is the last failure seen.
    #[error("💀 connection to {connection} failed and no enabled connection remains: {source}")]
    Connectivity {
        /// `host:port` of the connection that failed last
        connection: String,
        #[source]
        source: TransportError,
    },

    /// 🧾 The transport refused the request itself. Not retried, no connection disabled.
    #[error("💀 request via {connection} was rejected before reaching the server: {source}")]
    Request {
        connection: String,
        #[source]
        source: TransportError,
    },

    /// 🏜️ No enabled connection existed at acquisition time.
    #[error("💀 no enabled connection available in the pool")]
    PoolExhausted,

    /// 🧩 The server answered, but not in a shape we can correlate.
    #[error("💀 bulk protocol error: {0}")]
    Protocol(String),

    /// ⚠️ The batch was exchanged fine, but some actions failed server-side.
    #[error("⚠️ {}", .0.error_message())]
    BulkFailure(Box<BulkOutcomeSet>),

    /// 🔧 Bad pool/connection configuration, caught before any request.
    #[error("🔧 invalid configuration: {0}")]
    Configuration(String),

    /// 📦 An action that cannot be expressed on the wire.
    #[error("📦 invalid action: {0}")]
    InvalidAction(String),

    /// 🦆 serde_json had a moment.
    #[error("json serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// ✅ True for the connectivity class (the pool was drained by failures).
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ClientError::Connectivity { .. })
    }

    /// ✅ True when nothing was enabled to begin with.
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, ClientError::PoolExhausted)
    }

    /// 📋 The full outcome set of a partially failed bulk, if that's what this is.
    pub fn bulk_outcomes(&self) -> Option<&BulkOutcomeSet> {
        match self {
            ClientError::BulkFailure(outcomes) => Some(outcomes),
            _ => None,
        }
    }
}

/// 🎯 Library-wide result alias.
pub type Result<T> = std::result::Result<T, ClientError>;
