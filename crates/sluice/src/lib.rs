//! 🌊 sluice — a client for a cluster of search nodes that keeps going when nodes don't.
//!
//! Two things with real rules live here:
//! - the failover loop ([`Client::execute`]) over a [`ConnectionPool`] and its
//!   [`Strategy`], and
//! - the bulk protocol ([`BulkBatch`]): NDJSON out, positional correlation back in.
//!
//! Everything else is plumbing in service of those two. 🦆

pub mod app_config;
pub mod bulk;
pub mod client;
pub mod connection;
pub mod error;
pub mod pool;
pub mod strategies;
pub mod transports;

pub use app_config::{AppConfig, ClientConfig, load_config};
pub use bulk::{Action, ActionMetadata, BulkBatch, BulkOutcome, BulkOutcomeSet, Document, OpType, Script};
pub use client::Client;
pub use connection::{Connection, ConnectionConfig, TransportKind};
pub use error::{ClientError, Result, TransportError};
pub use pool::{ConnectionPool, FailureListener};
pub use strategies::{RoundRobinStrategy, SelectionStrategy, SimpleStrategy, Strategy};
pub use transports::{HttpTransport, InMemoryTransport, Method, NullTransport, Request, Response, Transport};
