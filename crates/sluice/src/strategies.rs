//! 🎯 Selection strategies — who gets the next request?
//!
//! 🎬 *[three nodes stand in a line. one of them is on fire. the strategy must choose.]*
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (`SimpleStrategy`, `RoundRobinStrategy`) → `Strategy`
//!   enum dispatcher → `Strategy::from_config` resolver. Same shape as every other
//!   polymorphic seam in this crate.
//! - Contract: only `enabled` connections are candidates. No candidate → `None`,
//!   which the pool turns into `ClientError::PoolExhausted`. A strategy never errors
//!   about a specific connection, because it never picked one.
//! - Neither strategy mutates connections. RoundRobin mutates its own cursor. That's it. 🦆

use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::ClientConfig;
use crate::connection::Connection;

mod round_robin;
mod simple;

pub use round_robin::RoundRobinStrategy;
pub use simple::SimpleStrategy;

/// 🎯 Picks the next connection out of an ordered list.
///
/// # Contract
/// - Consider only connections where `is_enabled()` is true.
/// - Return `None` when none are enabled. Do not loop forever looking for one.
pub trait SelectionStrategy: Debug + Send + Sync {
    fn select(&self, connections: &[Arc<Connection>]) -> Option<Arc<Connection>>;
}

/// 🎭 The polymorphic strategy — wraps the concrete ones, dispatches via match.
#[derive(Debug)]
pub enum Strategy {
    Simple(SimpleStrategy),
    RoundRobin(RoundRobinStrategy),
}

impl Strategy {
    /// 🔧 `round_robin = true` → RoundRobin. Anything else → Simple.
    pub fn from_config(config: &ClientConfig) -> Self {
        if config.round_robin {
            Strategy::RoundRobin(RoundRobinStrategy::default())
        } else {
            Strategy::Simple(SimpleStrategy)
        }
    }

    /// 🏷️ For logs. Humans like names.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Simple(_) => "simple",
            Strategy::RoundRobin(_) => "round_robin",
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Simple(SimpleStrategy)
    }
}

impl SelectionStrategy for Strategy {
    fn select(&self, connections: &[Arc<Connection>]) -> Option<Arc<Connection>> {
        match self {
            Strategy::Simple(s) => s.select(connections),
            Strategy::RoundRobin(rr) => rr.select(connections),
        }
    }
}
