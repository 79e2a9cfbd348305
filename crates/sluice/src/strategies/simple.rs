//! 🥇 SimpleStrategy — first enabled connection wins. Every time. Forever.
//!
//! Deterministic, stateless, and about as exciting as a queue at the DMV.
//! Which is exactly what you want from the thing deciding where your writes go.

use std::sync::Arc;

use super::SelectionStrategy;
use crate::connection::Connection;

/// 🥇 Always the first enabled entry, in pool order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleStrategy;

impl SelectionStrategy for SimpleStrategy {
    fn select(&self, connections: &[Arc<Connection>]) -> Option<Arc<Connection>> {
        connections.iter().find(|c| c.is_enabled()).cloned()
    }
}
