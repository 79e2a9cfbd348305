//! 🔄 RoundRobinStrategy — everybody gets a turn. Disabled nodes sit this one out.
//!
//! The cursor remembers the index handed out last time. Each call starts probing
//! one past it, wraps modulo the pool length, skips disabled entries, and gives up
//! after `len` probes. Bounded. Auditable. No infinite loops at 3am.
//!
//! 🔒 The cursor is behind a `Mutex` because requests run on a multi-threaded runtime
//! and two tasks reading-then-writing a bare integer is how you get the same node twice.

use std::sync::{Arc, Mutex, PoisonError};

use super::SelectionStrategy;
use crate::connection::Connection;

/// 🔄 Rotates over the enabled connections in a fixed cyclic order.
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    // index returned by the previous call, None before the first call
    last: Mutex<Option<usize>>,
}

impl SelectionStrategy for RoundRobinStrategy {
    fn select(&self, connections: &[Arc<Connection>]) -> Option<Arc<Connection>> {
        let len = connections.len();
        if len == 0 {
            return None;
        }

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let start = last.map_or(0, |previous| (previous + 1) % len);

        for probe in 0..len {
            let index = (start + probe) % len;
            let candidate = &connections[index];
            if candidate.is_enabled() {
                *last = Some(index);
                return Some(Arc::clone(candidate));
            }
        }

        // 💀 full lap, nobody enabled. cursor stays put.
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_of(n: u16) -> Vec<Arc<Connection>> {
        (0..n)
            .map(|i| Arc::new(Connection::new(format!("node-{i}"), 9200 + i).expect("valid connection")))
            .collect()
    }

    #[test]
    fn the_one_where_everybody_gets_exactly_one_turn() {
        let connections = pool_of(4);
        let strategy = RoundRobinStrategy::default();

        let first_lap: Vec<Arc<Connection>> = (0..4)
            .map(|_| strategy.select(&connections).expect("all enabled"))
            .collect();
        for (i, chosen) in first_lap.iter().enumerate() {
            assert!(Arc::ptr_eq(chosen, &connections[i]), "lap order must follow pool order");
        }

        // 🔄 second lap repeats the same cycle
        let again = strategy.select(&connections).expect("all enabled");
        assert!(Arc::ptr_eq(&again, &connections[0]));
    }

    #[test]
    fn the_one_where_the_disabled_node_is_skipped_in_rotation() {
        let connections = pool_of(3);
        connections[1].disable();
        let strategy = RoundRobinStrategy::default();

        let picks: Vec<String> = (0..4)
            .map(|_| strategy.select(&connections).expect("two still up").host().to_string())
            .collect();
        assert_eq!(picks, vec!["node-0", "node-2", "node-0", "node-2"]);
    }

    #[test]
    fn the_one_where_an_all_dark_pool_does_not_spin_forever() {
        let connections = pool_of(3);
        connections.iter().for_each(|c| {
            c.disable();
        });
        let strategy = RoundRobinStrategy::default();
        assert!(strategy.select(&connections).is_none());
        assert!(strategy.select(&[]).is_none());
    }

    #[test]
    fn the_one_where_a_shrunken_pool_does_not_index_out_of_bounds() {
        let strategy = RoundRobinStrategy::default();
        let big = pool_of(5);
        for _ in 0..4 {
            strategy.select(&big);
        }
        let small = pool_of(2);
        let chosen = strategy.select(&small).expect("small pool is enabled");
        assert!(Arc::ptr_eq(&chosen, &small[0]) || Arc::ptr_eq(&chosen, &small[1]));
    }
}
