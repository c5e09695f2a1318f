//! Round-robin load balancing strategy.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::load_balancer::{backend::Backend, registry::Registry, SelectionStrategy};

/// Round-robin selector.
/// Stores an internal cursor to rotate through backends.
///
/// Every attempt consumes exactly one cursor value, so concurrent callers
/// interleave on a single strictly increasing sequence.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicU32,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStrategy for RoundRobin {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    fn select<'r>(&self, registry: &'r Registry, _client: Option<&SocketAddr>) -> Option<&'r Backend> {
        let len = registry.len();
        if len == 0 {
            return None;
        }

        // Bounded to one pass so an all-down registry terminates.
        for _ in 0..len {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) as usize % len;
            match registry.get(index) {
                Some(backend) if backend.is_up() => return Some(backend),
                _ => continue,
            }
        }
        None
    }
}
