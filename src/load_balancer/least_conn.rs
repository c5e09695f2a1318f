//! Least Connections load balancing strategy.

use std::net::SocketAddr;

use crate::load_balancer::{backend::Backend, registry::Registry, SelectionStrategy};

/// Least connections selector.
/// Selects the `Up` backend with the minimum number of active connections.
///
/// Counts are read relaxed, so under concurrent dispatch the result is a
/// backend that was near the minimum at some point during the scan.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for LeastConnections {
    fn name(&self) -> &'static str {
        "leastconn"
    }

    fn select<'r>(&self, registry: &'r Registry, _client: Option<&SocketAddr>) -> Option<&'r Backend> {
        // In case of tie, the first one is selected (stability)
        registry
            .iter()
            .filter(|b| b.is_up())
            .min_by_key(|b| b.active_conns())
    }
}
