//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Client accepted (core)
//!     → Strategy::select (bound once at core creation)
//!     → registry.rs (lock-free walk of published backends)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through backends)
//!         - least_conn.rs (pick backend with fewest connections)
//!     → backend.rs (connection accounting via guard)
//!     → Return backend or no-candidate
//! ```
//!
//! # Design Decisions
//! - Registry is add-only; backends never move, so selection never locks
//! - Strategy is a closed enum dispatched statically
//! - Only `Up` backends are selectable; `Draining` is treated like `Down`

pub mod backend;
pub mod least_conn;
pub mod registry;
pub mod round_robin;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::load_balancer::backend::Backend;
use crate::load_balancer::least_conn::LeastConnections;
use crate::load_balancer::registry::Registry;
use crate::load_balancer::round_robin::RoundRobin;
use crate::status::LbResult;

/// Load balancing algorithm tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[serde(alias = "round_robin", alias = "round-robin", alias = "rr")]
    RoundRobin,
    #[default]
    #[serde(alias = "least_conn", alias = "least-conn", alias = "leastconnections")]
    LeastConn,
    /// Any tag this build does not know. Served by least-connections.
    #[serde(other)]
    Unknown,
}

impl FromStr for Algorithm {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "roundrobin" | "round_robin" | "round-robin" | "rr" => Algorithm::RoundRobin,
            "leastconn" | "least_conn" | "least-conn" | "leastconnections" => Algorithm::LeastConn,
            _ => Algorithm::Unknown,
        })
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Algorithm::RoundRobin => "roundrobin",
            Algorithm::LeastConn => "leastconn",
            Algorithm::Unknown => "unknown",
        })
    }
}

/// A backend selection policy.
pub trait SelectionStrategy {
    /// Name used in log lines.
    fn name(&self) -> &'static str;

    /// Prepare strategy state. Runs once during core creation.
    fn init(&mut self, _registry: &Registry) -> LbResult<()> {
        Ok(())
    }

    /// Pick an `Up` backend for `client`, or `None` if there is no candidate.
    fn select<'r>(&self, registry: &'r Registry, client: Option<&SocketAddr>) -> Option<&'r Backend>;

    /// Release strategy state. Runs once during core destruction.
    fn teardown(&mut self) {}
}

/// The strategy a core is bound to.
#[derive(Debug)]
pub enum Strategy {
    RoundRobin(RoundRobin),
    LeastConnections(LeastConnections),
}

impl Strategy {
    /// Map an algorithm tag to its strategy. Unknown tags fall back to
    /// least-connections.
    pub fn from_algorithm(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::RoundRobin => Strategy::RoundRobin(RoundRobin::new()),
            Algorithm::LeastConn | Algorithm::Unknown => {
                Strategy::LeastConnections(LeastConnections::new())
            }
        }
    }

    fn inner(&self) -> &dyn SelectionStrategy {
        match self {
            Strategy::RoundRobin(s) => s,
            Strategy::LeastConnections(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn SelectionStrategy {
        match self {
            Strategy::RoundRobin(s) => s,
            Strategy::LeastConnections(s) => s,
        }
    }
}

impl SelectionStrategy for Strategy {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn init(&mut self, registry: &Registry) -> LbResult<()> {
        self.inner_mut().init(registry)
    }

    fn select<'r>(&self, registry: &'r Registry, client: Option<&SocketAddr>) -> Option<&'r Backend> {
        match self {
            Strategy::RoundRobin(s) => s.select(registry, client),
            Strategy::LeastConnections(s) => s.select(registry, client),
        }
    }

    fn teardown(&mut self) {
        self.inner_mut().teardown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_maps_tags() {
        assert_eq!(Strategy::from_algorithm(Algorithm::RoundRobin).name(), "roundrobin");
        assert_eq!(Strategy::from_algorithm(Algorithm::LeastConn).name(), "leastconn");
        assert_eq!(Strategy::from_algorithm(Algorithm::Unknown).name(), "leastconn");
    }

    #[test]
    fn parse_algorithm() {
        assert_eq!("ROUNDROBIN".parse::<Algorithm>().unwrap(), Algorithm::RoundRobin);
        assert_eq!("least_conn".parse::<Algorithm>().unwrap(), Algorithm::LeastConn);
        assert_eq!("random".parse::<Algorithm>().unwrap(), Algorithm::Unknown);
    }

    #[test]
    fn deserialize_unknown_algorithm() {
        #[derive(Deserialize)]
        struct Doc {
            algorithm: Algorithm,
        }
        let doc: Doc = toml::from_str("algorithm = \"weighted\"").unwrap();
        assert_eq!(doc.algorithm, Algorithm::Unknown);
        let doc: Doc = toml::from_str("algorithm = \"roundrobin\"").unwrap();
        assert_eq!(doc.algorithm, Algorithm::RoundRobin);
    }
}
