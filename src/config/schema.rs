//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! balancer. All types derive Serde traits for deserialization from config
//! files.

use serde::{Deserialize, Serialize};

use crate::lifecycle::arena::DEFAULT_ARENA_BYTES;
use crate::lifecycle::CoreOptions;
use crate::load_balancer::backend::BackendState;
use crate::load_balancer::registry::MAX_BACKENDS;
use crate::load_balancer::Algorithm;
use crate::observability::logging::LogLevel;

/// Default concurrent connection ceiling.
pub const MAX_CONNECTIONS: u32 = 65535;

/// Root configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LbConfig {
    /// Port to listen on (all IPv4 interfaces).
    pub listen_port: u16,

    /// Backend selection algorithm.
    pub algorithm: Algorithm,

    /// Initial process log level.
    pub log_level: LogLevel,

    /// Registry capacity.
    pub max_backends: usize,

    /// Worker pool size. Defaults to the number of online processors.
    pub worker_threads: Option<usize>,

    /// Memory arena size in bytes; 0 disables the arena.
    pub arena_bytes: usize,

    /// Core tunables.
    pub core: CoreConfig,

    /// Upstream backends, in selection order.
    pub backends: Vec<BackendConfig>,
}

impl Default for LbConfig {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            algorithm: Algorithm::default(),
            log_level: LogLevel::default(),
            max_backends: MAX_BACKENDS,
            worker_threads: None,
            arena_bytes: DEFAULT_ARENA_BYTES,
            core: CoreConfig::default(),
            backends: Vec::new(),
        }
    }
}

impl LbConfig {
    /// Creation-time options for a core built from this file.
    pub fn core_options(&self) -> CoreOptions {
        CoreOptions {
            config: self.core.clone(),
            max_backends: self.max_backends,
            worker_threads: self.worker_threads,
            arena_bytes: self.arena_bytes,
        }
    }
}

/// Core tunables. Timeouts are declarative; enforcement is up to the
/// data-plane collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Max wait to establish an upstream connection.
    pub connect_timeout_ms: u32,

    /// Idle read deadline.
    pub read_timeout_ms: u32,

    /// Idle write deadline.
    pub write_timeout_ms: u32,

    /// Idle keepalive window.
    pub keepalive_timeout_ms: u32,

    /// Cadence for external health probing.
    pub health_check_interval_ms: u32,

    /// Concurrent connection ceiling.
    pub max_connections: u32,

    /// Disable Nagle on listener and accepted sockets.
    pub tcp_nodelay: bool,

    /// Allow several listeners on the same port.
    pub so_reuseport: bool,

    /// Delay accept until the client sends data.
    pub defer_accept: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            keepalive_timeout_ms: 60_000,
            health_check_interval_ms: 5_000,
            max_connections: MAX_CONNECTIONS,
            tcp_nodelay: true,
            so_reuseport: true,
            defer_accept: true,
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Backend host (e.g., "10.0.0.1").
    pub host: String,

    /// Backend port.
    pub port: u16,

    /// Weight (default: 1; 0 is treated as 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// State the backend starts in. Probing is external, so this defaults to up.
    #[serde(default = "default_state", with = "state_name")]
    pub state: BackendState,
}

fn default_weight() -> u32 {
    1
}

fn default_state() -> BackendState {
    BackendState::Up
}

mod state_name {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use crate::load_balancer::backend::BackendState;

    pub fn serialize<S: Serializer>(state: &BackendState, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(state)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BackendState, D::Error> {
        let name = String::deserialize(d)?;
        match name.to_ascii_lowercase().as_str() {
            "up" => Ok(BackendState::Up),
            "down" => Ok(BackendState::Down),
            "draining" => Ok(BackendState::Draining),
            other => Err(D::Error::custom(format!("unknown backend state `{other}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_defaults() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.connect_timeout_ms, 5000);
        assert_eq!(cfg.read_timeout_ms, 30000);
        assert_eq!(cfg.write_timeout_ms, 30000);
        assert_eq!(cfg.keepalive_timeout_ms, 60000);
        assert_eq!(cfg.health_check_interval_ms, 5000);
        assert_eq!(cfg.max_connections, 65535);
        assert!(cfg.tcp_nodelay && cfg.so_reuseport && cfg.defer_accept);
    }

    #[test]
    fn minimal_file_uses_defaults() {
        let cfg: LbConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.listen_port, 8080);
        assert_eq!(cfg.algorithm, Algorithm::LeastConn);
        assert_eq!(cfg.max_backends, 256);
        assert_eq!(cfg.arena_bytes, 64 * 1024 * 1024);
        assert!(cfg.backends.is_empty());
    }

    #[test]
    fn parses_full_document() {
        let doc = r#"
            listen_port = 9000
            algorithm = "roundrobin"
            log_level = "debug"
            max_backends = 4
            worker_threads = 2
            arena_bytes = 0

            [core]
            connect_timeout_ms = 1500
            tcp_nodelay = false

            [[backends]]
            host = "10.0.0.1"
            port = 80

            [[backends]]
            host = "10.0.0.2"
            port = 81
            weight = 5
            state = "down"
        "#;
        let cfg: LbConfig = toml::from_str(doc).unwrap();
        assert_eq!(cfg.listen_port, 9000);
        assert_eq!(cfg.algorithm, Algorithm::RoundRobin);
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.core.connect_timeout_ms, 1500);
        assert!(!cfg.core.tcp_nodelay);
        assert_eq!(cfg.core.read_timeout_ms, 30000);
        assert_eq!(cfg.backends[0].weight, 1);
        assert_eq!(cfg.backends[0].state, BackendState::Up);
        assert_eq!(cfg.backends[1].weight, 5);
        assert_eq!(cfg.backends[1].state, BackendState::Down);

        let opts = cfg.core_options();
        assert_eq!(opts.max_backends, 4);
        assert_eq!(opts.worker_threads, Some(2));
        assert_eq!(opts.arena_bytes, 0);
    }

    #[test]
    fn unknown_state_rejected() {
        let doc = "[[backends]]\nhost = \"a\"\nport = 1\nstate = \"sleeping\"\n";
        assert!(toml::from_str::<LbConfig>(doc).is_err());
    }
}
