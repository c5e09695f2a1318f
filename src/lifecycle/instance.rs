//! The balancer core: owns the registry, strategy, endpoint, worker pool,
//! arena and configuration, and exposes the lifecycle API.

use std::io::ErrorKind;
use std::net::{SocketAddr, SocketAddrV4, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use socket2::Socket;

use crate::config::CoreConfig;
use crate::lifecycle::arena::{Arena, DEFAULT_ARENA_BYTES};
use crate::lifecycle::workers::{default_worker_count, WorkerPool};
use crate::load_balancer::backend::Backend;
use crate::load_balancer::registry::{Registry, MAX_BACKENDS};
use crate::load_balancer::{Algorithm, SelectionStrategy, Strategy};
use crate::net::listener::{bind_listen, local_addr_v4, set_defer_accept};
use crate::net::Poller;
use crate::status::{LbError, LbResult};

/// Poller token of the listening socket.
const LISTENER_TOKEN: u64 = 0;

/// Creation-time options.
#[derive(Debug, Clone)]
pub struct CoreOptions {
    /// Initial tunables.
    pub config: CoreConfig,
    /// Registry capacity.
    pub max_backends: usize,
    /// Worker pool size; `None` means one per online processor.
    pub worker_threads: Option<usize>,
    /// Arena size in bytes; 0 skips the arena.
    pub arena_bytes: usize,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            config: CoreConfig::default(),
            max_backends: MAX_BACKENDS,
            worker_threads: None,
            arena_bytes: DEFAULT_ARENA_BYTES,
        }
    }
}

/// A load balancer core instance.
///
/// Backends returned by [`Core::select_backend`] borrow the core and stay
/// valid until it is destroyed.
#[derive(Debug)]
pub struct Core {
    port: u16,
    algorithm: Algorithm,
    config: CoreConfig,
    running: AtomicBool,
    poller: Option<Poller>,
    registry: Registry,
    arena: Option<Arena>,
    strategy: Strategy,
    workers: WorkerPool,
    listener: Option<Socket>,
}

impl Core {
    /// Create a core with default options.
    pub fn create(port: u16, algorithm: Algorithm) -> LbResult<Self> {
        Self::create_with(port, algorithm, CoreOptions::default())
    }

    /// Create a core.
    ///
    /// Failing to map the arena or start the worker pool is logged and
    /// tolerated. A strategy that fails to initialize aborts creation, and
    /// everything acquired so far is released.
    pub fn create_with(port: u16, algorithm: Algorithm, options: CoreOptions) -> LbResult<Self> {
        Self::create_with_init(port, algorithm, options, |strategy, registry| {
            strategy.init(registry)
        })
    }

    /// Creation with the strategy initialization step supplied by the caller.
    pub(crate) fn create_with_init<F>(
        port: u16,
        algorithm: Algorithm,
        options: CoreOptions,
        init: F,
    ) -> LbResult<Self>
    where
        F: FnOnce(&mut Strategy, &Registry) -> LbResult<()>,
    {
        let poller = Poller::new()?;
        let registry = Registry::with_capacity(options.max_backends)?;

        let arena = if options.arena_bytes == 0 {
            None
        } else {
            match Arena::reserve(options.arena_bytes) {
                Ok(arena) => Some(arena),
                Err(e) => {
                    tracing::warn!(
                        target: "core",
                        errno = e.errno(),
                        error = %e,
                        "Memory pool disabled"
                    );
                    None
                }
            }
        };

        let mut strategy = Strategy::from_algorithm(algorithm);
        if let Err(e) = init(&mut strategy, &registry) {
            tracing::error!(
                target: "core",
                strategy = strategy.name(),
                status = %e.status(),
                error = %e,
                "Strategy init failed"
            );
            // Arena, registry and poller are released in that order on return.
            return Err(e);
        }

        let mut workers = WorkerPool::new();
        let threads = options.worker_threads.unwrap_or_else(default_worker_count);
        if let Err(e) = workers.start(threads) {
            tracing::warn!(
                target: "core",
                status = %e.status(),
                error = %e,
                "Worker pool not started"
            );
        }

        let core = Self {
            port,
            algorithm,
            config: options.config,
            running: AtomicBool::new(false),
            poller: Some(poller),
            registry,
            arena,
            strategy,
            workers,
            listener: None,
        };

        tracing::info!(
            target: "core",
            port,
            strategy = core.strategy.name(),
            workers = core.workers.count(),
            arena = core.has_arena(),
            "Core created"
        );
        Ok(core)
    }

    // --- Configuration ---

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Mutable access to the tunables, only before listening starts.
    pub fn configure(&mut self) -> LbResult<&mut CoreConfig> {
        if self.is_running() {
            return Err(LbError::InvalidState("core is already accepting"));
        }
        Ok(&mut self.config)
    }

    // --- Backends ---

    /// Register a backend (initially `Down`). Returns its index.
    pub fn add_backend(&self, host: &str, port: u16, weight: u32) -> LbResult<usize> {
        match self.registry.add(host, port, weight) {
            Ok(index) => {
                if let Some(b) = self.registry.get(index) {
                    tracing::info!(
                        target: "backend",
                        host = b.host(),
                        port = b.port(),
                        weight = b.weight(),
                        index,
                        "Added backend"
                    );
                }
                Ok(index)
            }
            Err(e) => {
                tracing::warn!(
                    target: "backend",
                    host,
                    port,
                    status = %e.status(),
                    "Backend not added"
                );
                Err(e)
            }
        }
    }

    /// Pick a backend for `client` using the bound strategy.
    ///
    /// `None` means no backend is currently `Up`; it is not an error.
    pub fn select_backend(&self, client: Option<&SocketAddr>) -> Option<&Backend> {
        if self.registry.is_empty() {
            return None;
        }
        let selected = self.strategy.select(&self.registry, client);
        if selected.is_none() {
            tracing::debug!(
                target: "strategy",
                strategy = self.strategy.name(),
                backend_count = self.registry.len(),
                "No healthy backend available"
            );
        }
        selected
    }

    pub fn backend(&self, index: usize) -> Option<&Backend> {
        self.registry.get(index)
    }

    pub fn backends(&self) -> impl Iterator<Item = &Backend> + '_ {
        self.registry.iter()
    }

    pub fn backend_count(&self) -> usize {
        self.registry.len()
    }

    pub fn max_backends(&self) -> usize {
        self.registry.capacity()
    }

    // --- Accept path ---

    /// Bind the listening endpoint and start accepting.
    pub fn listen(&mut self) -> LbResult<SocketAddrV4> {
        if self.listener.is_some() {
            return Err(LbError::InvalidState("core is already listening"));
        }
        let poller = self
            .poller
            .as_ref()
            .ok_or(LbError::InvalidState("notification descriptor closed"))?;

        let socket = bind_listen(self.port, self.config.so_reuseport, self.config.tcp_nodelay)
            .inspect_err(|e| {
                tracing::error!(
                    target: "net",
                    port = self.port,
                    errno = e.errno(),
                    error = %e,
                    "Listen failed"
                )
            })?;

        if self.config.defer_accept {
            let secs = (self.config.connect_timeout_ms / 1000).max(1);
            if let Err(e) = set_defer_accept(&socket, secs) {
                tracing::warn!(target: "net", errno = e.errno(), error = %e, "Deferred accept unavailable");
            }
        }

        poller.register(socket.as_raw_fd(), LISTENER_TOKEN)?;
        let addr = local_addr_v4(&socket)?;

        self.listener = Some(socket);
        self.running.store(true, Ordering::Release);

        tracing::info!(
            target: "net",
            address = %addr,
            strategy = self.strategy.name(),
            "Listening for connections"
        );
        Ok(addr)
    }

    /// Wait up to `timeout_ms` for readiness. Returns the number of ready
    /// events; 0 on timeout or interruption.
    pub fn wait_readable(&self, timeout_ms: i32) -> LbResult<usize> {
        let poller = self
            .poller
            .as_ref()
            .ok_or(LbError::InvalidState("notification descriptor closed"))?;
        let mut tokens = Vec::new();
        poller.wait(&mut tokens, timeout_ms)
    }

    /// Accept one pending client, or `None` if nobody is waiting.
    pub fn accept(&self) -> LbResult<Option<(TcpStream, SocketAddrV4)>> {
        let listener = self
            .listener
            .as_ref()
            .ok_or(LbError::InvalidState("core is not listening"))?;

        let (socket, addr) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                return Ok(None);
            }
            Err(e) => return Err(LbError::system("accept", e)),
        };

        socket
            .set_nonblocking(true)
            .map_err(|e| LbError::system("set_nonblocking", e))?;
        if self.config.tcp_nodelay {
            socket
                .set_nodelay(true)
                .map_err(|e| LbError::system("TCP_NODELAY", e))?;
        }
        let addr = addr
            .as_socket_ipv4()
            .ok_or(LbError::InvalidState("accepted a non-IPv4 client"))?;

        Ok(Some((socket.into(), addr)))
    }

    pub fn local_addr(&self) -> Option<SocketAddrV4> {
        self.listener.as_ref().and_then(|s| local_addr_v4(s).ok())
    }

    /// True once `listen` has succeeded.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // --- Introspection ---

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.count()
    }

    pub fn workers_running(&self) -> bool {
        self.workers.is_running()
    }

    pub fn has_arena(&self) -> bool {
        self.arena.is_some()
    }

    /// Scratch memory for collaborators, if the arena was mapped.
    pub fn arena_mut(&mut self) -> Option<&mut Arena> {
        self.arena.as_mut()
    }

    // --- Teardown ---

    /// Tear the core down. Equivalent to dropping it.
    pub fn destroy(self) {
        tracing::debug!(target: "core", port = self.port, "Destroying core");
        drop(self);
    }

    fn teardown(&mut self) {
        self.running.store(false, Ordering::Release);

        self.workers.stop();
        self.strategy.teardown();
        tracing::debug!(target: "core", strategy = self.strategy.name(), "Strategy torn down");

        if let Some(arena) = self.arena.take() {
            let bytes = arena.len();
            drop(arena);
            tracing::debug!(target: "core", bytes, "Memory pool released");
        }

        if let Some(listener) = self.listener.take() {
            if let Some(poller) = &self.poller {
                if let Err(e) = poller.deregister(listener.as_raw_fd()) {
                    tracing::debug!(
                        target: "net",
                        errno = e.errno(),
                        error = %e,
                        "Listener deregistration failed"
                    );
                }
            }
            drop(listener);
        }
        drop(self.poller.take());

        let released = self.registry.release();
        tracing::debug!(target: "core", backends = released, "Core destroyed");
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        self.teardown();
    }
}
