//! TCP load balancer (core binary)
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                    CORE                      │
//!                      │                                              │
//!     Client connect   │  ┌──────────┐   ┌────────┐   ┌───────────┐   │
//!     ─────────────────┼─▶│ listener │──▶│ poller │──▶│  accept   │   │
//!                      │  └──────────┘   └────────┘   └─────┬─────┘   │
//!                      │                                    │         │
//!                      │                                    ▼         │
//!                      │                            ┌──────────────┐  │
//!                      │                            │   strategy   │  │
//!                      │                            │ rr/leastconn │  │
//!                      │                            └──────┬───────┘  │
//!                      │                                   │          │
//!                      │                                   ▼          │
//!                      │                            ┌──────────────┐  │
//!                      │                            │   registry   │──┼──▶ Backend
//!                      │                            └──────────────┘  │
//!                      │                                              │
//!                      │  ┌────────────┐ ┌──────────┐ ┌────────────┐  │
//!                      │  │   config   │ │ workers  │ │   arena    │  │
//!                      │  └────────────┘ └──────────┘ └────────────┘  │
//!                      └──────────────────────────────────────────────┘
//! ```
//!
//! Selection and accounting only. Moving bytes between the client and the
//! chosen backend is the data plane's job, so this binary logs each
//! dispatch and then releases the client.

use std::net::{SocketAddr, SocketAddrV4, TcpStream};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;

use lb_core::config::loader::load_config;
use lb_core::observability::logging::{self, LogLevel};
use lb_core::{Algorithm, Core, LbConfig, LbResult};

#[derive(Parser)]
#[command(name = "lb-core")]
#[command(about = "TCP load balancer core", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Selection algorithm: roundrobin or leastconn (overrides the file)
    #[arg(short, long)]
    algorithm: Option<Algorithm>,

    /// Log level: debug, info, warn, error (overrides the file)
    #[arg(short, long)]
    log_level: Option<LogLevel>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    logging::init(args.log_level.unwrap_or_default())?;

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => LbConfig::default(),
    };
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm;
    }
    // The CLI flag and RUST_LOG both outrank the file.
    if args.log_level.is_none() && std::env::var_os("RUST_LOG").is_none() {
        logging::set_level(config.log_level)?;
    }
    config.log_level = logging::level();

    tracing::info!(
        target: "core",
        listen_port = config.listen_port,
        algorithm = %config.algorithm,
        backends = config.backends.len(),
        log_level = %config.log_level,
        "Configuration loaded"
    );

    let mut core = Core::create_with(config.listen_port, config.algorithm, config.core_options())?;
    for backend in &config.backends {
        let index = core.add_backend(&backend.host, backend.port, backend.weight)?;
        if let Some(b) = core.backend(index) {
            b.mark(backend.state);
        }
    }

    core.listen()?;
    run(&core)?;

    core.destroy();
    tracing::info!(target: "core", "Shutdown complete");
    Ok(())
}

/// Pause after running out of descriptors; the listener stays readable
/// until the pending client is taken.
const FD_EXHAUSTED_BACKOFF: Duration = Duration::from_millis(100);

/// Accept loop. Only a failing readiness wait ends it.
fn run(core: &Core) -> LbResult<()> {
    loop {
        if core.wait_readable(1000)? == 0 {
            continue;
        }
        drain(|| core.accept(), |stream, client| dispatch(core, stream, client));
    }
}

/// Accept and dispatch until nothing is pending or `accept` fails.
///
/// Accept failures are logged and end the pass; the caller goes back to
/// waiting. Returns the number of clients dispatched.
fn drain<A, D>(mut accept: A, mut dispatch: D) -> usize
where
    A: FnMut() -> LbResult<Option<(TcpStream, SocketAddrV4)>>,
    D: FnMut(TcpStream, SocketAddrV4),
{
    let mut dispatched = 0;
    loop {
        match accept() {
            Ok(Some((stream, client))) => {
                dispatch(stream, client);
                dispatched += 1;
            }
            Ok(None) => return dispatched,
            Err(e) => {
                tracing::warn!(
                    target: "net",
                    errno = e.errno(),
                    status = %e.status(),
                    error = %e,
                    "Accept failed"
                );
                if matches!(e.errno(), Some(libc::EMFILE | libc::ENFILE)) {
                    thread::sleep(FD_EXHAUSTED_BACKOFF);
                }
                return dispatched;
            }
        }
    }
}

fn dispatch(core: &Core, stream: TcpStream, client: SocketAddrV4) {
    let peer = SocketAddr::V4(client);
    let Some(backend) = core.select_backend(Some(&peer)) else {
        tracing::warn!(target: "core", client = %client, "No backend available, closing client");
        return;
    };

    let conn = backend.track();
    tracing::info!(
        target: "core",
        client = %client,
        backend = %backend,
        active_conns = conn.active_conns(),
        "Dispatching client"
    );
    drop(stream);
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io;
    use std::net::Ipv4Addr;

    use lb_core::{BackendState, CoreOptions, LbError};

    use super::*;

    fn os_error(errno: i32) -> LbError {
        LbError::system("accept", io::Error::from_raw_os_error(errno))
    }

    #[test]
    fn accept_error_ends_pass_without_exiting() {
        for errno in [libc::ECONNABORTED, libc::EMFILE, libc::ENOBUFS] {
            let calls = Cell::new(0);
            let dispatched = drain(
                || {
                    calls.set(calls.get() + 1);
                    Err(os_error(errno))
                },
                |_, _| panic!("nothing to dispatch"),
            );
            assert_eq!(dispatched, 0);
            assert_eq!(calls.get(), 1);
        }
    }

    #[test]
    fn clients_before_an_error_are_dispatched() {
        let mut core = Core::create_with(
            0,
            Algorithm::RoundRobin,
            CoreOptions {
                max_backends: 4,
                worker_threads: Some(1),
                arena_bytes: 0,
                ..CoreOptions::default()
            },
        )
        .unwrap();
        core.configure().unwrap().defer_accept = false;
        let port = core.listen().unwrap().port();
        let idx = core.add_backend("10.0.0.1", 80, 1).unwrap();
        core.backend(idx).unwrap().mark(BackendState::Up);

        let _client = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        assert!(core.wait_readable(2000).unwrap() >= 1);

        let failed = Cell::new(false);
        let dispatched = drain(
            || match core.accept()? {
                Some(pair) => Ok(Some(pair)),
                None if failed.replace(true) => Ok(None),
                None => Err(os_error(libc::EPROTO)),
            },
            |stream, client| dispatch(&core, stream, client),
        );
        assert_eq!(dispatched, 1);
        assert!(failed.get());
        assert_eq!(core.backend(idx).unwrap().active_conns(), 0);

        // The listener is still usable after the failed pass.
        let _second = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        assert!(core.wait_readable(2000).unwrap() >= 1);
        assert_eq!(drain(|| core.accept(), |s, c| dispatch(&core, s, c)), 1);
    }
}
