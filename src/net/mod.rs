//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Core::listen
//!     → listener.rs (socket options, bind, listen)
//!     → poller.rs (register listener for readability)
//!
//! Accept path:
//!     poller wait → Core::accept → Core::select_backend
//!     → hand off to the data-plane collaborator
//! ```
//!
//! # Design Decisions
//! - Sockets are non-blocking; no core call blocks on network I/O
//! - Any syscall failure maps to a `System` error carrying the OS error

pub mod listener;
pub mod poller;

pub use listener::bind_listen;
pub use poller::Poller;
