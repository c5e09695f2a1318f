//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream target (host, port)
//! - Track active connections (for Least Connections LB)
//! - Track health state (Down/Up/Draining)
//! - Hold the collaborator-owned socket slot behind a per-backend lock

use std::fmt;
use std::ops::Deref;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::status::{LbError, LbResult};

/// Longest host string a backend keeps, in bytes.
pub const MAX_HOST_LEN: usize = 255;

/// Backend health state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendState {
    Down = 0,
    Up = 1,
    /// Reserved. Not selectable.
    Draining = 2,
}

impl From<u8> for BackendState {
    fn from(val: u8) -> Self {
        match val {
            1 => BackendState::Up,
            2 => BackendState::Draining,
            _ => BackendState::Down,
        }
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendState::Down => "down",
            BackendState::Up => "up",
            BackendState::Draining => "draining",
        })
    }
}

/// Fields guarded by the per-backend lock.
#[derive(Debug, Default)]
pub struct BackendSlot {
    /// Upstream socket handle, owned by the data-plane collaborator.
    pub socket: Option<RawFd>,
}

/// A single upstream target.
///
/// `host` and `port` never change after construction. Everything else is
/// either atomic or lives behind `lock`.
#[derive(Debug)]
pub struct Backend {
    host: String,
    port: u16,
    weight: AtomicU32,
    state: AtomicU8,
    active_conns: AtomicU32,
    lock: spin::Mutex<BackendSlot>,
}

impl Backend {
    /// Create a backend in the `Down` state with no connections.
    ///
    /// Hosts longer than [`MAX_HOST_LEN`] are truncated. A weight of 0 is
    /// stored as 1.
    pub fn new(host: &str, port: u16, weight: u32) -> LbResult<Self> {
        if host.is_empty() {
            return Err(LbError::InvalidArgument("backend host is empty"));
        }
        if !host.is_ascii() {
            return Err(LbError::InvalidArgument("backend host is not ASCII"));
        }
        if port == 0 {
            return Err(LbError::InvalidArgument("backend port is 0"));
        }

        let host = &host[..host.len().min(MAX_HOST_LEN)];
        let mut owned = String::new();
        owned.try_reserve_exact(host.len())?;
        owned.push_str(host);

        Ok(Self {
            host: owned,
            port,
            weight: AtomicU32::new(normalize_weight(weight)),
            state: AtomicU8::new(BackendState::Down as u8),
            active_conns: AtomicU32::new(0),
            lock: spin::Mutex::new(BackendSlot::default()),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed)
    }

    /// Store a new weight. 0 is stored as 1.
    pub fn set_weight(&self, weight: u32) {
        self.weight.store(normalize_weight(weight), Ordering::Relaxed);
    }

    // --- Health state ---

    pub fn state(&self) -> BackendState {
        BackendState::from(self.state.load(Ordering::Acquire))
    }

    /// True if the backend may be selected.
    pub fn is_up(&self) -> bool {
        self.state() == BackendState::Up
    }

    /// Transition to `state`, returning the previous state.
    pub fn mark(&self, state: BackendState) -> BackendState {
        let prev = BackendState::from(self.state.swap(state as u8, Ordering::AcqRel));
        if prev != state {
            tracing::debug!(
                target: "backend",
                backend = %self,
                from = %prev,
                to = %state,
                "Backend state changed"
            );
        }
        prev
    }

    // --- Connection accounting ---

    /// Current number of active connections.
    pub fn active_conns(&self) -> u32 {
        self.active_conns.load(Ordering::Relaxed)
    }

    /// Increment the active connection count, returning the new value.
    ///
    /// Saturates at `u32::MAX`; an increment there is logged as an error.
    pub fn inc_conns(&self) -> u32 {
        match self
            .active_conns
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
        {
            Ok(prev) => prev + 1,
            Err(max) => {
                tracing::error!(
                    target: "backend",
                    backend = %self,
                    "Connection count saturated"
                );
                max
            }
        }
    }

    /// Decrement the active connection count, returning the new value.
    ///
    /// Saturates at zero; a decrement at zero is logged as an error.
    pub fn dec_conns(&self) -> u32 {
        match self
            .active_conns
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => {
                tracing::error!(
                    target: "backend",
                    backend = %self,
                    "Connection count decremented at zero"
                );
                0
            }
        }
    }

    /// Count one connection for as long as the returned guard lives.
    pub fn track(&self) -> ConnectionGuard<'_> {
        self.inc_conns();
        ConnectionGuard { backend: self }
    }

    // --- Per-backend lock ---

    /// Run `f` with the per-backend lock held.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut BackendSlot) -> R) -> R {
        let mut slot = self.lock.lock();
        f(&mut slot)
    }

    pub fn socket(&self) -> Option<RawFd> {
        self.with_lock(|slot| slot.socket)
    }

    /// Store a socket handle, returning the one it replaces.
    pub fn set_socket(&self, fd: RawFd) -> Option<RawFd> {
        self.with_lock(|slot| slot.socket.replace(fd))
    }

    pub fn take_socket(&self) -> Option<RawFd> {
        self.with_lock(|slot| slot.socket.take())
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

fn normalize_weight(weight: u32) -> u32 {
    weight.max(1)
}

/// A RAII guard that manages the active connection count.
#[derive(Debug)]
pub struct ConnectionGuard<'a> {
    backend: &'a Backend,
}

impl Deref for ConnectionGuard<'_> {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        self.backend
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.backend.dec_conns();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_backend_defaults() {
        let b = Backend::new("10.0.0.1", 80, 3).unwrap();
        assert_eq!(b.host(), "10.0.0.1");
        assert_eq!(b.port(), 80);
        assert_eq!(b.weight(), 3);
        assert_eq!(b.state(), BackendState::Down);
        assert_eq!(b.active_conns(), 0);
        assert_eq!(b.socket(), None);
        assert_eq!(b.to_string(), "10.0.0.1:80");
    }

    #[test]
    fn zero_weight_becomes_one() {
        let b = Backend::new("h", 1, 0).unwrap();
        assert_eq!(b.weight(), 1);
        b.set_weight(7);
        assert_eq!(b.weight(), 7);
        b.set_weight(0);
        assert_eq!(b.weight(), 1);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(matches!(Backend::new("", 80, 1), Err(LbError::InvalidArgument(_))));
        assert!(matches!(Backend::new("h", 0, 1), Err(LbError::InvalidArgument(_))));
        assert!(matches!(Backend::new("hö", 80, 1), Err(LbError::InvalidArgument(_))));
    }

    #[test]
    fn long_host_is_truncated() {
        let long = "a".repeat(MAX_HOST_LEN + 20);
        let b = Backend::new(&long, 65535, 1).unwrap();
        assert_eq!(b.host().len(), MAX_HOST_LEN);
    }

    #[test]
    fn all_state_transitions_allowed() {
        let b = Backend::new("h", 1, 1).unwrap();
        let states = [
            BackendState::Up,
            BackendState::Draining,
            BackendState::Down,
            BackendState::Draining,
            BackendState::Up,
            BackendState::Down,
        ];
        let mut prev = BackendState::Down;
        for s in states {
            assert_eq!(b.mark(s), prev);
            assert_eq!(b.state(), s);
            prev = s;
        }
        b.mark(BackendState::Draining);
        assert!(!b.is_up());
    }

    #[test]
    fn dec_at_zero_saturates() {
        let b = Backend::new("h", 1, 1).unwrap();
        assert_eq!(b.dec_conns(), 0);
        assert_eq!(b.active_conns(), 0);
        assert_eq!(b.inc_conns(), 1);
        assert_eq!(b.inc_conns(), 2);
        assert_eq!(b.dec_conns(), 1);
    }

    #[test]
    fn guard_counts_connection() {
        let b = Backend::new("h", 1, 1).unwrap();
        {
            let g = b.track();
            assert_eq!(g.active_conns(), 1);
            let _g2 = b.track();
            assert_eq!(b.active_conns(), 2);
        }
        assert_eq!(b.active_conns(), 0);
    }

    #[test]
    fn inc_saturates_at_max() {
        let b = Backend::new("h", 1, 1).unwrap();
        b.active_conns.store(u32::MAX - 1, Ordering::Relaxed);
        assert_eq!(b.inc_conns(), u32::MAX);
        assert_eq!(b.inc_conns(), u32::MAX);
        assert_eq!(b.active_conns(), u32::MAX);
        assert_eq!(b.dec_conns(), u32::MAX - 1);
    }

    #[test]
    fn socket_slot() {
        let b = Backend::new("h", 1, 1).unwrap();
        assert_eq!(b.set_socket(5), None);
        assert_eq!(b.set_socket(6), Some(5));
        assert_eq!(b.socket(), Some(6));
        assert_eq!(b.take_socket(), Some(6));
        assert_eq!(b.socket(), None);
    }
}
