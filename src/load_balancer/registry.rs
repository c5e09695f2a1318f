//! Backend registry.
//!
//! # Responsibilities
//! - Own the backends of one core in insertion order
//! - Serialize additions behind a spin lock
//! - Let readers (strategies) walk a consistent prefix without locking
//!
//! Slots never move and `count` only grows, so a reader that loads
//! `count` with acquire ordering sees fully-built backends in
//! `slots[..count]`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use crate::load_balancer::backend::Backend;
use crate::status::{LbError, LbResult};

/// Default registry capacity.
pub const MAX_BACKENDS: usize = 256;

/// Fixed-capacity, add-only collection of backends.
#[derive(Debug)]
pub struct Registry {
    slots: Box<[OnceLock<Backend>]>,
    count: AtomicUsize,
    lock: spin::Mutex<()>,
}

impl Registry {
    /// Create an empty registry holding up to `capacity` backends.
    pub fn with_capacity(capacity: usize) -> LbResult<Self> {
        if capacity == 0 {
            return Err(LbError::InvalidArgument("registry capacity is 0"));
        }
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity)?;
        slots.resize_with(capacity, OnceLock::new);

        Ok(Self {
            slots: slots.into_boxed_slice(),
            count: AtomicUsize::new(0),
            lock: spin::Mutex::new(()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of published backends.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a backend and append it. Returns its index.
    ///
    /// Arguments are validated before capacity; the backend is built
    /// outside the lock.
    pub fn add(&self, host: &str, port: u16, weight: u32) -> LbResult<usize> {
        let backend = Backend::new(host, port, weight)?;
        self.insert(backend)
    }

    /// Append an already-built backend. Returns its index.
    pub fn insert(&self, backend: Backend) -> LbResult<usize> {
        let _guard = self.lock.lock();

        let index = self.count.load(Ordering::Relaxed);
        let slot = self.slots.get(index).ok_or(LbError::LimitExceeded {
            capacity: self.capacity(),
        })?;
        slot.set(backend)
            .map_err(|_| LbError::InvalidState("registry slot already filled"))?;
        self.count.store(index + 1, Ordering::Release);

        Ok(index)
    }

    /// Backend at `index`, if published.
    pub fn get(&self, index: usize) -> Option<&Backend> {
        if index >= self.len() {
            return None;
        }
        self.slots[index].get()
    }

    /// Iterate the backends published at the time of the call.
    pub fn iter(&self) -> impl Iterator<Item = &Backend> + '_ {
        let count = self.len();
        self.slots[..count].iter().filter_map(OnceLock::get)
    }

    /// Drop every backend. Returns how many were released.
    pub(crate) fn release(&mut self) -> usize {
        let count = *self.count.get_mut();
        let released = self.slots[..count]
            .iter_mut()
            .filter_map(OnceLock::take)
            .count();
        *self.count.get_mut() = 0;
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let reg = Registry::with_capacity(8).unwrap();
        for (i, host) in ["a", "b", "c"].iter().enumerate() {
            assert_eq!(reg.add(host, 80, 1).unwrap(), i);
        }
        let hosts: Vec<&str> = reg.iter().map(Backend::host).collect();
        assert_eq!(hosts, ["a", "b", "c"]);
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.get(1).unwrap().host(), "b");
        assert!(reg.get(3).is_none());
    }

    #[test]
    fn full_registry_is_unchanged() {
        let reg = Registry::with_capacity(2).unwrap();
        reg.add("a", 1, 1).unwrap();
        reg.add("b", 1, 1).unwrap();
        let err = reg.add("c", 1, 1).unwrap_err();
        assert!(matches!(err, LbError::LimitExceeded { capacity: 2 }));
        assert_eq!(reg.len(), 2);

        let err = reg.insert(Backend::new("d", 1, 1).unwrap()).unwrap_err();
        assert!(matches!(err, LbError::LimitExceeded { .. }));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn invalid_add_does_not_publish() {
        let reg = Registry::with_capacity(2).unwrap();
        assert!(matches!(reg.add("", 1, 1), Err(LbError::InvalidArgument(_))));
        assert!(matches!(reg.add("a", 0, 1), Err(LbError::InvalidArgument(_))));
        assert!(reg.is_empty());
    }

    #[test]
    fn arguments_checked_before_capacity() {
        let reg = Registry::with_capacity(1).unwrap();
        reg.add("a", 1, 1).unwrap();
        assert!(matches!(reg.add("", 1, 1), Err(LbError::InvalidArgument(_))));
        assert!(matches!(reg.add("b", 1, 1), Err(LbError::LimitExceeded { .. })));
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            Registry::with_capacity(0),
            Err(LbError::InvalidArgument(_))
        ));
    }

    #[test]
    fn release_empties() {
        let mut reg = Registry::with_capacity(4).unwrap();
        reg.add("a", 1, 1).unwrap();
        reg.add("b", 1, 1).unwrap();
        assert_eq!(reg.release(), 2);
        assert!(reg.is_empty());
        assert_eq!(reg.iter().count(), 0);
    }
}
