//! Shared helpers for integration tests.

use lb_core::{Algorithm, Backend, BackendState, Core, CoreOptions};

/// Options small enough to create many cores per test binary.
pub fn small_options(max_backends: usize) -> CoreOptions {
    CoreOptions {
        max_backends,
        worker_threads: Some(1),
        arena_bytes: 0,
        ..CoreOptions::default()
    }
}

/// A core with `hosts` registered on port 80 in the given states.
#[allow(dead_code)]
pub fn core_with(algorithm: Algorithm, backends: &[(&str, BackendState)]) -> Core {
    let core = Core::create_with(8080, algorithm, small_options(16)).unwrap();
    for (host, state) in backends {
        let idx = core.add_backend(host, 80, 1).unwrap();
        core.backend(idx).unwrap().mark(*state);
    }
    core
}

/// Three backends 10.0.0.1..=3, all up.
#[allow(dead_code)]
pub fn three_up(algorithm: Algorithm) -> Core {
    core_with(
        algorithm,
        &[
            ("10.0.0.1", BackendState::Up),
            ("10.0.0.2", BackendState::Up),
            ("10.0.0.3", BackendState::Up),
        ],
    )
}

/// Registry index of a selected backend.
#[allow(dead_code)]
pub fn index_of(core: &Core, backend: &Backend) -> usize {
    core.backends()
        .position(|b| std::ptr::eq(b, backend))
        .expect("selected backend is registered")
}

/// Index chosen by one selection, or `None` for no candidate.
#[allow(dead_code)]
pub fn select_index(core: &Core) -> Option<usize> {
    core.select_backend(None).map(|b| index_of(core, b))
}

/// Push a backend's connection count to exactly `n`.
#[allow(dead_code)]
pub fn set_conns(backend: &Backend, n: u32) {
    while backend.active_conns() > n {
        backend.dec_conns();
    }
    while backend.active_conns() < n {
        backend.inc_conns();
    }
}
