//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Create (instance.rs):
//!     Notification descriptor → defaults → registry
//!     → arena.rs (optional) → strategy init → workers.rs
//!
//! Run:
//!     configure → add backends → listen → accept/select
//!
//! Destroy (reverse order):
//!     Stop workers → strategy teardown → unmap arena
//!     → close listener and descriptor → release backends
//! ```
//!
//! # Design Decisions
//! - Arena and worker pool failures are demoted to warnings
//! - Strategy init failure aborts creation; partial state unwinds via drop
//! - Teardown runs from `Drop`, so every exit path releases resources once

pub mod arena;
pub mod instance;
pub mod workers;

pub use instance::{Core, CoreOptions};
