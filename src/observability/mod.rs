//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events tagged with a category target
//!     → logging.rs (stderr subscriber, process-wide level)
//! ```
//!
//! # Design Decisions
//! - Structured fields (backend, port, errno) rather than formatted strings
//! - Level is process-wide; everything else lives in a Core instance

pub mod logging;

pub use logging::LogLevel;
