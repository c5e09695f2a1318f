//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → LbConfig (validated)
//!     → CoreOptions handed to Core::create_with
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - CoreConfig is mutable only until the core starts listening

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::BackendConfig;
pub use schema::CoreConfig;
pub use schema::LbConfig;
