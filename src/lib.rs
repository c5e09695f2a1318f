//! TCP load balancer core library.

pub mod config;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod status;

pub use config::schema::{CoreConfig, LbConfig};
pub use lifecycle::{Core, CoreOptions};
pub use load_balancer::backend::{Backend, BackendState};
pub use load_balancer::Algorithm;
pub use status::{LbError, LbResult, Status};
