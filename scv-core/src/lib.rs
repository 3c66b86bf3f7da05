//! Stream lifecycle management core for a Stream Control Vertex shard.
//!
//! Custodies a pool of simulation streams grouped by target, checks them
//! out to compute cores against opaque tokens, reclaims them on heartbeat
//! expiry, and notifies an injector so durable side effects happen outside
//! the registry locks.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod service;
pub mod test_helpers;

pub use config::Config;
pub use error::{Error, Result, TokenFault};
pub use service::{Injector, Manager, TargetOccupancy};
