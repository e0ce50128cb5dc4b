//! # rankpulse-broker
//!
//! Durable job storage for RankPulse queues. Two backends implement
//! [`JobBroker`](rankpulse_core::traits::JobBroker):
//!
//! - **redis**: Redis lists and sorted sets via the [redis](https://crates.io/crates/redis) crate
//! - **memory**: in-process store for tests and single-process embedding
//!
//! [`connect`](provider::connect) picks the backend from configuration and
//! returns `None` when no broker address is configured.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use keys::BrokerKeys;
#[cfg(feature = "memory")]
pub use memory::MemoryBroker;
pub use provider::connect;
