//! Redis job broker.

pub mod broker;
pub mod client;

pub use broker::RedisBroker;
pub use client::RedisClient;
