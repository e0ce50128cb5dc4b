//! In-process broker backend.

pub mod store;

pub use store::MemoryBroker;
