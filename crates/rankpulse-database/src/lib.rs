//! # rankpulse-database
//!
//! PostgreSQL connection management, migrations, and the repositories
//! the scheduling core reads sites from and writes sync runs to.

pub mod connection;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
