//! Built-in job handler implementations.

pub mod sync_run;

pub use sync_run::SyncRunHandler;
