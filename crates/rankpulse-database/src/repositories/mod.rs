//! Repository implementations backed by PostgreSQL.

pub mod site;
pub mod sync_run;

pub use site::PgSiteRepository;
pub use sync_run::PgSyncRunRepository;
