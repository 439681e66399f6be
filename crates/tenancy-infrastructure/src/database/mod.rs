//! Database adapters

pub mod connection;
pub mod postgres;

pub use connection::{create_pool, lock_subtree, map_sqlx_err, open_system_tx, open_tx};
pub use postgres::{
    PgAuditRepository, PgMemberRepository, PgPermissionRepository, PgTenantRepository,
};
