// ============================================================================
// Tenancy Infrastructure Library
// File: crates/tenancy-infrastructure/src/lib.rs
// ============================================================================
//! # Tenancy Infrastructure
//!
//! PostgreSQL adapters for the `tenancy-core` repository traits. The
//! hierarchy is stored as a materialized path in a `UUID[]` column with a
//! GIN index; descendant queries are array containment, ancestor reads
//! never hit the database beyond a batched id lookup.
//!
//! Every write runs in a transaction that sets a statement timeout and the
//! acting user for row-level security. Structural writes additionally take
//! an advisory lock on the subtree root.

pub mod database;

pub use database::{
    create_pool, PgAuditRepository, PgMemberRepository, PgPermissionRepository,
    PgTenantRepository,
};
