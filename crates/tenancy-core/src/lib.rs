// ============================================================================
// Tenancy Core Library
// File: crates/tenancy-core/src/lib.rs
// ============================================================================
//! # Tenancy Core
//!
//! Business layer for the hierarchical multi-tenancy model: domain
//! entities, repository traits (ports) and the services that enforce the
//! tree invariants. Storage adapters live in `tenancy-infrastructure`;
//! this crate never touches a database directly.
//!
//! The hierarchy is a materialized-path tree: every tenant carries the
//! ordered list of its ancestor ids, its absolute level and the id of its
//! root. Ancestor reads are array lookups, descendant reads are path
//! containment, and structural changes rewrite the affected paths in one
//! transaction.

pub mod domain;
pub mod error;
pub mod repositories;
pub mod services;

pub use error::{DomainError, ErrorKind};
