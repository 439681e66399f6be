//! # Tenancy Core - Domain Module
//!
//! Domain entities for the hierarchical multi-tenancy model.

pub mod audit;
pub mod invite;
pub mod member;
pub mod permission;
pub mod tenant;
pub mod tree;

// Re-export all entities and enums
pub use audit::AuditEvent;
pub use invite::{InviteStatus, TenantInvite};
pub use member::{TenantMember, TenantRole};
pub use permission::{Permission, PermissionSubject};
pub use tenant::{Tenant, TenantFilter, TenantPatch, TenantStatus, TenantType};
pub use tree::{PathRelationship, TenantTreeNode};
