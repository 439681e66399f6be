//! Repository traits (ports)

pub mod audit_repository;
pub mod member_repository;
pub mod permission_repository;
pub mod tenant_repository;

pub use audit_repository::AuditRepository;
pub use member_repository::MemberRepository;
pub use permission_repository::PermissionRepository;
pub use tenant_repository::{ParentLink, PathUpdate, TenantRepository};

#[cfg(test)]
pub use audit_repository::MockAuditRepository;
#[cfg(test)]
pub use member_repository::MockMemberRepository;
#[cfg(test)]
pub use permission_repository::MockPermissionRepository;
#[cfg(test)]
pub use tenant_repository::MockTenantRepository;
