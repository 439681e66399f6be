//! PostgreSQL repository implementations

pub mod audit_repo_impl;
pub mod member_repo_impl;
pub mod permission_repo_impl;
pub mod tenant_repo_impl;

pub use audit_repo_impl::PgAuditRepository;
pub use member_repo_impl::PgMemberRepository;
pub use permission_repo_impl::PgPermissionRepository;
pub use tenant_repo_impl::PgTenantRepository;
