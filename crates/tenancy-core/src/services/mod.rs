// ============================================================================
// Tenancy Core - Services Module
// File: crates/tenancy-core/src/services/mod.rs
// ============================================================================

pub mod cache;
pub mod hierarchy_service;
pub mod lifecycle_service;
pub mod member_service;
pub mod path_service;
pub mod tenant_service;
pub mod validation_service;

pub use cache::CacheManager;
pub use hierarchy_service::HierarchyService;
pub use lifecycle_service::{DuplicateOptions, LifecycleService};
pub use member_service::MemberService;
pub use path_service::{PathSegment, PathService, PathViolation};
pub use tenant_service::{NewTenant, TenantService};
pub use validation_service::ValidationService;
