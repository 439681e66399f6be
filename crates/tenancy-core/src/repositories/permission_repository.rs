//! Permission repository trait (port)

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{AuditEvent, Permission};
use crate::error::DomainError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn grant(
        &self,
        actor: Uuid,
        permission: &Permission,
        audit: Option<AuditEvent>,
    ) -> Result<Permission, DomainError>;
    /// Write a batch of grants in one transaction (subtree propagation).
    async fn grant_many(
        &self,
        actor: Uuid,
        permissions: &[Permission],
        audit: Option<AuditEvent>,
    ) -> Result<u64, DomainError>;
    async fn list(&self, tenant_id: Uuid) -> Result<Vec<Permission>, DomainError>;
    async fn revoke(
        &self,
        actor: Uuid,
        permission_id: Uuid,
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError>;
}
