//! Audit repository trait (port)
//!
//! Read-only: audit rows are written by the mutating repositories inside
//! the transaction of the change they describe.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::AuditEvent;
use crate::error::DomainError;
use tenancy_shared::types::Pagination;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn list_for_tenant(&self, tenant_id: Uuid, page: &Pagination) -> Result<Vec<AuditEvent>, DomainError>;
}
