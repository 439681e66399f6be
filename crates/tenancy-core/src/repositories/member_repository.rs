//! Member repository trait (port)
//!
//! Writes that carry an audit event commit the event row in the same
//! transaction as the membership change.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{AuditEvent, TenantInvite, TenantMember, TenantRole};
use crate::error::DomainError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemberRepository: Send + Sync {
    async fn find(&self, tenant_id: Uuid, user_id: Uuid) -> Result<Option<TenantMember>, DomainError>;
    async fn list(&self, tenant_id: Uuid) -> Result<Vec<TenantMember>, DomainError>;
    async fn count_owners(&self, tenant_id: Uuid) -> Result<i64, DomainError>;
    async fn add(
        &self,
        actor: Uuid,
        member: &TenantMember,
        audit: Option<AuditEvent>,
    ) -> Result<TenantMember, DomainError>;
    async fn update_role(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
        role: TenantRole,
        audit: Option<AuditEvent>,
    ) -> Result<TenantMember, DomainError>;
    async fn remove(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError>;
    /// Promote `to` and demote `from` in one transaction; the tenant is
    /// never observable with zero owners.
    async fn transfer_ownership(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        from: Uuid,
        to: Uuid,
        demoted_role: TenantRole,
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError>;

    /// Effective role from the derived access map (direct membership or
    /// inherited from an ancestor, highest wins).
    async fn effective_role(&self, user_id: Uuid, tenant_id: Uuid) -> Result<Option<TenantRole>, DomainError>;
    /// Recompute the derived access map for every tenant under `root_id`.
    async fn refresh_access(&self, root_id: Uuid) -> Result<u64, DomainError>;

    // --- Invites ---
    async fn create_invite(
        &self,
        actor: Uuid,
        invite: &TenantInvite,
        audit: Option<AuditEvent>,
    ) -> Result<TenantInvite, DomainError>;
    async fn create_invites(
        &self,
        actor: Uuid,
        invites: &[TenantInvite],
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError>;
    async fn find_invite(&self, id: Uuid) -> Result<Option<TenantInvite>, DomainError>;
    /// Mark the invite accepted and create the membership row in the same
    /// transaction.
    async fn accept_invite(
        &self,
        invite_id: Uuid,
        member: &TenantMember,
        audit: Option<AuditEvent>,
    ) -> Result<TenantMember, DomainError>;
    async fn revoke_invite(
        &self,
        actor: Uuid,
        invite_id: Uuid,
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError>;
    async fn list_invites(&self, tenant_id: Uuid) -> Result<Vec<TenantInvite>, DomainError>;
}
