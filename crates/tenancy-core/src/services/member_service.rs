// ============================================================================
// Tenancy Core - Member Service
// File: crates/tenancy-core/src/services/member_service.rs
// ============================================================================
//! Membership, invitations and permission propagation
//!
//! Role changes and removals enforce the last-owner invariant: every tenant
//! keeps at least one owner at all times. Ownership changes hands only via
//! `transfer_ownership`, which swaps both roles in one transaction. The
//! audit event for each change is handed to the repository write and
//! commits with it.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    AuditEvent, Permission, Tenant, TenantInvite, TenantMember, TenantRole,
};
use crate::error::DomainError;
use crate::repositories::{MemberRepository, PermissionRepository, TenantRepository};
use crate::services::cache::CacheManager;
use crate::services::validation_service::ValidationService;

pub struct MemberService<T, M, P>
where
    T: TenantRepository,
    M: MemberRepository,
    P: PermissionRepository,
{
    tenant_repo: Arc<T>,
    member_repo: Arc<M>,
    permission_repo: Arc<P>,
    validation: Arc<ValidationService<T, M>>,
    cache: Arc<CacheManager>,
}

impl<T, M, P> MemberService<T, M, P>
where
    T: TenantRepository,
    M: MemberRepository,
    P: PermissionRepository,
{
    pub fn new(
        tenant_repo: Arc<T>,
        member_repo: Arc<M>,
        permission_repo: Arc<P>,
        validation: Arc<ValidationService<T, M>>,
        cache: Arc<CacheManager>,
    ) -> Self {
        Self { tenant_repo, member_repo, permission_repo, validation, cache }
    }

    async fn require_tenant(&self, id: Uuid) -> Result<Tenant, DomainError> {
        self.tenant_repo
            .find_by_id(id)
            .await?
            .ok_or(DomainError::TenantNotFound(id))
    }

    /// Granting or revoking the owner role is itself an owner-only action;
    /// everything else on the roster takes admin.
    fn roster_threshold(role: TenantRole) -> TenantRole {
        if role == TenantRole::Owner {
            TenantRole::Owner
        } else {
            TenantRole::Admin
        }
    }

    async fn invalidate_roles(&self, tenant_id: Uuid, user_id: Uuid) {
        self.cache.invalidate_containing(&tenant_id.to_string()).await;
        self.cache.invalidate_containing(&user_id.to_string()).await;
    }

    pub async fn list_members(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<TenantMember>, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation.require_role(actor, &tenant, TenantRole::Viewer).await?;
        self.member_repo.list(tenant_id).await
    }

    pub async fn get_effective_role(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<TenantRole>, DomainError> {
        self.validation.resolve_role(user_id, tenant_id).await
    }

    /// Attach a user directly, without the invite flow.
    pub async fn add_member(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
        role: TenantRole,
    ) -> Result<TenantMember, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation
            .require_role(actor, &tenant, Self::roster_threshold(role))
            .await?;

        let member = TenantMember::new(tenant_id, user_id, role, Some(actor));
        let event = AuditEvent::new(
            actor,
            "member_added",
            tenant_id,
            None,
            Some(json!({ "user_id": user_id, "role": role.as_str() })),
        );
        let created = self.member_repo.add(actor, &member, Some(event)).await?;
        self.member_repo.refresh_access(tenant.root_id).await?;
        self.invalidate_roles(tenant_id, user_id).await;
        Ok(created)
    }

    pub async fn invite(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        email: &str,
        role: TenantRole,
    ) -> Result<TenantInvite, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation
            .require_role(actor, &tenant, Self::roster_threshold(role))
            .await?;

        let invite = TenantInvite::new(tenant_id, email.to_string(), role, actor);
        let event = AuditEvent::new(
            actor,
            "invite_created",
            tenant_id,
            None,
            Some(json!({ "email": invite.email, "role": role.as_str() })),
        );
        self.member_repo.create_invite(actor, &invite, Some(event)).await
    }

    /// One transactional batch: either every invite is created or none.
    pub async fn bulk_invite(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        requests: &[(String, TenantRole)],
    ) -> Result<Vec<TenantInvite>, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        let highest = requests
            .iter()
            .map(|(_, role)| *role)
            .fold(TenantRole::Viewer, TenantRole::max);
        self.validation
            .require_role(actor, &tenant, Self::roster_threshold(highest))
            .await?;

        let invites: Vec<TenantInvite> = requests
            .iter()
            .map(|(email, role)| TenantInvite::new(tenant_id, email.clone(), *role, actor))
            .collect();
        let event = AuditEvent::new(
            actor,
            "invites_created",
            tenant_id,
            None,
            Some(json!({ "count": invites.len() })),
        );
        self.member_repo.create_invites(actor, &invites, Some(event)).await?;
        info!(tenant_id = %tenant_id, count = invites.len(), "bulk invites created");
        Ok(invites)
    }

    /// Accepting turns the pending invite into a membership row in one
    /// transaction.
    pub async fn accept_invite(
        &self,
        user_id: Uuid,
        invite_id: Uuid,
    ) -> Result<TenantMember, DomainError> {
        let invite = self
            .member_repo
            .find_invite(invite_id)
            .await?
            .ok_or(DomainError::InviteNotFound(invite_id))?;
        if !invite.is_pending() {
            return Err(DomainError::InvalidTransition {
                reason: format!("invite {invite_id} is {}", invite.status.as_str()),
            });
        }

        let tenant = self.require_tenant(invite.tenant_id).await?;
        let member = TenantMember::new(invite.tenant_id, user_id, invite.role, Some(invite.invited_by));
        let event = AuditEvent::new(
            user_id,
            "invite_accepted",
            invite.tenant_id,
            Some(json!({ "invite_id": invite_id })),
            Some(json!({ "user_id": user_id, "role": invite.role.as_str() })),
        );
        let created = self
            .member_repo
            .accept_invite(invite_id, &member, Some(event))
            .await?;
        self.member_repo.refresh_access(tenant.root_id).await?;
        self.invalidate_roles(invite.tenant_id, user_id).await;
        Ok(created)
    }

    pub async fn revoke_invite(&self, actor: Uuid, invite_id: Uuid) -> Result<(), DomainError> {
        let invite = self
            .member_repo
            .find_invite(invite_id)
            .await?
            .ok_or(DomainError::InviteNotFound(invite_id))?;
        let tenant = self.require_tenant(invite.tenant_id).await?;
        self.validation.require_role(actor, &tenant, TenantRole::Admin).await?;

        let event = AuditEvent::new(
            actor,
            "invite_revoked",
            invite.tenant_id,
            Some(json!({ "invite_id": invite_id, "email": invite.email })),
            None,
        );
        self.member_repo.revoke_invite(actor, invite_id, Some(event)).await
    }

    pub async fn list_invites(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<TenantInvite>, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation.require_role(actor, &tenant, TenantRole::Admin).await?;
        self.member_repo.list_invites(tenant_id).await
    }

    /// Change a member's role. Demoting the only owner is refused: use
    /// `transfer_ownership` instead.
    pub async fn change_role(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
        new_role: TenantRole,
    ) -> Result<TenantMember, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        let member = self
            .member_repo
            .find(tenant_id, user_id)
            .await?
            .ok_or(DomainError::MemberNotFound { tenant_id, user_id })?;

        let threshold = Self::roster_threshold(TenantRole::max(member.role, new_role));
        self.validation.require_role(actor, &tenant, threshold).await?;

        if member.role == new_role {
            return Ok(member);
        }
        if member.is_owner()
            && new_role != TenantRole::Owner
            && self.member_repo.count_owners(tenant_id).await? <= 1
        {
            return Err(DomainError::LastOwnerViolation { tenant_id });
        }

        let event = AuditEvent::new(
            actor,
            "member_role_changed",
            tenant_id,
            Some(json!({ "user_id": user_id, "role": member.role.as_str() })),
            Some(json!({ "user_id": user_id, "role": new_role.as_str() })),
        );
        let updated = self
            .member_repo
            .update_role(actor, tenant_id, user_id, new_role, Some(event))
            .await?;
        self.member_repo.refresh_access(tenant.root_id).await?;
        self.invalidate_roles(tenant_id, user_id).await;
        Ok(updated)
    }

    pub async fn remove_member(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        let member = self
            .member_repo
            .find(tenant_id, user_id)
            .await?
            .ok_or(DomainError::MemberNotFound { tenant_id, user_id })?;

        self.validation
            .require_role(actor, &tenant, Self::roster_threshold(member.role))
            .await?;

        if member.is_owner() && self.member_repo.count_owners(tenant_id).await? <= 1 {
            return Err(DomainError::LastOwnerViolation { tenant_id });
        }

        let event = AuditEvent::new(
            actor,
            "member_removed",
            tenant_id,
            Some(json!({ "user_id": user_id, "role": member.role.as_str() })),
            None,
        );
        self.member_repo.remove(actor, tenant_id, user_id, Some(event)).await?;
        self.member_repo.refresh_access(tenant.root_id).await?;
        self.invalidate_roles(tenant_id, user_id).await;
        Ok(())
    }

    /// Promote `to_user` to owner and demote the acting owner to
    /// `demoted_role`, atomically.
    pub async fn transfer_ownership(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        to_user: Uuid,
        demoted_role: TenantRole,
    ) -> Result<(), DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation.require_role(actor, &tenant, TenantRole::Owner).await?;

        if demoted_role == TenantRole::Owner {
            return Err(DomainError::ValidationError(
                "demoted role must not be owner".to_string(),
            ));
        }
        self.member_repo
            .find(tenant_id, to_user)
            .await?
            .ok_or(DomainError::MemberNotFound { tenant_id, user_id: to_user })?;

        let event = AuditEvent::new(
            actor,
            "ownership_transferred",
            tenant_id,
            Some(json!({ "owner": actor })),
            Some(json!({ "owner": to_user, "demoted_role": demoted_role.as_str() })),
        );
        self.member_repo
            .transfer_ownership(actor, tenant_id, actor, to_user, demoted_role, Some(event))
            .await?;
        self.member_repo.refresh_access(tenant.root_id).await?;
        self.invalidate_roles(tenant_id, actor).await;
        self.invalidate_roles(tenant_id, to_user).await;
        info!(tenant_id = %tenant_id, from = %actor, to = %to_user, "ownership transferred");
        Ok(())
    }

    pub async fn grant_permission(
        &self,
        actor: Uuid,
        permission: &Permission,
    ) -> Result<Permission, DomainError> {
        let tenant = self.require_tenant(permission.tenant_id).await?;
        self.validation.require_role(actor, &tenant, TenantRole::Admin).await?;

        let event = AuditEvent::new(
            actor,
            "permission_granted",
            permission.tenant_id,
            None,
            Some(json!({
                "subject": permission.subject.encode(),
                "resource": permission.resource,
                "action": permission.action,
            })),
        );
        self.permission_repo.grant(actor, permission, Some(event)).await
    }

    pub async fn list_permissions(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
    ) -> Result<Vec<Permission>, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation.require_role(actor, &tenant, TenantRole::Viewer).await?;
        self.permission_repo.list(tenant_id).await
    }

    pub async fn revoke_permission(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation.require_role(actor, &tenant, TenantRole::Admin).await?;
        let event = AuditEvent::new(
            actor,
            "permission_revoked",
            tenant_id,
            Some(json!({ "permission_id": permission_id })),
            None,
        );
        self.permission_repo.revoke(actor, permission_id, Some(event)).await
    }

    /// Retarget `permission` at the tenant and, when `to_descendants`, at
    /// every tenant of its subtree; the batch is written in one
    /// transaction.
    pub async fn propagate_permissions(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        permission: &Permission,
        to_descendants: bool,
    ) -> Result<u64, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation.require_role(actor, &tenant, TenantRole::Admin).await?;

        let mut grants = vec![permission.for_tenant(tenant_id)];
        if to_descendants {
            let descendants = self.tenant_repo.find_descendants(tenant_id, None).await?;
            grants.extend(descendants.iter().map(|d| permission.for_tenant(d.id)));
        }

        let event = AuditEvent::new(
            actor,
            "permissions_propagated",
            tenant_id,
            None,
            Some(json!({
                "subject": permission.subject.encode(),
                "resource": permission.resource,
                "action": permission.action,
                "to_descendants": to_descendants,
                "tenants": grants.len(),
            })),
        );
        self.permission_repo.grant_many(actor, &grants, Some(event)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PermissionSubject, TenantType};
    use crate::repositories::{
        MockMemberRepository, MockPermissionRepository, MockTenantRepository,
    };
    use tenancy_shared::config::HierarchySettings;

    type Svc = MemberService<MockTenantRepository, MockMemberRepository, MockPermissionRepository>;

    struct Fixture {
        tenant_repo: MockTenantRepository,
        member_repo: MockMemberRepository,
        permission_repo: MockPermissionRepository,
        validation_tenant_repo: MockTenantRepository,
        validation_member_repo: MockMemberRepository,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tenant_repo: MockTenantRepository::new(),
                member_repo: MockMemberRepository::new(),
                permission_repo: MockPermissionRepository::new(),
                validation_tenant_repo: MockTenantRepository::new(),
                validation_member_repo: MockMemberRepository::new(),
            }
        }

        fn allow_role(&mut self, role: TenantRole) {
            self.validation_member_repo
                .expect_effective_role()
                .returning(move |_, _| Ok(Some(role)));
        }

        fn with_tenant(&mut self, tenant: &Tenant) {
            let t = tenant.clone();
            self.tenant_repo
                .expect_find_by_id()
                .returning(move |_| Ok(Some(t.clone())));
        }

        fn build(self) -> Svc {
            let cache = Arc::new(CacheManager::new(120, 60));
            let validation = Arc::new(ValidationService::new(
                Arc::new(self.validation_tenant_repo),
                Arc::new(self.validation_member_repo),
                cache.clone(),
                HierarchySettings {
                    default_max_depth: 5,
                    max_children_per_parent: 100,
                    global_slug_scope: false,
                },
            ));
            MemberService::new(
                Arc::new(self.tenant_repo),
                Arc::new(self.member_repo),
                Arc::new(self.permission_repo),
                validation,
                cache,
            )
        }
    }

    fn tenant() -> Tenant {
        Tenant::new_root("Acme".into(), "acme".into(), TenantType::Workspace, serde_json::json!({}), 5, None)
            .unwrap()
    }

    fn audit_op(audit: &Option<AuditEvent>, operation: &str) -> bool {
        audit.as_ref().is_some_and(|e| e.operation == operation)
    }

    #[tokio::test]
    async fn test_demoting_last_owner_is_refused() {
        let mut fx = Fixture::new();
        let t = tenant();
        let owner = Uuid::new_v4();
        fx.with_tenant(&t);
        fx.allow_role(TenantRole::Owner);
        let m = TenantMember::new_owner(t.id, owner);
        fx.member_repo.expect_find().returning(move |_, _| Ok(Some(m.clone())));
        fx.member_repo.expect_count_owners().returning(|_| Ok(1));
        // No update_role expectation: nothing may be written.

        let svc = fx.build();
        let err = svc
            .change_role(owner, t.id, owner, TenantRole::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::LastOwnerViolation { .. }));
    }

    #[tokio::test]
    async fn test_demoting_one_of_two_owners_succeeds() {
        let mut fx = Fixture::new();
        let t = tenant();
        let owner = Uuid::new_v4();
        fx.with_tenant(&t);
        fx.allow_role(TenantRole::Owner);
        let m = TenantMember::new_owner(t.id, owner);
        fx.member_repo.expect_find().returning(move |_, _| Ok(Some(m.clone())));
        fx.member_repo.expect_count_owners().returning(|_| Ok(2));
        fx.member_repo
            .expect_update_role()
            .withf(|_, _, _, role, audit| {
                *role == TenantRole::Admin && audit_op(audit, "member_role_changed")
            })
            .times(1)
            .returning(|_, tenant_id, user_id, role, _| {
                Ok(TenantMember::new(tenant_id, user_id, role, None))
            });
        fx.member_repo.expect_refresh_access().returning(|_| Ok(0));

        let svc = fx.build();
        let updated = svc
            .change_role(Uuid::new_v4(), t.id, owner, TenantRole::Admin)
            .await
            .unwrap();
        assert_eq!(updated.role, TenantRole::Admin);
    }

    #[tokio::test]
    async fn test_removing_last_owner_is_refused() {
        let mut fx = Fixture::new();
        let t = tenant();
        let owner = Uuid::new_v4();
        fx.with_tenant(&t);
        fx.allow_role(TenantRole::Owner);
        let m = TenantMember::new_owner(t.id, owner);
        fx.member_repo.expect_find().returning(move |_, _| Ok(Some(m.clone())));
        fx.member_repo.expect_count_owners().returning(|_| Ok(1));

        let svc = fx.build();
        let err = svc.remove_member(Uuid::new_v4(), t.id, owner).await.unwrap_err();
        assert!(matches!(err, DomainError::LastOwnerViolation { .. }));
    }

    #[tokio::test]
    async fn test_transfer_ownership_swaps_roles_atomically() {
        let mut fx = Fixture::new();
        let t = tenant();
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();
        fx.with_tenant(&t);
        fx.allow_role(TenantRole::Owner);
        let m = TenantMember::new(t.id, to, TenantRole::Member, None);
        fx.member_repo.expect_find().returning(move |_, _| Ok(Some(m.clone())));
        fx.member_repo
            .expect_transfer_ownership()
            .withf(move |_, _, f, tto, demoted, audit| {
                *f == from
                    && *tto == to
                    && *demoted == TenantRole::Admin
                    && audit_op(audit, "ownership_transferred")
            })
            .times(1)
            .returning(|_, _, _, _, _, _| Ok(()));
        fx.member_repo.expect_refresh_access().returning(|_| Ok(0));

        let svc = fx.build();
        svc.transfer_ownership(from, t.id, to, TenantRole::Admin).await.unwrap();
    }

    #[tokio::test]
    async fn test_transfer_to_owner_role_rejected() {
        let mut fx = Fixture::new();
        let t = tenant();
        fx.with_tenant(&t);
        fx.allow_role(TenantRole::Owner);

        let svc = fx.build();
        let err = svc
            .transfer_ownership(Uuid::new_v4(), t.id, Uuid::new_v4(), TenantRole::Owner)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_granting_owner_requires_owner() {
        let mut fx = Fixture::new();
        let t = tenant();
        fx.with_tenant(&t);
        fx.allow_role(TenantRole::Admin);

        let svc = fx.build();
        let err = svc
            .add_member(Uuid::new_v4(), t.id, Uuid::new_v4(), TenantRole::Owner)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientPermission { .. }));
    }

    #[tokio::test]
    async fn test_accept_invite_rejects_non_pending() {
        let mut fx = Fixture::new();
        let t = tenant();
        let mut invite = TenantInvite::new(t.id, "dev@acme.io".into(), TenantRole::Member, Uuid::new_v4());
        invite.status = crate::domain::InviteStatus::Revoked;
        let inv = invite.clone();
        fx.member_repo.expect_find_invite().returning(move |_| Ok(Some(inv.clone())));

        let svc = fx.build();
        let err = svc.accept_invite(Uuid::new_v4(), invite.id).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_accept_invite_creates_membership() {
        let mut fx = Fixture::new();
        let t = tenant();
        let user = Uuid::new_v4();
        let invite = TenantInvite::new(t.id, "dev@acme.io".into(), TenantRole::Member, Uuid::new_v4());
        let inv = invite.clone();
        fx.with_tenant(&t);
        fx.member_repo.expect_find_invite().returning(move |_| Ok(Some(inv.clone())));
        fx.member_repo
            .expect_accept_invite()
            .withf(move |_, m, audit| {
                m.user_id == user
                    && m.role == TenantRole::Member
                    && audit_op(audit, "invite_accepted")
            })
            .times(1)
            .returning(|_, m, _| Ok(m.clone()));
        fx.member_repo.expect_refresh_access().returning(|_| Ok(0));

        let svc = fx.build();
        let member = svc.accept_invite(user, invite.id).await.unwrap();
        assert_eq!(member.tenant_id, t.id);
    }

    #[tokio::test]
    async fn test_propagate_permissions_covers_subtree() {
        let mut fx = Fixture::new();
        let t = tenant();
        let child = Tenant::new_child(
            &t,
            "Team".into(),
            "team".into(),
            TenantType::Team,
            serde_json::json!({}),
            None,
        )
        .unwrap();
        fx.with_tenant(&t);
        fx.allow_role(TenantRole::Admin);
        let c = child.clone();
        fx.tenant_repo
            .expect_find_descendants()
            .returning(move |_, _| Ok(vec![c.clone()]));
        fx.permission_repo
            .expect_grant_many()
            .withf(|_, grants, audit| {
                grants.len() == 2 && audit_op(audit, "permissions_propagated")
            })
            .times(1)
            .returning(|_, grants, _| Ok(grants.len() as u64));

        let svc = fx.build();
        let perm = Permission::new(
            t.id,
            PermissionSubject::Role(TenantRole::Member),
            "reports".into(),
            "read".into(),
            None,
        );
        let written = svc
            .propagate_permissions(Uuid::new_v4(), t.id, &perm, true)
            .await
            .unwrap();
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn test_propagate_without_descendants_targets_only_the_tenant() {
        let mut fx = Fixture::new();
        let t = tenant();
        fx.with_tenant(&t);
        fx.allow_role(TenantRole::Admin);
        // No find_descendants expectation: the subtree is never walked.
        let tenant_id = t.id;
        fx.permission_repo
            .expect_grant_many()
            .withf(move |_, grants, _| grants.len() == 1 && grants[0].tenant_id == tenant_id)
            .times(1)
            .returning(|_, grants, _| Ok(grants.len() as u64));

        let svc = fx.build();
        let perm = Permission::new(
            t.id,
            PermissionSubject::Role(TenantRole::Member),
            "reports".into(),
            "read".into(),
            None,
        );
        let written = svc
            .propagate_permissions(Uuid::new_v4(), t.id, &perm, false)
            .await
            .unwrap();
        assert_eq!(written, 1);
    }
}
