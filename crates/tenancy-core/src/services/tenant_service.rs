// ============================================================================
// Tenancy Core - Tenant Service
// File: crates/tenancy-core/src/services/tenant_service.rs
// ============================================================================
//! Tenant CRUD facade
//!
//! Creation and updates follow the same shape everywhere: validate against
//! live data, mutate through the repository with the audit event riding in
//! the same transaction, invalidate the caches keyed on the touched ids.
//! Structural changes live in the lifecycle service; roster changes in the
//! member service.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    AuditEvent, Tenant, TenantFilter, TenantMember, TenantPatch, TenantRole, TenantType,
};
use crate::error::DomainError;
use crate::repositories::{AuditRepository, MemberRepository, TenantRepository};
use crate::services::cache::CacheManager;
use crate::services::validation_service::ValidationService;
use tenancy_shared::constants::MAX_TREE_DEPTH;
use tenancy_shared::types::Pagination;

pub struct NewTenant {
    pub name: String,
    pub slug: String,
    pub tenant_type: TenantType,
    pub settings: serde_json::Value,
}

pub struct TenantService<T, M, A>
where
    T: TenantRepository,
    M: MemberRepository,
    A: AuditRepository,
{
    tenant_repo: Arc<T>,
    member_repo: Arc<M>,
    audit_repo: Arc<A>,
    validation: Arc<ValidationService<T, M>>,
    cache: Arc<CacheManager>,
    default_max_depth: i32,
}

impl<T, M, A> TenantService<T, M, A>
where
    T: TenantRepository,
    M: MemberRepository,
    A: AuditRepository,
{
    pub fn new(
        tenant_repo: Arc<T>,
        member_repo: Arc<M>,
        audit_repo: Arc<A>,
        validation: Arc<ValidationService<T, M>>,
        cache: Arc<CacheManager>,
        default_max_depth: i32,
    ) -> Self {
        Self { tenant_repo, member_repo, audit_repo, validation, cache, default_max_depth }
    }

    async fn require_tenant(&self, id: Uuid) -> Result<Tenant, DomainError> {
        self.tenant_repo
            .find_by_id(id)
            .await?
            .ok_or(DomainError::TenantNotFound(id))
    }

    /// Create a top-level tenant; the creator becomes its sole owner.
    /// The audit event rides with the owner row, the final write, so it
    /// only exists once the whole creation succeeded.
    pub async fn create_root_tenant(
        &self,
        actor: Uuid,
        req: NewTenant,
        max_depth: Option<i32>,
    ) -> Result<Tenant, DomainError> {
        let name = self.validation.validate_name(&req.name)?;
        let slug = self.validation.validate_slug(&req.slug, None).await?;

        let max_depth = max_depth.unwrap_or(self.default_max_depth);
        if max_depth < 0 || max_depth > MAX_TREE_DEPTH {
            return Err(DomainError::ValidationError(format!(
                "max depth must be between 0 and {MAX_TREE_DEPTH}"
            )));
        }

        let tenant = Tenant::new_root(name, slug, req.tenant_type, req.settings, max_depth, Some(actor))
            .map_err(|e| DomainError::ValidationError(e.to_string()))?;

        let created = self.tenant_repo.insert(actor, &tenant, None).await?;
        let event = AuditEvent::new(
            actor,
            "tenant_created",
            created.id,
            None,
            Some(json!({ "slug": created.slug, "parent_id": null })),
        );
        self.member_repo
            .add(actor, &TenantMember::new_owner(created.id, actor), Some(event))
            .await?;
        self.member_repo.refresh_access(created.id).await?;
        info!(tenant_id = %created.id, slug = %created.slug, "root tenant created");
        Ok(created)
    }

    /// Create a child under `parent_id`. The child inherits the parent's
    /// root, depth ceiling and, through the access map, its member roles.
    pub async fn create_child_tenant(
        &self,
        actor: Uuid,
        parent_id: Uuid,
        req: NewTenant,
    ) -> Result<Tenant, DomainError> {
        let parent = self.require_tenant(parent_id).await?;
        if parent.is_archived() {
            return Err(DomainError::InvalidTransition {
                reason: format!("cannot create under archived tenant {parent_id}"),
            });
        }
        self.validation.can_create(actor, &parent).await?;

        let name = self.validation.validate_name(&req.name)?;
        let slug = self.validation.validate_slug(&req.slug, Some(parent_id)).await?;
        self.validation.validate_depth(&parent)?;
        self.validation.validate_child_quota(parent_id).await?;

        let tenant = Tenant::new_child(&parent, name, slug, req.tenant_type, req.settings, Some(actor))
            .map_err(|e| DomainError::ValidationError(e.to_string()))?;

        let event = AuditEvent::new(
            actor,
            "tenant_created",
            tenant.id,
            None,
            Some(json!({ "slug": tenant.slug, "parent_id": parent.id })),
        );
        let created = self.tenant_repo.insert(actor, &tenant, Some(event)).await?;
        self.member_repo.refresh_access(parent.root_id).await?;
        self.cache.invalidate_containing(&parent.id.to_string()).await;
        info!(tenant_id = %created.id, parent_id = %parent.id, "child tenant created");
        Ok(created)
    }

    pub async fn get_tenant(&self, actor: Uuid, tenant_id: Uuid) -> Result<Tenant, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation.require_role(actor, &tenant, TenantRole::Viewer).await?;
        Ok(tenant)
    }

    /// Slug lookup in one sibling scope: `None` means the root namespace.
    pub async fn get_by_slug(
        &self,
        actor: Uuid,
        parent_id: Option<Uuid>,
        slug: &str,
    ) -> Result<Tenant, DomainError> {
        let normalized = self.validation.validate_slug_format(slug)?;
        let tenant = self
            .tenant_repo
            .find_child_by_slug(parent_id, &normalized)
            .await?
            .ok_or_else(|| DomainError::ValidationError(format!("no tenant with slug {normalized}")))?;
        self.validation.require_role(actor, &tenant, TenantRole::Viewer).await?;
        Ok(tenant)
    }

    /// Filtered listing; row-level security scopes the result to what the
    /// session user can see.
    pub async fn list_tenants(
        &self,
        filter: &TenantFilter,
        pagination: &Pagination,
    ) -> Result<Vec<Tenant>, DomainError> {
        self.tenant_repo.list(filter, pagination).await
    }

    pub async fn search_tenants(
        &self,
        query: &str,
        pagination: &Pagination,
    ) -> Result<Vec<Tenant>, DomainError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        self.tenant_repo.search(trimmed, pagination).await
    }

    /// The tenant's audit history, newest first.
    pub async fn audit_trail(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Vec<AuditEvent>, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation.require_role(actor, &tenant, TenantRole::Admin).await?;
        self.audit_repo.list_for_tenant(tenant_id, pagination).await
    }

    /// Apply a partial update. The slug is only re-validated when it
    /// actually changes; renames never touch structure.
    pub async fn update_tenant(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        patch: TenantPatch,
    ) -> Result<Tenant, DomainError> {
        let mut tenant = self.require_tenant(tenant_id).await?;
        self.validation.can_update(actor, &tenant).await?;

        let before = json!({
            "name": tenant.name,
            "slug": tenant.slug,
            "tenant_type": tenant.tenant_type.as_str(),
        });

        if let Some(name) = &patch.name {
            tenant.name = self.validation.validate_name(name)?;
        }
        if let Some(slug) = &patch.slug {
            let normalized = self.validation.validate_slug_format(slug)?;
            if normalized != tenant.slug {
                tenant.slug = self.validation.validate_slug(slug, tenant.parent_id).await?;
            }
        }
        if let Some(tenant_type) = patch.tenant_type {
            tenant.tenant_type = tenant_type;
        }
        if let Some(settings) = patch.settings {
            tenant.settings = settings;
        }
        tenant.touch();

        let event = AuditEvent::new(
            actor,
            "tenant_updated",
            tenant_id,
            Some(before),
            Some(json!({
                "name": tenant.name,
                "slug": tenant.slug,
                "tenant_type": tenant.tenant_type.as_str(),
            })),
        );
        let updated = self.tenant_repo.update(actor, &tenant, Some(event)).await?;
        self.cache.invalidate_containing(&tenant_id.to_string()).await;
        Ok(updated)
    }

    /// Shallow settings merge; incoming keys win, others survive.
    pub async fn update_settings(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        settings: serde_json::Value,
    ) -> Result<Tenant, DomainError> {
        let mut tenant = self.require_tenant(tenant_id).await?;
        self.validation.can_update(actor, &tenant).await?;

        let before = tenant.settings.clone();
        tenant.settings = match (tenant.settings.as_object(), settings.as_object()) {
            (Some(current), Some(incoming)) => {
                let mut merged = current.clone();
                for (k, v) in incoming {
                    merged.insert(k.clone(), v.clone());
                }
                serde_json::Value::Object(merged)
            }
            _ => settings,
        };
        tenant.touch();

        let event = AuditEvent::new(
            actor,
            "tenant_settings_updated",
            tenant_id,
            Some(before),
            Some(tenant.settings.clone()),
        );
        let updated = self.tenant_repo.update(actor, &tenant, Some(event)).await?;
        self.cache.invalidate_containing(&tenant_id.to_string()).await;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{
        MockAuditRepository, MockMemberRepository, MockTenantRepository,
    };
    use tenancy_shared::config::HierarchySettings;

    type Svc = TenantService<MockTenantRepository, MockMemberRepository, MockAuditRepository>;

    struct Fixture {
        tenant_repo: MockTenantRepository,
        member_repo: MockMemberRepository,
        validation_tenant_repo: MockTenantRepository,
        validation_member_repo: MockMemberRepository,
        audit_repo: MockAuditRepository,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tenant_repo: MockTenantRepository::new(),
                member_repo: MockMemberRepository::new(),
                validation_tenant_repo: MockTenantRepository::new(),
                validation_member_repo: MockMemberRepository::new(),
                audit_repo: MockAuditRepository::new(),
            }
        }

        fn allow_role(&mut self, role: TenantRole) {
            self.validation_member_repo
                .expect_effective_role()
                .returning(move |_, _| Ok(Some(role)));
        }

        fn build(self) -> Svc {
            let cache = Arc::new(CacheManager::new(120, 60));
            let validation = Arc::new(ValidationService::new(
                Arc::new(self.validation_tenant_repo),
                Arc::new(self.validation_member_repo),
                cache.clone(),
                HierarchySettings {
                    default_max_depth: 5,
                    max_children_per_parent: 3,
                    global_slug_scope: false,
                },
            ));
            TenantService::new(
                Arc::new(self.tenant_repo),
                Arc::new(self.member_repo),
                Arc::new(self.audit_repo),
                validation,
                cache,
                5,
            )
        }
    }

    fn req(name: &str, slug: &str) -> NewTenant {
        NewTenant {
            name: name.to_string(),
            slug: slug.to_string(),
            tenant_type: TenantType::Workspace,
            settings: json!({}),
        }
    }

    fn root() -> Tenant {
        Tenant::new_root("Acme".into(), "acme".into(), TenantType::Workspace, json!({}), 5, None)
            .unwrap()
    }

    fn audit_op(audit: &Option<AuditEvent>, operation: &str) -> bool {
        audit.as_ref().is_some_and(|e| e.operation == operation)
    }

    #[tokio::test]
    async fn test_create_root_makes_creator_sole_owner() {
        let mut fx = Fixture::new();
        let actor = Uuid::new_v4();
        fx.validation_tenant_repo
            .expect_find_child_by_slug()
            .returning(|_, _| Ok(None));
        fx.tenant_repo
            .expect_insert()
            .withf(|_, t, audit| {
                t.is_root() && t.slug == "acme" && t.level == 0 && audit.is_none()
            })
            .times(1)
            .returning(|_, t, _| Ok(t.clone()));
        fx.member_repo
            .expect_add()
            .withf(move |_, m, audit| {
                m.user_id == actor && m.is_owner() && audit_op(audit, "tenant_created")
            })
            .times(1)
            .returning(|_, m, _| Ok(m.clone()));
        fx.member_repo.expect_refresh_access().returning(|_| Ok(1));

        let svc = fx.build();
        let t = svc.create_root_tenant(actor, req("Acme", "Acme"), None).await.unwrap();
        assert_eq!(t.root_id, t.id);
        assert_eq!(t.max_depth, 5);
        assert_eq!(t.created_by, Some(actor));
    }

    #[tokio::test]
    async fn test_create_child_rejects_duplicate_sibling_slug() {
        let mut fx = Fixture::new();
        let parent = root();
        let existing = Tenant::new_child(
            &parent, "Team".into(), "team".into(), TenantType::Team, json!({}), None,
        )
        .unwrap();

        let p = parent.clone();
        fx.tenant_repo.expect_find_by_id().returning(move |_| Ok(Some(p.clone())));
        fx.allow_role(TenantRole::Admin);
        fx.validation_tenant_repo
            .expect_find_child_by_slug()
            .returning(move |_, _| Ok(Some(existing.clone())));
        // No insert expectation: creation must not reach the repository.

        let svc = fx.build();
        let err = svc
            .create_child_tenant(Uuid::new_v4(), parent.id, req("Team", "team"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DuplicateSlug { .. }));
    }

    #[tokio::test]
    async fn test_create_child_rejects_archived_parent() {
        let mut fx = Fixture::new();
        let mut parent = root();
        parent.archive();
        let p = parent.clone();
        fx.tenant_repo.expect_find_by_id().returning(move |_| Ok(Some(p.clone())));

        let svc = fx.build();
        let err = svc
            .create_child_tenant(Uuid::new_v4(), parent.id, req("Team", "team"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_create_child_enforces_depth_ceiling() {
        let mut fx = Fixture::new();
        let mut parent = root();
        parent.level = 5;

        let p = parent.clone();
        fx.tenant_repo.expect_find_by_id().returning(move |_| Ok(Some(p.clone())));
        fx.allow_role(TenantRole::Admin);
        fx.validation_tenant_repo
            .expect_find_child_by_slug()
            .returning(|_, _| Ok(None));

        let svc = fx.build();
        let err = svc
            .create_child_tenant(Uuid::new_v4(), parent.id, req("Deep", "deep"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DepthExceeded { level: 6, max_depth: 5 }));
    }

    #[tokio::test]
    async fn test_create_child_enforces_quota() {
        let mut fx = Fixture::new();
        let parent = root();
        let p = parent.clone();
        fx.tenant_repo.expect_find_by_id().returning(move |_| Ok(Some(p.clone())));
        fx.allow_role(TenantRole::Admin);
        fx.validation_tenant_repo
            .expect_find_child_by_slug()
            .returning(|_, _| Ok(None));
        // Fixture limit is 3 children per parent.
        fx.validation_tenant_repo.expect_count_children().returning(|_| Ok(3));

        let svc = fx.build();
        let err = svc
            .create_child_tenant(Uuid::new_v4(), parent.id, req("Team", "team"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn test_update_skips_slug_check_when_unchanged() {
        let mut fx = Fixture::new();
        let t = root();
        let tc = t.clone();
        fx.tenant_repo.expect_find_by_id().returning(move |_| Ok(Some(tc.clone())));
        fx.allow_role(TenantRole::Admin);
        // No find_child_by_slug expectation: the unchanged slug must not
        // trigger a uniqueness query.
        fx.tenant_repo
            .expect_update()
            .withf(|_, t, audit| {
                t.name == "Acme Corp" && t.updated_at.is_some() && audit_op(audit, "tenant_updated")
            })
            .times(1)
            .returning(|_, t, _| Ok(t.clone()));

        let svc = fx.build();
        let patch = TenantPatch {
            name: Some("Acme Corp".into()),
            slug: Some("ACME".into()),
            ..Default::default()
        };
        let updated = svc.update_tenant(Uuid::new_v4(), t.id, patch).await.unwrap();
        assert_eq!(updated.slug, "acme");
    }

    #[tokio::test]
    async fn test_update_settings_shallow_merge() {
        let mut fx = Fixture::new();
        let mut t = root();
        t.settings = json!({ "theme": "dark", "locale": "en" });
        let tc = t.clone();
        fx.tenant_repo.expect_find_by_id().returning(move |_| Ok(Some(tc.clone())));
        fx.allow_role(TenantRole::Admin);
        fx.tenant_repo
            .expect_update()
            .withf(|_, _, audit| audit_op(audit, "tenant_settings_updated"))
            .returning(|_, t, _| Ok(t.clone()));

        let svc = fx.build();
        let updated = svc
            .update_settings(Uuid::new_v4(), t.id, json!({ "theme": "light" }))
            .await
            .unwrap();
        assert_eq!(updated.settings, json!({ "theme": "light", "locale": "en" }));
    }

    #[tokio::test]
    async fn test_audit_trail_requires_admin() {
        let mut fx = Fixture::new();
        let t = root();
        let tc = t.clone();
        fx.tenant_repo.expect_find_by_id().returning(move |_| Ok(Some(tc.clone())));
        fx.allow_role(TenantRole::Member);
        // No list_for_tenant expectation: the read must be refused first.

        let svc = fx.build();
        let err = svc
            .audit_trail(Uuid::new_v4(), t.id, &Pagination::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InsufficientPermission { .. }));
    }

    #[tokio::test]
    async fn test_audit_trail_lists_events() {
        let mut fx = Fixture::new();
        let t = root();
        let tc = t.clone();
        fx.tenant_repo.expect_find_by_id().returning(move |_| Ok(Some(tc.clone())));
        fx.allow_role(TenantRole::Admin);
        let tenant_id = t.id;
        fx.audit_repo
            .expect_list_for_tenant()
            .withf(move |id, _| *id == tenant_id)
            .times(1)
            .returning(move |id, _| {
                Ok(vec![AuditEvent::new(Uuid::new_v4(), "tenant_created", id, None, None)])
            });

        let svc = fx.build();
        let events = svc
            .audit_trail(Uuid::new_v4(), t.id, &Pagination::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, "tenant_created");
    }

    #[tokio::test]
    async fn test_search_empty_query_short_circuits() {
        let fx = Fixture::new();
        let svc = fx.build();
        let hits = svc.search_tenants("   ", &Pagination::default()).await.unwrap();
        assert!(hits.is_empty());
    }
}
