// ============================================================================
// Tenancy Core - Validation Service
// File: crates/tenancy-core/src/services/validation_service.rs
// ============================================================================
//! Schema and business-rule validation
//!
//! Pure decision logic: reads through the repositories to check existence,
//! uniqueness and role facts, never mutates. Every check is performed
//! before the mutating transaction opens. Slug uniqueness is re-checked
//! against live data, never the cache, because it gates an insert.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::domain::{Tenant, TenantRole};
use crate::error::DomainError;
use crate::repositories::{MemberRepository, TenantRepository};
use crate::services::cache::CacheManager;
use tenancy_shared::config::HierarchySettings;
use tenancy_shared::utils::{is_slug_charset, normalize_slug};

const ROLE_CACHE_OP: &str = "effective_role";

pub struct ValidationService<T: TenantRepository, M: MemberRepository> {
    tenant_repo: Arc<T>,
    member_repo: Arc<M>,
    cache: Arc<CacheManager>,
    settings: HierarchySettings,
}

impl<T: TenantRepository, M: MemberRepository> ValidationService<T, M> {
    pub fn new(
        tenant_repo: Arc<T>,
        member_repo: Arc<M>,
        cache: Arc<CacheManager>,
        settings: HierarchySettings,
    ) -> Self {
        Self { tenant_repo, member_repo, cache, settings }
    }

    pub fn settings(&self) -> &HierarchySettings {
        &self.settings
    }

    /// Naming-convention check; returns the trimmed name.
    pub fn validate_name(&self, name: &str) -> Result<String, DomainError> {
        let trimmed = name.trim();
        if trimmed.len() < 2 || trimmed.len() > 100 {
            return Err(DomainError::InvalidName(format!(
                "name must be between 2 and 100 characters, got {}",
                trimmed.len()
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Character/length rules only; no storage access.
    pub fn validate_slug_format(&self, slug: &str) -> Result<String, DomainError> {
        let normalized = normalize_slug(slug);
        if normalized.len() < 2 || normalized.len() > 100 {
            return Err(DomainError::InvalidSlug(format!(
                "slug must be between 2 and 100 characters, got {}",
                normalized.len()
            )));
        }
        if !is_slug_charset(&normalized) {
            return Err(DomainError::InvalidSlug(
                "slug may only contain lowercase letters, digits and hyphens".to_string(),
            ));
        }
        Ok(normalized)
    }

    /// Full slug validation: format plus live uniqueness among the siblings
    /// of `parent_id` (or the whole workspace when `global_slug_scope` is
    /// configured). Returns the normalized slug.
    pub async fn validate_slug(
        &self,
        slug: &str,
        parent_id: Option<Uuid>,
    ) -> Result<String, DomainError> {
        let normalized = self.validate_slug_format(slug)?;

        let existing = if self.settings.global_slug_scope {
            self.tenant_repo.find_by_slug(&normalized).await?
        } else {
            self.tenant_repo.find_child_by_slug(parent_id, &normalized).await?
        };

        if let Some(t) = existing {
            warn!(slug = %normalized, tenant_id = %t.id, "slug already in use");
            return Err(DomainError::DuplicateSlug { slug: normalized });
        }
        Ok(normalized)
    }

    /// A new child under `parent` would sit at `parent.level + 1`.
    pub fn validate_depth(&self, parent: &Tenant) -> Result<(), DomainError> {
        let level = parent.level + 1;
        if level > parent.max_depth {
            return Err(DomainError::DepthExceeded { level, max_depth: parent.max_depth });
        }
        Ok(())
    }

    /// Depth check for a subtree move: the deepest descendant must stay
    /// within the destination tree's ceiling.
    /// `deepest_level` is the current deepest absolute level under `tenant`.
    pub fn validate_move_depth(
        &self,
        tenant: &Tenant,
        new_parent: &Tenant,
        deepest_level: i32,
    ) -> Result<(), DomainError> {
        let subtree_height = deepest_level - tenant.level;
        let new_deepest = new_parent.level + 1 + subtree_height;
        if new_deepest > new_parent.max_depth {
            return Err(DomainError::DepthExceeded {
                level: new_deepest,
                max_depth: new_parent.max_depth,
            });
        }
        Ok(())
    }

    /// Checked via path containment, not pointer traversal: the proposed
    /// parent must not be the node itself nor sit inside its subtree.
    pub fn validate_circular_reference(
        &self,
        tenant: &Tenant,
        proposed_parent: &Tenant,
    ) -> Result<(), DomainError> {
        if proposed_parent.id == tenant.id || proposed_parent.is_descendant_of(&tenant.id) {
            return Err(DomainError::CircularReference { tenant_id: tenant.id });
        }
        Ok(())
    }

    pub async fn validate_child_quota(&self, parent_id: Uuid) -> Result<(), DomainError> {
        let count = self.tenant_repo.count_children(parent_id).await?;
        if count >= self.settings.max_children_per_parent {
            return Err(DomainError::QuotaExceeded {
                reason: format!(
                    "parent {parent_id} already has {count} children (limit {})",
                    self.settings.max_children_per_parent
                ),
            });
        }
        Ok(())
    }

    /// Resolve the acting user's effective role on a tenant, memoized for
    /// the role-cache TTL.
    pub async fn resolve_role(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<TenantRole>, DomainError> {
        let args = format!("{user_id}:{tenant_id}");
        if let Some(cached) = self.cache.get(ROLE_CACHE_OP, &args).await {
            let role = cached.as_str().and_then(TenantRole::from_str);
            return Ok(role);
        }

        let role = self.member_repo.effective_role(user_id, tenant_id).await?;
        let value = match role {
            Some(r) => serde_json::Value::String(r.as_str().to_string()),
            None => serde_json::Value::String(String::new()),
        };
        self.cache.put(ROLE_CACHE_OP, &args, value, self.cache.role_ttl()).await;
        Ok(role)
    }

    pub async fn require_role(
        &self,
        user_id: Uuid,
        tenant: &Tenant,
        minimum: TenantRole,
    ) -> Result<TenantRole, DomainError> {
        let role = self.resolve_role(user_id, tenant.id).await?.ok_or(
            DomainError::InsufficientPermission { user_id, tenant_id: tenant.id },
        )?;
        if !role.satisfies(minimum) {
            return Err(DomainError::InsufficientPermission { user_id, tenant_id: tenant.id });
        }
        Ok(role)
    }

    pub async fn can_create(&self, user_id: Uuid, parent: &Tenant) -> Result<(), DomainError> {
        self.require_role(user_id, parent, TenantRole::Admin).await.map(|_| ())
    }

    pub async fn can_update(&self, user_id: Uuid, tenant: &Tenant) -> Result<(), DomainError> {
        self.require_role(user_id, tenant, TenantRole::Admin).await.map(|_| ())
    }

    pub async fn can_delete(&self, user_id: Uuid, tenant: &Tenant) -> Result<(), DomainError> {
        self.require_role(user_id, tenant, TenantRole::Owner).await.map(|_| ())
    }

    pub async fn can_move(&self, user_id: Uuid, tenant: &Tenant) -> Result<(), DomainError> {
        self.require_role(user_id, tenant, TenantRole::Owner).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TenantType;
    use crate::repositories::{MockMemberRepository, MockTenantRepository};
    use serde_json::json;

    fn settings() -> HierarchySettings {
        HierarchySettings {
            default_max_depth: 5,
            max_children_per_parent: 3,
            global_slug_scope: false,
        }
    }

    fn service(
        tenant_repo: MockTenantRepository,
        member_repo: MockMemberRepository,
    ) -> ValidationService<MockTenantRepository, MockMemberRepository> {
        ValidationService::new(
            Arc::new(tenant_repo),
            Arc::new(member_repo),
            Arc::new(CacheManager::new(120, 60)),
            settings(),
        )
    }

    fn root() -> Tenant {
        Tenant::new_root("Acme".into(), "acme".into(), TenantType::Workspace, json!({}), 5, None).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let mut tenant_repo = MockTenantRepository::new();
        let existing = root();
        tenant_repo
            .expect_find_child_by_slug()
            .returning(move |_, _| Ok(Some(existing.clone())));

        let svc = service(tenant_repo, MockMemberRepository::new());
        let err = svc.validate_slug("Acme", None).await.unwrap_err();
        assert!(matches!(err, DomainError::DuplicateSlug { .. }));
    }

    #[tokio::test]
    async fn test_slug_normalized_and_checked_live() {
        let mut tenant_repo = MockTenantRepository::new();
        tenant_repo
            .expect_find_child_by_slug()
            .withf(|_, slug| slug == "my-team")
            .returning(|_, _| Ok(None));

        let svc = service(tenant_repo, MockMemberRepository::new());
        let slug = svc.validate_slug("  My Team ", Some(Uuid::new_v4())).await.unwrap();
        assert_eq!(slug, "my-team");
    }

    #[tokio::test]
    async fn test_slug_bad_charset_rejected_without_lookup() {
        let svc = service(MockTenantRepository::new(), MockMemberRepository::new());
        let err = svc.validate_slug("bad/slug!", None).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidSlug(_)));
    }

    #[test]
    fn test_depth_exceeded() {
        let svc = service(MockTenantRepository::new(), MockMemberRepository::new());
        let mut parent = root();
        parent.level = 5;
        parent.max_depth = 5;
        let err = svc.validate_depth(&parent).unwrap_err();
        assert!(matches!(err, DomainError::DepthExceeded { level: 6, max_depth: 5 }));
    }

    #[test]
    fn test_move_depth_counts_whole_subtree() {
        let svc = service(MockTenantRepository::new(), MockMemberRepository::new());
        let moved = root();
        let mut dest = root();
        dest.level = 3;
        dest.max_depth = 5;
        // Subtree of height 2 landing at level 4 would reach level 6.
        let err = svc.validate_move_depth(&moved, &dest, moved.level + 2).unwrap_err();
        assert!(matches!(err, DomainError::DepthExceeded { level: 6, .. }));
        // Height 1 fits exactly.
        assert!(svc.validate_move_depth(&moved, &dest, moved.level + 1).is_ok());
    }

    #[test]
    fn test_circular_reference() {
        let svc = service(MockTenantRepository::new(), MockMemberRepository::new());
        let r = root();
        let child = Tenant::new_child(&r, "Team".into(), "team".into(), TenantType::Team, json!({}), None).unwrap();

        // A node under itself, and under its own descendant, both fail.
        assert!(matches!(
            svc.validate_circular_reference(&r, &r),
            Err(DomainError::CircularReference { .. })
        ));
        assert!(matches!(
            svc.validate_circular_reference(&r, &child),
            Err(DomainError::CircularReference { .. })
        ));
        // A child moving up is fine.
        assert!(svc.validate_circular_reference(&child, &r).is_ok());
    }

    #[tokio::test]
    async fn test_child_quota() {
        let mut tenant_repo = MockTenantRepository::new();
        tenant_repo.expect_count_children().returning(|_| Ok(3));
        let svc = service(tenant_repo, MockMemberRepository::new());
        let err = svc.validate_child_quota(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DomainError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn test_role_lookup_is_cached() {
        let mut member_repo = MockMemberRepository::new();
        member_repo
            .expect_effective_role()
            .times(1)
            .returning(|_, _| Ok(Some(TenantRole::Admin)));

        let svc = service(MockTenantRepository::new(), member_repo);
        let user = Uuid::new_v4();
        let tenant = root();

        assert!(svc.can_update(user, &tenant).await.is_ok());
        // Second check hits the cache; the mock allows only one call.
        assert!(svc.can_update(user, &tenant).await.is_ok());
    }

    #[tokio::test]
    async fn test_insufficient_permission() {
        let mut member_repo = MockMemberRepository::new();
        member_repo
            .expect_effective_role()
            .returning(|_, _| Ok(Some(TenantRole::Member)));

        let svc = service(MockTenantRepository::new(), member_repo);
        let err = svc.can_delete(Uuid::new_v4(), &root()).await.unwrap_err();
        assert!(matches!(err, DomainError::InsufficientPermission { .. }));
    }
}
