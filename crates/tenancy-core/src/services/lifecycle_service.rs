// ============================================================================
// Tenancy Core - Lifecycle Service
// File: crates/tenancy-core/src/services/lifecycle_service.rs
// ============================================================================
//! Multi-step, transactional structural changes
//!
//! Archive, restore, move, merge, duplicate, convert-to-root and delete.
//! Validation runs before the mutating transaction opens; the repository
//! adapter executes each structural change as a single transaction, so no
//! transition is ever observable as partially applied. The audit event for
//! a change travels into that same transaction and commits or rolls back
//! with it; the caches touched by the mutation are invalidated, never
//! updated in place.

use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::domain::{AuditEvent, Tenant, TenantMember};
use crate::error::DomainError;
use crate::repositories::{MemberRepository, TenantRepository};
use crate::services::cache::CacheManager;
use crate::services::validation_service::ValidationService;

/// Options for `duplicate`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateOptions {
    pub with_settings: bool,
    pub with_subtree: bool,
}

/// Merge source settings into target settings, target wins: only keys the
/// target does not define are copied over (shallow).
pub fn merge_settings(
    source: &serde_json::Value,
    target: &serde_json::Value,
) -> serde_json::Value {
    match (source.as_object(), target.as_object()) {
        (Some(src), Some(tgt)) => {
            let mut merged = tgt.clone();
            for (k, v) in src {
                merged.entry(k.clone()).or_insert_with(|| v.clone());
            }
            serde_json::Value::Object(merged)
        }
        _ => target.clone(),
    }
}

pub struct LifecycleService<T, M>
where
    T: TenantRepository,
    M: MemberRepository,
{
    tenant_repo: Arc<T>,
    member_repo: Arc<M>,
    validation: Arc<ValidationService<T, M>>,
    cache: Arc<CacheManager>,
}

impl<T, M> LifecycleService<T, M>
where
    T: TenantRepository,
    M: MemberRepository,
{
    pub fn new(
        tenant_repo: Arc<T>,
        member_repo: Arc<M>,
        validation: Arc<ValidationService<T, M>>,
        cache: Arc<CacheManager>,
    ) -> Self {
        Self { tenant_repo, member_repo, validation, cache }
    }

    async fn require_tenant(&self, id: Uuid) -> Result<Tenant, DomainError> {
        self.tenant_repo
            .find_by_id(id)
            .await?
            .ok_or(DomainError::TenantNotFound(id))
    }

    async fn invalidate_subtree(&self, ids: &[Uuid]) {
        for id in ids {
            self.cache.invalidate_containing(&id.to_string()).await;
        }
    }

    /// Archive a tenant and, when `cascade`, its active descendants.
    /// Archiving an already-archived tenant is a no-op success.
    pub async fn archive(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        cascade: bool,
    ) -> Result<Tenant, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation.can_update(actor, &tenant).await?;

        if tenant.is_archived() {
            return Ok(tenant);
        }

        let event = AuditEvent::new(
            actor,
            "tenant_archived",
            tenant.id,
            Some(json!({ "status": "active" })),
            Some(json!({ "status": "archived", "cascade": cascade })),
        );
        let rows = self
            .tenant_repo
            .archive_subtree(actor, &tenant, cascade, Some(event))
            .await?;
        self.invalidate_subtree(&[tenant.id, tenant.root_id]).await;
        info!(tenant_id = %tenant.id, cascade, rows, "tenant archived");

        let mut archived = tenant;
        archived.archive();
        Ok(archived)
    }

    /// Restore an archived tenant. Fails when the parent is itself
    /// archived: the parent must be restored first.
    pub async fn restore(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        cascade: bool,
    ) -> Result<Tenant, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation.can_update(actor, &tenant).await?;

        if !tenant.is_archived() {
            return Ok(tenant);
        }
        if let Some(parent_id) = tenant.parent_id {
            let parent = self.require_tenant(parent_id).await?;
            if parent.is_archived() {
                return Err(DomainError::InvalidTransition {
                    reason: format!("parent {parent_id} is archived; restore it first"),
                });
            }
        }

        let event = AuditEvent::new(
            actor,
            "tenant_restored",
            tenant.id,
            Some(json!({ "status": "archived" })),
            Some(json!({ "status": "active", "cascade": cascade })),
        );
        self.tenant_repo
            .restore_subtree(actor, &tenant, cascade, Some(event))
            .await?;
        self.invalidate_subtree(&[tenant.id, tenant.root_id]).await;

        let mut restored = tenant;
        restored.restore();
        Ok(restored)
    }

    /// Reparent a subtree. Validates circular references, destination
    /// status, sibling slug uniqueness and the depth of every descendant,
    /// then rewrites `parent_id`/`path`/`level`/`root_id` atomically.
    pub async fn move_tenant(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        new_parent_id: Uuid,
    ) -> Result<Tenant, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        let new_parent = self.require_tenant(new_parent_id).await?;

        self.validation.can_move(actor, &tenant).await?;
        self.validation.can_create(actor, &new_parent).await?;
        self.validation.validate_circular_reference(&tenant, &new_parent)?;

        if tenant.parent_id == Some(new_parent.id) {
            return Ok(tenant);
        }
        if new_parent.is_archived() {
            return Err(DomainError::InvalidTransition {
                reason: format!("cannot move under archived tenant {new_parent_id}"),
            });
        }

        self.validation.validate_slug(&tenant.slug, Some(new_parent.id)).await?;
        self.validation.validate_child_quota(new_parent.id).await?;
        let deepest = self.tenant_repo.max_subtree_level(tenant.id).await?;
        self.validation.validate_move_depth(&tenant, &new_parent, deepest)?;

        let old_root = tenant.root_id;
        let event = AuditEvent::new(
            actor,
            "tenant_moved",
            tenant.id,
            Some(json!({ "parent_id": tenant.parent_id, "root_id": old_root, "level": tenant.level })),
            Some(json!({
                "parent_id": new_parent.id,
                "root_id": new_parent.root_id,
                "level": new_parent.level + 1,
            })),
        );
        let rows = self
            .tenant_repo
            .move_subtree(actor, &tenant, &new_parent, Some(event))
            .await?;
        self.member_repo.refresh_access(old_root).await?;
        if new_parent.root_id != old_root {
            self.member_repo.refresh_access(new_parent.root_id).await?;
        }
        self.invalidate_subtree(&[tenant.id, old_root, new_parent.root_id]).await;
        info!(tenant_id = %tenant.id, new_parent = %new_parent.id, rows, "tenant moved");

        self.require_tenant(tenant_id).await
    }

    /// Merge `source` into `target`: members are deduplicated keeping the
    /// higher role, permissions and direct children move over, and the
    /// source tenant is removed.
    pub async fn merge(
        &self,
        actor: Uuid,
        source_id: Uuid,
        target_id: Uuid,
    ) -> Result<Tenant, DomainError> {
        if source_id == target_id {
            return Err(DomainError::IncompatibleMerge {
                reason: "cannot merge a tenant into itself".to_string(),
            });
        }
        let source = self.require_tenant(source_id).await?;
        let target = self.require_tenant(target_id).await?;

        self.validation.can_delete(actor, &source).await?;
        self.validation.can_update(actor, &target).await?;

        if target.is_descendant_of(&source.id) {
            return Err(DomainError::IncompatibleMerge {
                reason: "target lies inside the source subtree".to_string(),
            });
        }
        if target.is_archived() {
            return Err(DomainError::IncompatibleMerge {
                reason: "target tenant is archived".to_string(),
            });
        }
        // The source's children land at target.level + 1; the deepest
        // descendant must still fit the target tree's ceiling.
        let deepest = self.tenant_repo.max_subtree_level(source_id).await?;
        let new_deepest = target.level + (deepest - source.level);
        if deepest > source.level && new_deepest > target.max_depth {
            return Err(DomainError::IncompatibleMerge {
                reason: format!(
                    "merged children would reach level {new_deepest} over max depth {}",
                    target.max_depth
                ),
            });
        }
        if self.member_repo.count_owners(target_id).await? == 0 {
            return Err(DomainError::IncompatibleMerge {
                reason: "target tenant has no owner".to_string(),
            });
        }

        let merged_settings = merge_settings(&source.settings, &target.settings);
        let event = AuditEvent::new(
            actor,
            "tenants_merged",
            target.id,
            Some(json!({ "source_id": source.id, "source_slug": source.slug })),
            Some(json!({ "target_id": target.id })),
        );
        self.tenant_repo
            .merge_into(actor, &source, &target, &merged_settings, Some(event))
            .await?;
        self.member_repo.refresh_access(target.root_id).await?;
        if source.root_id != target.root_id {
            self.member_repo.refresh_access(source.root_id).await?;
        }
        self.invalidate_subtree(&[source.id, source.root_id, target.id, target.root_id]).await;
        info!(source = %source.id, target = %target.id, "tenants merged");

        self.require_tenant(target_id).await
    }

    /// Structural copy: new id, same parent, optionally cloned settings and
    /// subtree. Membership is never copied; the actor becomes sole owner.
    pub async fn duplicate(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        opts: DuplicateOptions,
    ) -> Result<Tenant, DomainError> {
        let source = self.require_tenant(tenant_id).await?;
        self.validation.can_update(actor, &source).await?;
        if let Some(parent_id) = source.parent_id {
            self.validation.validate_child_quota(parent_id).await?;
        }

        let slug = self.free_slug(&source.slug, source.parent_id).await?;
        let settings = if opts.with_settings { source.settings.clone() } else { json!({}) };

        let mut clone = source.clone();
        clone.id = Uuid::new_v4();
        clone.slug = slug;
        clone.settings = settings;
        clone.created_by = Some(actor);
        clone.created_at = chrono::Utc::now();
        clone.updated_at = None;
        clone.archived_at = None;
        clone.status = crate::domain::TenantStatus::Active;
        if source.is_root() {
            clone.root_id = clone.id;
        }

        let created = self.tenant_repo.insert(actor, &clone, None).await?;

        if opts.with_subtree {
            let descendants = self.tenant_repo.find_descendants(source.id, None).await?;
            let copies = clone_subtree(&source, &created, &descendants, opts.with_settings, actor);
            if !copies.is_empty() {
                self.tenant_repo.insert_subtree(actor, &copies, None).await?;
            }
        }

        // The audit event rides with the final write of the copy, so it
        // only exists once the whole duplicate succeeded.
        let event = AuditEvent::new(
            actor,
            "tenant_duplicated",
            created.id,
            Some(json!({ "source_id": source.id })),
            Some(json!({
                "slug": created.slug,
                "with_settings": opts.with_settings,
                "with_subtree": opts.with_subtree,
            })),
        );
        self.member_repo
            .add(actor, &TenantMember::new_owner(created.id, actor), Some(event))
            .await?;
        self.member_repo.refresh_access(created.root_id).await?;
        self.invalidate_subtree(&[created.root_id]).await;
        Ok(created)
    }

    /// Detach a tenant from its parent, making it the root of a fresh tree
    /// with `new_max_depth` as the ceiling.
    pub async fn convert_to_root(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        new_max_depth: i32,
    ) -> Result<Tenant, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        if tenant.is_root() {
            return Err(DomainError::InvalidTransition {
                reason: format!("tenant {tenant_id} is already a root"),
            });
        }
        self.validation.can_move(actor, &tenant).await?;

        if new_max_depth < 0 || new_max_depth > tenancy_shared::constants::MAX_TREE_DEPTH {
            return Err(DomainError::ValidationError(format!(
                "max depth must be between 0 and {}",
                tenancy_shared::constants::MAX_TREE_DEPTH
            )));
        }
        let deepest = self.tenant_repo.max_subtree_level(tenant_id).await?;
        let height = deepest - tenant.level;
        if height > new_max_depth {
            return Err(DomainError::DepthExceeded { level: height, max_depth: new_max_depth });
        }
        self.validation.validate_slug(&tenant.slug, None).await?;

        let old_root = tenant.root_id;
        let event = AuditEvent::new(
            actor,
            "tenant_converted_to_root",
            tenant.id,
            Some(json!({ "parent_id": tenant.parent_id, "root_id": old_root })),
            Some(json!({ "max_depth": new_max_depth })),
        );
        self.tenant_repo
            .convert_to_root(actor, &tenant, new_max_depth, Some(event))
            .await?;
        self.member_repo.refresh_access(old_root).await?;
        self.member_repo.refresh_access(tenant.id).await?;
        self.invalidate_subtree(&[tenant.id, old_root]).await;

        self.require_tenant(tenant_id).await
    }

    /// Terminal removal. Refused while active children remain unless
    /// `cascade` is requested.
    pub async fn delete(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        cascade: bool,
    ) -> Result<u64, DomainError> {
        let tenant = self.require_tenant(tenant_id).await?;
        self.validation.can_delete(actor, &tenant).await?;

        if !cascade {
            let children = self.tenant_repo.find_children(tenant_id).await?;
            if children.iter().any(|c| !c.is_archived()) {
                return Err(DomainError::InvalidTransition {
                    reason: format!("tenant {tenant_id} still has active children"),
                });
            }
        }

        let event = AuditEvent::new(
            actor,
            "tenant_deleted",
            tenant.id,
            Some(json!({ "slug": tenant.slug, "parent_id": tenant.parent_id })),
            Some(json!({ "cascade": cascade })),
        );
        let rows = self
            .tenant_repo
            .delete_subtree(actor, &tenant, cascade, Some(event))
            .await?;
        self.member_repo.refresh_access(tenant.root_id).await?;
        self.invalidate_subtree(&[tenant.id, tenant.root_id]).await;
        info!(tenant_id = %tenant.id, cascade, rows, "tenant deleted");
        Ok(rows)
    }

    /// First free variant of `base` among the siblings of `parent_id`:
    /// `<base>-copy`, `<base>-copy-2`, ...
    async fn free_slug(
        &self,
        base: &str,
        parent_id: Option<Uuid>,
    ) -> Result<String, DomainError> {
        for attempt in 1..=25u32 {
            let candidate = if attempt == 1 {
                format!("{base}-copy")
            } else {
                format!("{base}-copy-{attempt}")
            };
            if self
                .tenant_repo
                .find_child_by_slug(parent_id, &candidate)
                .await?
                .is_none()
            {
                return Ok(candidate);
            }
        }
        Err(DomainError::Internal(format!("no free slug variant for {base}")))
    }
}

/// Build the duplicated descendants of `source`, remapping every id in
/// paths and root ids onto the freshly generated ones.
fn clone_subtree(
    source: &Tenant,
    clone: &Tenant,
    descendants: &[Tenant],
    with_settings: bool,
    actor: Uuid,
) -> Vec<Tenant> {
    let mut id_map: std::collections::HashMap<Uuid, Uuid> = std::collections::HashMap::new();
    id_map.insert(source.id, clone.id);
    for d in descendants {
        id_map.insert(d.id, Uuid::new_v4());
    }

    let remap = |id: &Uuid| id_map.get(id).copied().unwrap_or(*id);

    let mut copies: Vec<Tenant> = descendants
        .iter()
        .map(|d| {
            let mut copy = d.clone();
            copy.id = remap(&d.id);
            copy.parent_id = d.parent_id.map(|p| remap(&p));
            copy.root_id = remap(&d.root_id);
            copy.path = d.path.iter().map(remap).collect();
            copy.max_depth = clone.max_depth;
            if !with_settings {
                copy.settings = json!({});
            }
            copy.created_by = Some(actor);
            copy.created_at = chrono::Utc::now();
            copy.updated_at = None;
            copies_root_fixup(&mut copy, source, clone);
            copy
        })
        .collect();
    // Parents must be inserted before children.
    copies.sort_by_key(|t| t.level);
    copies
}

/// When the source was an interior node the copies keep the original tree's
/// root; when it was a root the clone is the new root.
fn copies_root_fixup(copy: &mut Tenant, source: &Tenant, clone: &Tenant) {
    if !source.is_root() {
        copy.root_id = clone.root_id;
    }
}
