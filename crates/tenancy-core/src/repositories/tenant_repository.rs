//! Tenant repository trait (port)
//!
//! The adapter is the sole gateway to the relational store. Every write
//! method executes inside its own transaction, bound by a statement
//! timeout, with the acting user attached for row-level-security scoping.
//! Size-changing writes additionally serialize on the subtree root so two
//! overlapping structural changes cannot both commit. When a write carries
//! an audit event, the event row commits or rolls back with the mutation
//! it describes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{AuditEvent, Tenant, TenantFilter};
use crate::error::DomainError;
use tenancy_shared::types::Pagination;

/// Parent link loaded for a path rebuild; `parent_id` is ground truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
}

/// Recomputed structural fields applied by a path rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathUpdate {
    pub id: Uuid,
    pub path: Vec<Uuid>,
    pub level: i32,
    pub root_id: Uuid,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantRepository: Send + Sync {
    // --- Reads ---
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, DomainError>;
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Tenant>, DomainError>;
    /// Sibling-scoped slug lookup; `parent_id = None` searches the root
    /// namespace.
    async fn find_child_by_slug(
        &self,
        parent_id: Option<Uuid>,
        slug: &str,
    ) -> Result<Option<Tenant>, DomainError>;
    /// Workspace-global slug lookup, used when `global_slug_scope` is on.
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, DomainError>;
    async fn find_children(&self, parent_id: Uuid) -> Result<Vec<Tenant>, DomainError>;
    /// Path-containment query: every tenant whose path contains
    /// `tenant_id`, optionally bounded to `max_level` absolute depth.
    async fn find_descendants(
        &self,
        tenant_id: Uuid,
        max_level: Option<i32>,
    ) -> Result<Vec<Tenant>, DomainError>;
    async fn find_at_level(&self, level: i32) -> Result<Vec<Tenant>, DomainError>;
    async fn count_children(&self, parent_id: Uuid) -> Result<i64, DomainError>;
    async fn count_descendants(&self, tenant_id: Uuid) -> Result<i64, DomainError>;
    /// Deepest absolute level inside the subtree rooted at `tenant_id`
    /// (the node's own level when it has no descendants).
    async fn max_subtree_level(&self, tenant_id: Uuid) -> Result<i32, DomainError>;
    async fn list(&self, filter: &TenantFilter, page: &Pagination) -> Result<Vec<Tenant>, DomainError>;
    async fn search(&self, query: &str, page: &Pagination) -> Result<Vec<Tenant>, DomainError>;
    /// `(id, parent_id)` pairs for the subtree, for integrity rebuilds.
    async fn load_parent_links(&self, root_id: Uuid) -> Result<Vec<ParentLink>, DomainError>;

    // --- Writes ---
    async fn insert(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        audit: Option<AuditEvent>,
    ) -> Result<Tenant, DomainError>;
    /// Insert a pre-built set of nodes (a duplicated subtree) atomically.
    async fn insert_subtree(
        &self,
        actor: Uuid,
        tenants: &[Tenant],
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError>;
    async fn update(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        audit: Option<AuditEvent>,
    ) -> Result<Tenant, DomainError>;
    /// Atomically reparent `tenant` under `new_parent`, splicing path,
    /// level and root id across the whole subtree. Returns rows touched.
    async fn move_subtree(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        new_parent: &Tenant,
        audit: Option<AuditEvent>,
    ) -> Result<u64, DomainError>;
    /// Detach `tenant` into a fresh root with `new_max_depth`.
    async fn convert_to_root(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        new_max_depth: i32,
        audit: Option<AuditEvent>,
    ) -> Result<u64, DomainError>;
    /// Archive the node and, when `cascade`, every active descendant.
    async fn archive_subtree(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        cascade: bool,
        audit: Option<AuditEvent>,
    ) -> Result<u64, DomainError>;
    async fn restore_subtree(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        cascade: bool,
        audit: Option<AuditEvent>,
    ) -> Result<u64, DomainError>;
    async fn delete_subtree(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        cascade: bool,
        audit: Option<AuditEvent>,
    ) -> Result<u64, DomainError>;
    /// Reassign members (higher role wins), permissions and direct
    /// children of `source` to `target`, then remove `source`.
    async fn merge_into(
        &self,
        actor: Uuid,
        source: &Tenant,
        target: &Tenant,
        merged_settings: &serde_json::Value,
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError>;
    /// Apply rebuilt paths for the subtree under one transaction.
    async fn apply_path_updates(
        &self,
        actor: Uuid,
        root_id: Uuid,
        updates: &[PathUpdate],
    ) -> Result<u64, DomainError>;
}
