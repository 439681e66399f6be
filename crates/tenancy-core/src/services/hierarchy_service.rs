// ============================================================================
// Tenancy Core - Hierarchy Service
// File: crates/tenancy-core/src/services/hierarchy_service.rs
// ============================================================================
//! Read-only traversal over the tenant tree
//!
//! Every method is pure given the current table state. Ancestor lookups
//! come straight from the materialized path (no recursive queries);
//! descendant lookups are path-containment queries. Hot reads are memoized
//! in the cache manager and explicitly invalidated by writers.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Tenant, TenantTreeNode};
use crate::error::DomainError;
use crate::repositories::TenantRepository;
use crate::services::cache::CacheManager;

const CHILDREN_OP: &str = "children";
const ANCESTORS_OP: &str = "ancestors";
const DESCENDANTS_OP: &str = "descendants";

pub struct HierarchyService<T: TenantRepository> {
    tenant_repo: Arc<T>,
    cache: Arc<CacheManager>,
}

impl<T: TenantRepository> HierarchyService<T> {
    pub fn new(tenant_repo: Arc<T>, cache: Arc<CacheManager>) -> Self {
        Self { tenant_repo, cache }
    }

    async fn cached_tenants(&self, op: &'static str, args: &str) -> Option<Vec<Tenant>> {
        let value = self.cache.get(op, args).await?;
        serde_json::from_value(value).ok()
    }

    async fn remember_tenants(&self, op: &'static str, args: &str, tenants: &[Tenant]) {
        if let Ok(value) = serde_json::to_value(tenants) {
            self.cache.put(op, args, value, self.cache.hierarchy_ttl()).await;
        }
    }

    pub async fn get_parent(&self, tenant: &Tenant) -> Result<Option<Tenant>, DomainError> {
        match tenant.parent_id {
            Some(parent_id) => self.tenant_repo.find_by_id(parent_id).await,
            None => Ok(None),
        }
    }

    pub async fn get_children(&self, tenant_id: Uuid) -> Result<Vec<Tenant>, DomainError> {
        let args = tenant_id.to_string();
        if let Some(hit) = self.cached_tenants(CHILDREN_OP, &args).await {
            return Ok(hit);
        }
        let children = self.tenant_repo.find_children(tenant_id).await?;
        self.remember_tenants(CHILDREN_OP, &args, &children).await;
        Ok(children)
    }

    /// Children of the same parent, excluding the node itself. Roots are
    /// siblings of the other roots.
    pub async fn get_siblings(&self, tenant: &Tenant) -> Result<Vec<Tenant>, DomainError> {
        let peers = match tenant.parent_id {
            Some(parent_id) => self.tenant_repo.find_children(parent_id).await?,
            None => self.tenant_repo.find_at_level(0).await?,
        };
        Ok(peers.into_iter().filter(|t| t.id != tenant.id).collect())
    }

    pub async fn get_root(&self, tenant: &Tenant) -> Result<Tenant, DomainError> {
        if tenant.is_root() {
            return Ok(tenant.clone());
        }
        self.tenant_repo
            .find_by_id(tenant.root_id)
            .await?
            .ok_or(DomainError::TenantNotFound(tenant.root_id))
    }

    /// Ancestors ordered root → parent, derived directly from the path.
    pub async fn get_ancestors(&self, tenant: &Tenant) -> Result<Vec<Tenant>, DomainError> {
        if tenant.path.is_empty() {
            return Ok(Vec::new());
        }
        let args = tenant.id.to_string();
        if let Some(hit) = self.cached_tenants(ANCESTORS_OP, &args).await {
            return Ok(hit);
        }

        let fetched = self.tenant_repo.find_by_ids(&tenant.path).await?;
        let by_id: HashMap<Uuid, Tenant> = fetched.into_iter().map(|t| (t.id, t)).collect();
        let mut ancestors = Vec::with_capacity(tenant.path.len());
        for id in &tenant.path {
            let t = by_id
                .get(id)
                .cloned()
                .ok_or(DomainError::TenantNotFound(*id))?;
            ancestors.push(t);
        }
        self.remember_tenants(ANCESTORS_OP, &args, &ancestors).await;
        Ok(ancestors)
    }

    /// Subtree below `tenant`, optionally bounded to `max_levels` relative
    /// depth.
    pub async fn get_descendants(
        &self,
        tenant: &Tenant,
        max_levels: Option<i32>,
    ) -> Result<Vec<Tenant>, DomainError> {
        let bound = max_levels.map(|rel| tenant.level + rel);
        let args = format!("{}:{}", tenant.id, bound.map_or("all".to_string(), |b| b.to_string()));
        if let Some(hit) = self.cached_tenants(DESCENDANTS_OP, &args).await {
            return Ok(hit);
        }
        let descendants = self.tenant_repo.find_descendants(tenant.id, bound).await?;
        self.remember_tenants(DESCENDANTS_OP, &args, &descendants).await;
        Ok(descendants)
    }

    pub fn is_ancestor(&self, a: &Tenant, b: &Tenant) -> bool {
        b.is_descendant_of(&a.id)
    }

    pub fn is_descendant(&self, a: &Tenant, b: &Tenant) -> bool {
        a.is_descendant_of(&b.id)
    }

    pub fn get_depth(&self, tenant: &Tenant) -> i32 {
        tenant.level
    }

    pub async fn count_children(&self, tenant_id: Uuid) -> Result<i64, DomainError> {
        self.tenant_repo.count_children(tenant_id).await
    }

    pub async fn count_descendants(&self, tenant_id: Uuid) -> Result<i64, DomainError> {
        self.tenant_repo.count_descendants(tenant_id).await
    }

    /// Assemble the full subtree below `root_id` into an in-memory tree,
    /// never loading past the tree's configured depth ceiling.
    pub async fn get_full_hierarchy(&self, root_id: Uuid) -> Result<TenantTreeNode, DomainError> {
        let root = self
            .tenant_repo
            .find_by_id(root_id)
            .await?
            .ok_or(DomainError::TenantNotFound(root_id))?;

        let descendants = self
            .tenant_repo
            .find_descendants(root.id, Some(root.max_depth))
            .await?;

        let mut by_parent: HashMap<Uuid, Vec<Tenant>> = HashMap::new();
        for t in descendants {
            if let Some(parent_id) = t.parent_id {
                by_parent.entry(parent_id).or_default().push(t);
            }
        }
        for children in by_parent.values_mut() {
            children.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Ok(Self::build_node(root, &mut by_parent))
    }

    fn build_node(tenant: Tenant, by_parent: &mut HashMap<Uuid, Vec<Tenant>>) -> TenantTreeNode {
        let children = by_parent.remove(&tenant.id).unwrap_or_default();
        TenantTreeNode {
            tenant,
            children: children
                .into_iter()
                .map(|c| Self::build_node(c, by_parent))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TenantType;
    use crate::repositories::MockTenantRepository;
    use serde_json::json;

    fn root() -> Tenant {
        Tenant::new_root("Rr".into(), "rr".into(), TenantType::Workspace, json!({}), 5, None).unwrap()
    }

    fn child(parent: &Tenant, name: &str) -> Tenant {
        Tenant::new_child(
            parent,
            name.to_string(),
            name.to_lowercase(),
            TenantType::Team,
            json!({}),
            None,
        )
        .unwrap()
    }

    fn service(repo: MockTenantRepository) -> HierarchyService<MockTenantRepository> {
        HierarchyService::new(Arc::new(repo), Arc::new(CacheManager::new(120, 60)))
    }

    #[tokio::test]
    async fn test_ancestors_ordered_root_to_parent() {
        // Scenario: root R, child A under R, child B under A.
        let r = root();
        let a = child(&r, "Aa");
        let b = child(&a, "Bb");

        let mut repo = MockTenantRepository::new();
        let (rc, ac) = (r.clone(), a.clone());
        repo.expect_find_by_ids().returning(move |_| Ok(vec![ac.clone(), rc.clone()]));

        let svc = service(repo);
        let ancestors = svc.get_ancestors(&b).await.unwrap();
        let ids: Vec<Uuid> = ancestors.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![r.id, a.id]);
        assert_eq!(svc.get_depth(&b), 2);
    }

    #[tokio::test]
    async fn test_ancestors_of_root_is_empty() {
        let svc = service(MockTenantRepository::new());
        assert!(svc.get_ancestors(&root()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_children_served_from_cache() {
        let r = root();
        let c = child(&r, "Team");

        let mut repo = MockTenantRepository::new();
        let cc = c.clone();
        repo.expect_find_children()
            .times(1)
            .returning(move |_| Ok(vec![cc.clone()]));

        let svc = service(repo);
        assert_eq!(svc.get_children(r.id).await.unwrap().len(), 1);
        // Second read must not hit the repository.
        assert_eq!(svc.get_children(r.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_descendant_bound_is_relative() {
        let r = root();
        let a = child(&r, "Aa");

        let mut repo = MockTenantRepository::new();
        repo.expect_find_descendants()
            .withf(move |_, bound| *bound == Some(3))
            .returning(|_, _| Ok(vec![]));

        let svc = service(repo);
        // a sits at level 1; two more levels means absolute level 3.
        svc.get_descendants(&a, Some(2)).await.unwrap();
    }

    #[test]
    fn test_ancestor_descendant_tests() {
        let r = root();
        let a = child(&r, "Aa");
        let svc = service(MockTenantRepository::new());
        assert!(svc.is_ancestor(&r, &a));
        assert!(svc.is_descendant(&a, &r));
        assert!(!svc.is_ancestor(&a, &r));
    }

    #[tokio::test]
    async fn test_full_hierarchy_assembly() {
        let r = root();
        let a = child(&r, "Aa");
        let b = child(&r, "Bb");
        let a1 = child(&a, "Aa1");

        let mut repo = MockTenantRepository::new();
        let rc = r.clone();
        repo.expect_find_by_id().returning(move |_| Ok(Some(rc.clone())));
        let subtree = vec![a.clone(), b.clone(), a1.clone()];
        repo.expect_find_descendants().returning(move |_, _| Ok(subtree.clone()));

        let svc = service(repo);
        let tree = svc.get_full_hierarchy(r.id).await.unwrap();
        assert_eq!(tree.size(), 4);
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.children.len(), 2);
        // Children sorted by name.
        assert_eq!(tree.children[0].tenant.name, "Aa");
        assert_eq!(tree.children[0].children[0].tenant.id, a1.id);
    }

    #[tokio::test]
    async fn test_siblings_of_root_are_other_roots() {
        let r = root();
        let other = root();

        let mut repo = MockTenantRepository::new();
        let peers = vec![r.clone(), other.clone()];
        repo.expect_find_at_level().returning(move |_| Ok(peers.clone()));

        let svc = service(repo);
        let siblings = svc.get_siblings(&r).await.unwrap();
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].id, other.id);
    }
}
