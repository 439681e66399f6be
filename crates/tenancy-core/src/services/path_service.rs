// ============================================================================
// Tenancy Core - Path Service
// File: crates/tenancy-core/src/services/path_service.rs
// ============================================================================
//! Operations over the materialized path representation
//!
//! Pattern search, depth-bounded filters, common-ancestor and relationship
//! computation, distance, and path-integrity repair. The rebuild
//! recomputation is a pure function over `(id, parent_id)` pairs so its
//! convergence with incremental maintenance is unit-testable.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{PathRelationship, Tenant};
use crate::error::DomainError;
use crate::repositories::{ParentLink, PathUpdate, TenantRepository};

/// One segment of a path pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSegment {
    Id(Uuid),
    Wildcard,
}

impl PathSegment {
    fn matches(&self, id: &Uuid) -> bool {
        match self {
            PathSegment::Id(expected) => expected == id,
            PathSegment::Wildcard => true,
        }
    }
}

/// A stored path that disagrees with what the parent links imply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathViolation {
    pub id: Uuid,
    pub reason: String,
}

/// Full path of a node: ancestor chain plus the node's own id.
fn full_path(tenant: &Tenant) -> Vec<Uuid> {
    tenant.subtree_prefix()
}

/// Length of the longest common prefix of two paths.
pub fn longest_common_prefix(a: &[Uuid], b: &[Uuid]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Classify two nodes purely from path comparison.
pub fn classify_relationship(a: &Tenant, b: &Tenant) -> PathRelationship {
    if a.id == b.id {
        PathRelationship::SameTenant
    } else if b.is_descendant_of(&a.id) {
        PathRelationship::Ancestor
    } else if a.is_descendant_of(&b.id) {
        PathRelationship::Descendant
    } else if a.parent_id == b.parent_id {
        PathRelationship::Sibling
    } else {
        PathRelationship::Unrelated
    }
}

/// Edge count between two nodes, `None` when they share no root.
pub fn path_distance(a: &Tenant, b: &Tenant) -> Option<i32> {
    let fa = full_path(a);
    let fb = full_path(b);
    let common = longest_common_prefix(&fa, &fb);
    if common == 0 {
        return None;
    }
    // The lowest common ancestor sits at level common - 1.
    let lca_level = i32::try_from(common).ok()? - 1;
    Some(a.level + b.level - 2 * lca_level)
}

/// Recompute `path`/`level`/`root_id` for every node reachable from
/// `anchor_id`, treating `parent_id` links as ground truth. `base_path` is
/// the anchor's ancestor chain (empty when the anchor is a root) and
/// `root_id` the tree root the subtree belongs to.
///
/// Produces exactly what incremental maintenance would have produced on an
/// uncorrupted tree; fails on orphans or cycles instead of guessing.
pub fn compute_rebuilt_paths(
    links: &[ParentLink],
    anchor_id: Uuid,
    base_path: &[Uuid],
    root_id: Uuid,
) -> Result<Vec<PathUpdate>, DomainError> {
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut known: HashMap<Uuid, Option<Uuid>> = HashMap::new();
    for link in links {
        known.insert(link.id, link.parent_id);
        if let Some(parent) = link.parent_id {
            children.entry(parent).or_default().push(link.id);
        }
    }
    if !known.contains_key(&anchor_id) {
        return Err(DomainError::TenantNotFound(anchor_id));
    }

    let mut updates = Vec::with_capacity(links.len());
    let mut queue = vec![(anchor_id, base_path.to_vec())];
    while let Some((id, path)) = queue.pop() {
        let level = i32::try_from(path.len())
            .map_err(|_| DomainError::Internal("path length overflow".to_string()))?;
        updates.push(PathUpdate { id, path: path.clone(), level, root_id });

        if let Some(child_ids) = children.get(&id) {
            let mut child_path = path;
            child_path.push(id);
            for child in child_ids {
                if child_path.contains(child) {
                    return Err(DomainError::Internal(format!(
                        "cycle detected at tenant {child} during path rebuild"
                    )));
                }
                queue.push((*child, child_path.clone()));
            }
        }
    }

    if updates.len() != links.len() {
        return Err(DomainError::Internal(format!(
            "{} orphaned or cyclic nodes unreachable from {anchor_id}",
            links.len() - updates.len()
        )));
    }
    Ok(updates)
}

pub struct PathService<T: TenantRepository> {
    tenant_repo: Arc<T>,
}

impl<T: TenantRepository> PathService<T> {
    pub fn new(tenant_repo: Arc<T>) -> Self {
        Self { tenant_repo }
    }

    /// Exact-depth pattern match over full paths: a tenant at level
    /// `pattern.len() - 1` matches when every segment matches its full
    /// path position.
    pub async fn find_by_path_pattern(
        &self,
        pattern: &[PathSegment],
    ) -> Result<Vec<Tenant>, DomainError> {
        if pattern.is_empty() {
            return Ok(Vec::new());
        }
        let level = i32::try_from(pattern.len() - 1)
            .map_err(|_| DomainError::Internal("pattern too long".to_string()))?;

        // Prefer the narrow subtree fetch when the pattern is anchored.
        let candidates = match pattern[0] {
            PathSegment::Id(root) if pattern.len() > 1 => {
                self.tenant_repo.find_descendants(root, Some(level)).await?
            }
            _ => self.tenant_repo.find_at_level(level).await?,
        };

        Ok(candidates
            .into_iter()
            .filter(|t| {
                let fp = full_path(t);
                fp.len() == pattern.len()
                    && pattern.iter().zip(fp.iter()).all(|(seg, id)| seg.matches(id))
            })
            .collect())
    }

    pub async fn find_at_depth(&self, level: i32) -> Result<Vec<Tenant>, DomainError> {
        self.tenant_repo.find_at_level(level).await
    }

    pub async fn find_in_subtree<F>(
        &self,
        root: &Tenant,
        predicate: F,
    ) -> Result<Vec<Tenant>, DomainError>
    where
        F: Fn(&Tenant) -> bool + Send,
    {
        let descendants = self.tenant_repo.find_descendants(root.id, None).await?;
        Ok(descendants.into_iter().filter(|t| predicate(t)).collect())
    }

    /// Longest common prefix of the two full paths, resolved to a tenant.
    /// `None` when the nodes live in different trees.
    pub async fn common_ancestor(
        &self,
        a: &Tenant,
        b: &Tenant,
    ) -> Result<Option<Tenant>, DomainError> {
        let fa = full_path(a);
        let fb = full_path(b);
        let common = longest_common_prefix(&fa, &fb);
        if common == 0 {
            return Ok(None);
        }
        let lca_id = fa[common - 1];
        if lca_id == a.id {
            return Ok(Some(a.clone()));
        }
        if lca_id == b.id {
            return Ok(Some(b.clone()));
        }
        self.tenant_repo.find_by_id(lca_id).await
    }

    pub fn relationship(&self, a: &Tenant, b: &Tenant) -> PathRelationship {
        classify_relationship(a, b)
    }

    pub fn distance(&self, a: &Tenant, b: &Tenant) -> Option<i32> {
        path_distance(a, b)
    }

    /// Compare stored paths under `root_id` against what the parent links
    /// imply; report disagreements without mutating anything.
    pub async fn validate_paths(&self, root_id: Uuid) -> Result<Vec<PathViolation>, DomainError> {
        let anchor = self
            .tenant_repo
            .find_by_id(root_id)
            .await?
            .ok_or(DomainError::TenantNotFound(root_id))?;

        let mut links = self.tenant_repo.load_parent_links(root_id).await?;
        links.push(ParentLink { id: anchor.id, parent_id: anchor.parent_id });
        let expected = compute_rebuilt_paths(&links, anchor.id, &anchor.path, anchor.root_id)?;

        let mut nodes = self.tenant_repo.find_descendants(root_id, None).await?;
        nodes.push(anchor);
        let by_id: HashMap<Uuid, Tenant> = nodes.into_iter().map(|t| (t.id, t)).collect();

        let mut violations = Vec::new();
        for update in expected {
            let Some(stored) = by_id.get(&update.id) else {
                violations.push(PathViolation {
                    id: update.id,
                    reason: "reachable via parent links but missing from path query".to_string(),
                });
                continue;
            };
            if stored.path != update.path {
                violations.push(PathViolation {
                    id: update.id,
                    reason: format!("stored path {:?} expected {:?}", stored.path, update.path),
                });
            } else if stored.level != update.level {
                violations.push(PathViolation {
                    id: update.id,
                    reason: format!("stored level {} expected {}", stored.level, update.level),
                });
            } else if stored.root_id != update.root_id {
                violations.push(PathViolation {
                    id: update.id,
                    reason: format!("stored root {} expected {}", stored.root_id, update.root_id),
                });
            }
        }
        Ok(violations)
    }

    /// Recompute and persist `path`/`level`/`root_id` for the whole subtree
    /// in one transaction, recovering from inconsistencies. Idempotent.
    pub async fn rebuild_paths(&self, actor: Uuid, root_id: Uuid) -> Result<u64, DomainError> {
        let anchor = self
            .tenant_repo
            .find_by_id(root_id)
            .await?
            .ok_or(DomainError::TenantNotFound(root_id))?;

        let mut links = self.tenant_repo.load_parent_links(root_id).await?;
        links.push(ParentLink { id: anchor.id, parent_id: anchor.parent_id });

        // An interior anchor borrows its parent's chain; the parent is
        // outside the rebuilt subtree and treated as consistent.
        let (base_path, root) = match anchor.parent_id {
            None => (Vec::new(), anchor.id),
            Some(parent_id) => {
                let parent = self
                    .tenant_repo
                    .find_by_id(parent_id)
                    .await?
                    .ok_or(DomainError::TenantNotFound(parent_id))?;
                (parent.subtree_prefix(), parent.root_id)
            }
        };

        let updates = compute_rebuilt_paths(&links, anchor.id, &base_path, root)?;
        let touched = self.tenant_repo.apply_path_updates(actor, root_id, &updates).await?;
        if touched > 0 {
            info!(root_id = %root_id, rows = touched, "rebuilt materialized paths");
        } else {
            warn!(root_id = %root_id, "path rebuild touched no rows");
        }
        Ok(touched)
    }
}
