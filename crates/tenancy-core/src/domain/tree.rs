// ============================================================================
// Tenancy Core - Tree View Types
// File: crates/tenancy-core/src/domain/tree.rs
// ============================================================================

use serde::{Deserialize, Serialize};

use super::tenant::Tenant;

/// In-memory subtree assembled for bulk presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantTreeNode {
    pub tenant: Tenant,
    pub children: Vec<TenantTreeNode>,
}

impl TenantTreeNode {
    pub fn leaf(tenant: Tenant) -> Self {
        Self { tenant, children: Vec::new() }
    }

    /// Total number of nodes in this subtree, self included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TenantTreeNode::size).sum::<usize>()
    }

    /// Height of the subtree: 0 for a leaf.
    pub fn height(&self) -> usize {
        self.children.iter().map(|c| c.height() + 1).max().unwrap_or(0)
    }
}

/// Classification of two nodes purely from path comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathRelationship {
    SameTenant,
    Ancestor,
    Descendant,
    Sibling,
    Unrelated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tenant::TenantType;
    use serde_json::json;

    #[test]
    fn test_tree_size_and_height() {
        let root = Tenant::new_root("Root".into(), "root".into(), TenantType::Workspace, json!({}), 5, None).unwrap();
        let a = Tenant::new_child(&root, "Aa".into(), "aa".into(), TenantType::Team, json!({}), None).unwrap();
        let b = Tenant::new_child(&a, "Bb".into(), "bb".into(), TenantType::Project, json!({}), None).unwrap();

        let tree = TenantTreeNode {
            tenant: root,
            children: vec![TenantTreeNode { tenant: a, children: vec![TenantTreeNode::leaf(b)] }],
        };
        assert_eq!(tree.size(), 3);
        assert_eq!(tree.height(), 2);
    }
}
