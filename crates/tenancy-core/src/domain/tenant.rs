// ============================================================================
// Tenancy Core - Tenant Entity
// File: crates/tenancy-core/src/domain/tenant.rs
// Description: Tenant node in the materialized-path hierarchy
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Tenant type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantType {
    Workspace,
    Team,
    Project,
    Department,
    Custom,
}

impl TenantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantType::Workspace => "workspace",
            TenantType::Team => "team",
            TenantType::Project => "project",
            TenantType::Department => "department",
            TenantType::Custom => "custom",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "workspace" => Some(TenantType::Workspace),
            "team" => Some(TenantType::Team),
            "project" => Some(TenantType::Project),
            "department" => Some(TenantType::Department),
            "custom" => Some(TenantType::Custom),
            _ => None,
        }
    }
}

impl Default for TenantType {
    fn default() -> Self {
        TenantType::Workspace
    }
}

/// Tenant status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Archived,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TenantStatus::Active),
            "archived" => Some(TenantStatus::Archived),
            _ => None,
        }
    }
}

/// Tenant entity: one node in the hierarchy.
///
/// `path` is the ordered list of ancestor ids from root to parent; it never
/// contains the node's own id. `level == path.len()` and roots sit at
/// level 0 with an empty path. Both fields are recomputed wholesale on
/// structural changes (move, merge, convert-to-root), never patched.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Tenant {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub root_id: Uuid,

    pub level: i32,
    pub path: Vec<Uuid>,
    pub max_depth: i32,

    #[validate(length(min = 2, max = 100, message = "Tenant name must be between 2 and 100 characters"))]
    pub name: String,

    #[validate(length(min = 2, max = 100, message = "Slug must be between 2 and 100 characters"))]
    pub slug: String,

    pub tenant_type: TenantType,
    pub settings: serde_json::Value,
    pub status: TenantStatus,

    // Audit fields
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Tenant {
    /// Create a new root tenant (level 0, own id as root id).
    pub fn new_root(
        name: String,
        slug: String,
        tenant_type: TenantType,
        settings: serde_json::Value,
        max_depth: i32,
        created_by: Option<Uuid>,
    ) -> Result<Self, validator::ValidationErrors> {
        let id = Uuid::new_v4();
        let tenant = Self {
            id,
            parent_id: None,
            root_id: id,
            level: 0,
            path: Vec::new(),
            max_depth,
            name: name.trim().to_string(),
            slug: slug.trim().to_lowercase(),
            tenant_type,
            settings,
            status: TenantStatus::Active,
            created_at: Utc::now(),
            created_by,
            updated_at: None,
            archived_at: None,
        };

        tenant.validate()?;
        Ok(tenant)
    }

    /// Create a child under `parent`; fixes level, path and root id at
    /// construction time.
    pub fn new_child(
        parent: &Tenant,
        name: String,
        slug: String,
        tenant_type: TenantType,
        settings: serde_json::Value,
        created_by: Option<Uuid>,
    ) -> Result<Self, validator::ValidationErrors> {
        let tenant = Self {
            id: Uuid::new_v4(),
            parent_id: Some(parent.id),
            root_id: parent.root_id,
            level: parent.level + 1,
            path: parent.subtree_prefix(),
            max_depth: parent.max_depth,
            name: name.trim().to_string(),
            slug: slug.trim().to_lowercase(),
            tenant_type,
            settings,
            status: TenantStatus::Active,
            created_at: Utc::now(),
            created_by,
            updated_at: None,
            archived_at: None,
        };

        tenant.validate()?;
        Ok(tenant)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_archived(&self) -> bool {
        self.status == TenantStatus::Archived
    }

    /// The path every direct child of this node carries: own path plus own
    /// id. Also the prefix shared by every descendant.
    pub fn subtree_prefix(&self) -> Vec<Uuid> {
        let mut prefix = self.path.clone();
        prefix.push(self.id);
        prefix
    }

    /// True when `other` appears in this node's ancestor chain.
    pub fn is_descendant_of(&self, other_id: &Uuid) -> bool {
        self.path.contains(other_id)
    }

    pub fn archive(&mut self) {
        self.status = TenantStatus::Archived;
        self.archived_at = Some(Utc::now());
        self.updated_at = Some(Utc::now());
    }

    pub fn restore(&mut self) {
        self.status = TenantStatus::Active;
        self.archived_at = None;
        self.updated_at = Some(Utc::now());
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

/// Filter for tenant listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantFilter {
    pub parent_id: Option<Uuid>,
    pub root_id: Option<Uuid>,
    pub tenant_type: Option<TenantType>,
    pub status: Option<TenantStatus>,
    /// Include archived tenants; default listings exclude them.
    pub include_archived: bool,
}

/// Patch applied by `update_tenant`; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub tenant_type: Option<TenantType>,
    pub settings: Option<serde_json::Value>,
}
