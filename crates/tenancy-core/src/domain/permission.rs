// ============================================================================
// Tenancy Core - Permission Entity
// File: crates/tenancy-core/src/domain/permission.rs
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::member::TenantRole;

/// Subject of a permission grant: a concrete user or everyone holding a
/// role on the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum PermissionSubject {
    User(Uuid),
    Role(TenantRole),
}

impl PermissionSubject {
    /// Storage encoding: `user:<uuid>` or `role:<name>`.
    pub fn encode(&self) -> String {
        match self {
            PermissionSubject::User(id) => format!("user:{id}"),
            PermissionSubject::Role(role) => format!("role:{}", role.as_str()),
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        let (kind, value) = s.split_once(':')?;
        match kind {
            "user" => Uuid::parse_str(value).ok().map(PermissionSubject::User),
            "role" => TenantRole::from_str(value).map(PermissionSubject::Role),
            _ => None,
        }
    }
}

/// Resource-scoped grant attached to a tenant and a subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subject: PermissionSubject,
    pub resource: String,
    pub action: String,
    pub granted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(
        tenant_id: Uuid,
        subject: PermissionSubject,
        resource: String,
        action: String,
        granted_by: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            subject,
            resource,
            action,
            granted_by,
            created_at: Utc::now(),
        }
    }

    /// The same grant retargeted at another tenant, used when propagating
    /// down a subtree.
    pub fn for_tenant(&self, tenant_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            subject: self.subject.clone(),
            resource: self.resource.clone(),
            action: self.action.clone(),
            granted_by: self.granted_by,
            created_at: Utc::now(),
        }
    }
}
