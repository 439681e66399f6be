// ============================================================================
// Tenancy Core - Tenant Member Entity
// File: crates/tenancy-core/src/domain/member.rs
// Description: User-Tenant membership edge with roles
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant role enumeration, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl TenantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantRole::Owner => "owner",
            TenantRole::Admin => "admin",
            TenantRole::Member => "member",
            TenantRole::Viewer => "viewer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(TenantRole::Owner),
            "admin" => Some(TenantRole::Admin),
            "member" => Some(TenantRole::Member),
            "viewer" => Some(TenantRole::Viewer),
            _ => None,
        }
    }

    /// Numeric rank; higher means more privileged. Used for minimum-role
    /// checks and for keeping the higher role when merging memberships.
    pub fn rank(&self) -> i32 {
        match self {
            TenantRole::Owner => 4,
            TenantRole::Admin => 3,
            TenantRole::Member => 2,
            TenantRole::Viewer => 1,
        }
    }

    pub fn satisfies(&self, minimum: TenantRole) -> bool {
        self.rank() >= minimum.rank()
    }

    pub fn max(self, other: TenantRole) -> TenantRole {
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }
}

impl Default for TenantRole {
    fn default() -> Self {
        TenantRole::Member
    }
}

/// Membership edge between a user and a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantMember {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: TenantRole,
    pub joined_at: DateTime<Utc>,
    pub invited_by: Option<Uuid>,
}

impl TenantMember {
    pub fn new(tenant_id: Uuid, user_id: Uuid, role: TenantRole, invited_by: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            user_id,
            role,
            joined_at: Utc::now(),
            invited_by,
        }
    }

    pub fn new_owner(tenant_id: Uuid, user_id: Uuid) -> Self {
        Self::new(tenant_id, user_id, TenantRole::Owner, None)
    }

    pub fn is_owner(&self) -> bool {
        self.role == TenantRole::Owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(TenantRole::Owner.satisfies(TenantRole::Admin));
        assert!(TenantRole::Admin.satisfies(TenantRole::Admin));
        assert!(!TenantRole::Viewer.satisfies(TenantRole::Member));
        assert_eq!(TenantRole::Admin.max(TenantRole::Owner), TenantRole::Owner);
    }

    #[test]
    fn test_role_rank_table_is_pinned() {
        // tenant_role_rank() in the schema mirrors these values; member
        // dedup during merges keeps the higher role on both sides.
        assert_eq!(TenantRole::Owner.rank(), 4);
        assert_eq!(TenantRole::Admin.rank(), 3);
        assert_eq!(TenantRole::Member.rank(), 2);
        assert_eq!(TenantRole::Viewer.rank(), 1);
        assert_eq!(TenantRole::Member.max(TenantRole::Admin), TenantRole::Admin);
        assert_eq!(TenantRole::Owner.max(TenantRole::Viewer), TenantRole::Owner);
    }

    #[test]
    fn test_new_owner() {
        let m = TenantMember::new_owner(Uuid::new_v4(), Uuid::new_v4());
        assert!(m.is_owner());
        assert!(m.invited_by.is_none());
    }

    #[test]
    fn test_role_round_trip() {
        for role in [TenantRole::Owner, TenantRole::Admin, TenantRole::Member, TenantRole::Viewer] {
            assert_eq!(TenantRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(TenantRole::from_str("superuser"), None);
    }
}
