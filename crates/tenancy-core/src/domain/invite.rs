// ============================================================================
// Tenancy Core - Tenant Invite Entity
// File: crates/tenancy-core/src/domain/invite.rs
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::member::TenantRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Revoked,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Revoked => "revoked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InviteStatus::Pending),
            "accepted" => Some(InviteStatus::Accepted),
            "revoked" => Some(InviteStatus::Revoked),
            _ => None,
        }
    }
}

/// Pending membership invitation. Accepting one creates the membership row
/// in the same transaction that marks the invite accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantInvite {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub role: TenantRole,
    pub status: InviteStatus,
    pub invited_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl TenantInvite {
    pub fn new(tenant_id: Uuid, email: String, role: TenantRole, invited_by: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            email: email.trim().to_lowercase(),
            role,
            status: InviteStatus::Pending,
            invited_by,
            created_at: Utc::now(),
            accepted_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == InviteStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_invite_is_pending() {
        let inv = TenantInvite::new(Uuid::new_v4(), " Dev@Acme.IO ".into(), TenantRole::Member, Uuid::new_v4());
        assert!(inv.is_pending());
        assert_eq!(inv.email, "dev@acme.io");
    }
}
