// ============================================================================
// Tenancy Core - Audit Event Entity
// File: crates/tenancy-core/src/domain/audit.rs
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One record per successful mutating operation, describing the structural
/// before/after delta. Never written for failed or rolled-back operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub operation: String,
    pub tenant_id: Uuid,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        actor_id: Uuid,
        operation: &str,
        tenant_id: Uuid,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            operation: operation.to_string(),
            tenant_id,
            before,
            after,
            created_at: Utc::now(),
        }
    }
}
