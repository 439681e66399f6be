//! Domain errors
//!
//! Every variant carries a stable code so the boundary layer can map
//! failures to client-facing responses without string matching. Kinds split
//! business-rule violations from missing references and infrastructure
//! faults; infrastructure errors must never be masked as validation
//! failures.

use thiserror::Error;
use uuid::Uuid;

/// Coarse classification used by callers to decide how a failure maps to
/// the outside world (4xx-style vs 5xx-style).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Infrastructure,
}

#[derive(Error, Debug)]
pub enum DomainError {
    // --- Validation ---
    #[error("Slug already in use: {slug}")]
    DuplicateSlug { slug: String },

    #[error("Depth limit exceeded: level {level} over max depth {max_depth}")]
    DepthExceeded { level: i32, max_depth: i32 },

    #[error("Circular reference: {tenant_id} cannot become a descendant of itself")]
    CircularReference { tenant_id: Uuid },

    #[error("Insufficient permission for user {user_id} on tenant {tenant_id}")]
    InsufficientPermission { user_id: Uuid, tenant_id: Uuid },

    #[error("Tenant {tenant_id} would be left without an owner")]
    LastOwnerViolation { tenant_id: Uuid },

    #[error("Tenants cannot be merged: {reason}")]
    IncompatibleMerge { reason: String },

    #[error("Invalid lifecycle transition: {reason}")]
    InvalidTransition { reason: String },

    #[error("Quota exceeded: {reason}")]
    QuotaExceeded { reason: String },

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid slug: {0}")]
    InvalidSlug(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    // --- Not found ---
    #[error("Tenant not found: {0}")]
    TenantNotFound(Uuid),

    #[error("Member not found: user {user_id} in tenant {tenant_id}")]
    MemberNotFound { tenant_id: Uuid, user_id: Uuid },

    #[error("Invite not found: {0}")]
    InviteNotFound(Uuid),

    // --- Infrastructure ---
    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction timed out")]
    Timeout,

    #[error("Concurrent structural change on subtree {root_id}")]
    Conflict { root_id: Uuid },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::DuplicateSlug { .. }
            | DomainError::DepthExceeded { .. }
            | DomainError::CircularReference { .. }
            | DomainError::InsufficientPermission { .. }
            | DomainError::LastOwnerViolation { .. }
            | DomainError::IncompatibleMerge { .. }
            | DomainError::InvalidTransition { .. }
            | DomainError::QuotaExceeded { .. }
            | DomainError::InvalidName(_)
            | DomainError::InvalidSlug(_)
            | DomainError::ValidationError(_) => ErrorKind::Validation,

            DomainError::TenantNotFound(_)
            | DomainError::MemberNotFound { .. }
            | DomainError::InviteNotFound(_) => ErrorKind::NotFound,

            DomainError::Database(_)
            | DomainError::Timeout
            | DomainError::Conflict { .. }
            | DomainError::Internal(_) => ErrorKind::Infrastructure,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::DuplicateSlug { .. } => "duplicate_slug",
            DomainError::DepthExceeded { .. } => "depth_exceeded",
            DomainError::CircularReference { .. } => "circular_reference",
            DomainError::InsufficientPermission { .. } => "insufficient_permission",
            DomainError::LastOwnerViolation { .. } => "last_owner_violation",
            DomainError::IncompatibleMerge { .. } => "incompatible_merge",
            DomainError::InvalidTransition { .. } => "invalid_transition",
            DomainError::QuotaExceeded { .. } => "quota_exceeded",
            DomainError::InvalidName(_) => "invalid_name",
            DomainError::InvalidSlug(_) => "invalid_slug",
            DomainError::ValidationError(_) => "validation_error",
            DomainError::TenantNotFound(_) => "tenant_not_found",
            DomainError::MemberNotFound { .. } => "member_not_found",
            DomainError::InviteNotFound(_) => "invite_not_found",
            DomainError::Database(_) => "database_error",
            DomainError::Timeout => "timeout",
            DomainError::Conflict { .. } => "conflict",
            DomainError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let e = DomainError::DuplicateSlug { slug: "acme".into() };
        assert_eq!(e.kind(), ErrorKind::Validation);
        assert_eq!(e.code(), "duplicate_slug");

        let e = DomainError::TenantNotFound(Uuid::new_v4());
        assert_eq!(e.kind(), ErrorKind::NotFound);

        let e = DomainError::Timeout;
        assert_eq!(e.kind(), ErrorKind::Infrastructure);
        assert_eq!(e.code(), "timeout");
    }
}
