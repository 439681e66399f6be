// ============================================================================
// Tenancy Infrastructure - PostgreSQL Audit Repository
// File: crates/tenancy-infrastructure/src/database/postgres/audit_repo_impl.rs
// ============================================================================
//! Audit trail reads, plus the shared insert used by the mutating
//! repositories. Events are only ever written on an open transaction so
//! they commit or roll back with the change they describe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use tenancy_core::domain::AuditEvent;
use tenancy_core::error::DomainError;
use tenancy_core::repositories::AuditRepository;
use tenancy_shared::types::Pagination;

use crate::database::connection::map_sqlx_err;

/// Append the event on the caller's transaction.
pub(crate) async fn insert_audit_event(
    conn: &mut PgConnection,
    event: &AuditEvent,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO audit_events (id, actor_id, operation, tenant_id, before, after, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(event.id)
    .bind(event.actor_id)
    .bind(&event.operation)
    .bind(event.tenant_id)
    .bind(&event.before)
    .bind(&event.after)
    .bind(event.created_at)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_err("recording audit event", e))?;
    Ok(())
}

pub struct PgAuditRepository {
    pool: PgPool,
}

impl PgAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal row type for SQLx mapping
#[derive(Debug, FromRow)]
struct AuditRow {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub operation: String,
    pub tenant_id: Uuid,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEvent {
    fn from(row: AuditRow) -> Self {
        AuditEvent {
            id: row.id,
            actor_id: row.actor_id,
            operation: row.operation,
            tenant_id: row.tenant_id,
            before: row.before,
            after: row.after,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl AuditRepository for PgAuditRepository {
    async fn list_for_tenant(
        &self,
        tenant_id: Uuid,
        page: &Pagination,
    ) -> Result<Vec<AuditEvent>, DomainError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, actor_id, operation, tenant_id, before, after, created_at
            FROM audit_events
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(tenant_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("listing audit events", e))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}
