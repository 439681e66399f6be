// ============================================================================
// Tenancy Infrastructure - PostgreSQL Permission Repository
// File: crates/tenancy-infrastructure/src/database/postgres/permission_repo_impl.rs
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use tenancy_core::domain::{AuditEvent, Permission, PermissionSubject};
use tenancy_core::error::DomainError;
use tenancy_core::repositories::PermissionRepository;
use tenancy_shared::constants::DEFAULT_STATEMENT_TIMEOUT_MS;

use crate::database::connection::{map_sqlx_err, open_tx};
use crate::database::postgres::audit_repo_impl::insert_audit_event;

pub struct PgPermissionRepository {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PgPermissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS }
    }
}

// Internal row type for SQLx mapping
#[derive(Debug, FromRow)]
struct PermissionRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subject: String,
    pub resource: String,
    pub action: String,
    pub granted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PermissionRow> for Permission {
    type Error = DomainError;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        let subject = PermissionSubject::decode(&row.subject).ok_or_else(|| {
            DomainError::Internal(format!("unreadable permission subject: {}", row.subject))
        })?;
        Ok(Permission {
            id: row.id,
            tenant_id: row.tenant_id,
            subject,
            resource: row.resource,
            action: row.action,
            granted_by: row.granted_by,
            created_at: row.created_at,
        })
    }
}

const COLUMNS: &str = "id, tenant_id, subject, resource, action, granted_by, created_at";

#[async_trait]
impl PermissionRepository for PgPermissionRepository {
    async fn grant(
        &self,
        actor: Uuid,
        permission: &Permission,
        audit: Option<AuditEvent>,
    ) -> Result<Permission, DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;

        let row: PermissionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO permissions (id, tenant_id, subject, resource, action, granted_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, subject, resource, action) DO UPDATE
            SET granted_by = EXCLUDED.granted_by
            RETURNING {COLUMNS}
            "#
        ))
        .bind(permission.id)
        .bind(permission.tenant_id)
        .bind(permission.subject.encode())
        .bind(&permission.resource)
        .bind(&permission.action)
        .bind(permission.granted_by)
        .bind(permission.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("granting permission", e))?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing grant", e))?;
        row.try_into()
    }

    async fn grant_many(
        &self,
        actor: Uuid,
        permissions: &[Permission],
        audit: Option<AuditEvent>,
    ) -> Result<u64, DomainError> {
        if permissions.is_empty() {
            return Ok(0);
        }
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;

        let mut written = 0u64;
        for permission in permissions {
            let result = sqlx::query(
                r#"
                INSERT INTO permissions (id, tenant_id, subject, resource, action, granted_by, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (tenant_id, subject, resource, action) DO NOTHING
                "#,
            )
            .bind(permission.id)
            .bind(permission.tenant_id)
            .bind(permission.subject.encode())
            .bind(&permission.resource)
            .bind(&permission.action)
            .bind(permission.granted_by)
            .bind(permission.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_err("granting permission batch", e))?;
            written += result.rows_affected();
        }

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing grant batch", e))?;
        info!("Granted {} permissions", written);
        Ok(written)
    }

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<Permission>, DomainError> {
        let rows: Vec<PermissionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM permissions WHERE tenant_id = $1 ORDER BY resource, action"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("listing permissions", e))?;

        rows.into_iter().map(Permission::try_from).collect()
    }

    async fn revoke(
        &self,
        actor: Uuid,
        permission_id: Uuid,
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;

        sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(permission_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_err("revoking permission", e))?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing revocation", e))?;
        Ok(())
    }
}
