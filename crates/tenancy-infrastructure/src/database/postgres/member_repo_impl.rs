// ============================================================================
// Tenancy Infrastructure - PostgreSQL Member Repository
// File: crates/tenancy-infrastructure/src/database/postgres/member_repo_impl.rs
// ============================================================================
//! Membership rows, invites and the derived access map.
//!
//! `tenant_access` holds one row per (tenant, user) with the highest role
//! reachable through direct membership or an ancestor membership. It is
//! recomputed wholesale per tree by `refresh_access` after any write that
//! can change inheritance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{error, info};
use uuid::Uuid;

use tenancy_core::domain::{AuditEvent, InviteStatus, TenantInvite, TenantMember, TenantRole};
use tenancy_core::error::DomainError;
use tenancy_core::repositories::MemberRepository;
use tenancy_shared::constants::DEFAULT_STATEMENT_TIMEOUT_MS;

use crate::database::connection::{is_unique_violation, map_sqlx_err, open_system_tx, open_tx};
use crate::database::postgres::audit_repo_impl::insert_audit_event;

pub struct PgMemberRepository {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PgMemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS }
    }
}

// Internal row type for SQLx mapping
#[derive(Debug, FromRow)]
struct MemberRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    pub invited_by: Option<Uuid>,
}

impl From<MemberRow> for TenantMember {
    fn from(row: MemberRow) -> Self {
        TenantMember {
            id: row.id,
            tenant_id: row.tenant_id,
            user_id: row.user_id,
            role: TenantRole::from_str(&row.role).unwrap_or_default(),
            joined_at: row.joined_at,
            invited_by: row.invited_by,
        }
    }
}

#[derive(Debug, FromRow)]
struct InviteRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub role: String,
    pub status: String,
    pub invited_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl From<InviteRow> for TenantInvite {
    fn from(row: InviteRow) -> Self {
        TenantInvite {
            id: row.id,
            tenant_id: row.tenant_id,
            email: row.email,
            role: TenantRole::from_str(&row.role).unwrap_or_default(),
            status: InviteStatus::from_str(&row.status).unwrap_or(InviteStatus::Pending),
            invited_by: row.invited_by,
            created_at: row.created_at,
            accepted_at: row.accepted_at,
        }
    }
}

const MEMBER_COLUMNS: &str = "id, tenant_id, user_id, role, joined_at, invited_by";
const INVITE_COLUMNS: &str =
    "id, tenant_id, email, role, status, invited_by, created_at, accepted_at";

#[async_trait]
impl MemberRepository for PgMemberRepository {
    async fn find(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TenantMember>, DomainError> {
        let row: Option<MemberRow> = sqlx::query_as(&format!(
            "SELECT {MEMBER_COLUMNS} FROM tenant_members WHERE tenant_id = $1 AND user_id = $2"
        ))
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("finding member", e))?;

        Ok(row.map(|r| r.into()))
    }

    async fn list(&self, tenant_id: Uuid) -> Result<Vec<TenantMember>, DomainError> {
        let rows: Vec<MemberRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MEMBER_COLUMNS} FROM tenant_members
            WHERE tenant_id = $1
            ORDER BY joined_at
            "#
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("listing members", e))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn count_owners(&self, tenant_id: Uuid) -> Result<i64, DomainError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tenant_members WHERE tenant_id = $1 AND role = 'owner'",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("counting owners", e))?;
        Ok(count)
    }

    async fn add(
        &self,
        actor: Uuid,
        member: &TenantMember,
        audit: Option<AuditEvent>,
    ) -> Result<TenantMember, DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;

        let row: MemberRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO tenant_members (id, tenant_id, user_id, role, joined_at, invited_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {MEMBER_COLUMNS}
            "#
        ))
        .bind(member.id)
        .bind(member.tenant_id)
        .bind(member.user_id)
        .bind(member.role.as_str())
        .bind(member.joined_at)
        .bind(member.invited_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error adding member: {}", e);
            if is_unique_violation(&e) {
                DomainError::ValidationError(format!(
                    "user {} is already a member of {}",
                    member.user_id, member.tenant_id
                ))
            } else {
                map_sqlx_err("adding member", e)
            }
        })?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing member add", e))?;
        Ok(row.into())
    }

    async fn update_role(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
        role: TenantRole,
        audit: Option<AuditEvent>,
    ) -> Result<TenantMember, DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;

        let row: Option<MemberRow> = sqlx::query_as(&format!(
            r#"
            UPDATE tenant_members
            SET role = $3
            WHERE tenant_id = $1 AND user_id = $2
            RETURNING {MEMBER_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(user_id)
        .bind(role.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("updating member role", e))?;

        let row = row.ok_or(DomainError::MemberNotFound { tenant_id, user_id })?;
        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing role update", e))?;
        Ok(row.into())
    }

    async fn remove(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        user_id: Uuid,
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;

        let result = sqlx::query(
            "DELETE FROM tenant_members WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("removing member", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::MemberNotFound { tenant_id, user_id });
        }
        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing member removal", e))?;
        Ok(())
    }

    async fn transfer_ownership(
        &self,
        actor: Uuid,
        tenant_id: Uuid,
        from: Uuid,
        to: Uuid,
        demoted_role: TenantRole,
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;

        let promoted = sqlx::query(
            "UPDATE tenant_members SET role = 'owner' WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant_id)
        .bind(to)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("promoting new owner", e))?;
        if promoted.rows_affected() == 0 {
            return Err(DomainError::MemberNotFound { tenant_id, user_id: to });
        }

        let demoted = sqlx::query(
            r#"
            UPDATE tenant_members SET role = $3
            WHERE tenant_id = $1 AND user_id = $2 AND role = 'owner'
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(demoted_role.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("demoting previous owner", e))?;
        if demoted.rows_affected() == 0 {
            return Err(DomainError::MemberNotFound { tenant_id, user_id: from });
        }

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing ownership transfer", e))?;
        info!("Ownership of {} transferred from {} to {}", tenant_id, from, to);
        Ok(())
    }

    async fn effective_role(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<TenantRole>, DomainError> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT effective_role FROM tenant_access WHERE user_id = $1 AND tenant_id = $2",
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("resolving effective role", e))?;

        Ok(role.as_deref().and_then(TenantRole::from_str))
    }

    async fn refresh_access(&self, root_id: Uuid) -> Result<u64, DomainError> {
        let mut tx = open_system_tx(&self.pool, self.statement_timeout_ms).await?;

        sqlx::query(
            r#"
            DELETE FROM tenant_access
            WHERE tenant_id IN (
                SELECT id FROM tenants WHERE id = $1 OR path @> ARRAY[$1]::uuid[]
            )
            "#,
        )
        .bind(root_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("clearing access map", e))?;

        // A member of a tenant gets the same role on every descendant; the
        // highest role wins where multiple ancestors grant one.
        let result = sqlx::query(
            r#"
            INSERT INTO tenant_access (tenant_id, user_id, effective_role)
            SELECT t.id, m.user_id,
                   (array_agg(m.role ORDER BY tenant_role_rank(m.role) DESC))[1]
            FROM tenants t
            JOIN tenant_members m
              ON m.tenant_id = t.id OR m.tenant_id = ANY(t.path)
            WHERE t.id = $1 OR t.path @> ARRAY[$1]::uuid[]
            GROUP BY t.id, m.user_id
            "#,
        )
        .bind(root_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("rebuilding access map", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing access refresh", e))?;
        Ok(result.rows_affected())
    }

    async fn create_invite(
        &self,
        actor: Uuid,
        invite: &TenantInvite,
        audit: Option<AuditEvent>,
    ) -> Result<TenantInvite, DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;

        let row: InviteRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO tenant_invites (id, tenant_id, email, role, status, invited_by, created_at, accepted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {INVITE_COLUMNS}
            "#
        ))
        .bind(invite.id)
        .bind(invite.tenant_id)
        .bind(&invite.email)
        .bind(invite.role.as_str())
        .bind(invite.status.as_str())
        .bind(invite.invited_by)
        .bind(invite.created_at)
        .bind(invite.accepted_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::ValidationError(format!(
                    "a pending invite for {} already exists",
                    invite.email
                ))
            } else {
                map_sqlx_err("creating invite", e)
            }
        })?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing invite", e))?;
        Ok(row.into())
    }

    async fn create_invites(
        &self,
        actor: Uuid,
        invites: &[TenantInvite],
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError> {
        if invites.is_empty() {
            return Ok(());
        }
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;

        for invite in invites {
            sqlx::query(
                r#"
                INSERT INTO tenant_invites (id, tenant_id, email, role, status, invited_by, created_at, accepted_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(invite.id)
            .bind(invite.tenant_id)
            .bind(&invite.email)
            .bind(invite.role.as_str())
            .bind(invite.status.as_str())
            .bind(invite.invited_by)
            .bind(invite.created_at)
            .bind(invite.accepted_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DomainError::ValidationError(format!(
                        "a pending invite for {} already exists",
                        invite.email
                    ))
                } else {
                    map_sqlx_err("creating invite batch", e)
                }
            })?;
        }

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing invite batch", e))?;
        info!("Created {} invites", invites.len());
        Ok(())
    }

    async fn find_invite(&self, id: Uuid) -> Result<Option<TenantInvite>, DomainError> {
        let row: Option<InviteRow> = sqlx::query_as(&format!(
            "SELECT {INVITE_COLUMNS} FROM tenant_invites WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("finding invite", e))?;

        Ok(row.map(|r| r.into()))
    }

    async fn accept_invite(
        &self,
        invite_id: Uuid,
        member: &TenantMember,
        audit: Option<AuditEvent>,
    ) -> Result<TenantMember, DomainError> {
        let mut tx = open_tx(&self.pool, member.user_id, self.statement_timeout_ms).await?;

        let flipped = sqlx::query(
            r#"
            UPDATE tenant_invites
            SET status = 'accepted', accepted_at = now()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(invite_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("accepting invite", e))?;
        if flipped.rows_affected() == 0 {
            return Err(DomainError::InviteNotFound(invite_id));
        }

        // Re-accepting for an existing member keeps the higher role.
        let row: MemberRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO tenant_members (id, tenant_id, user_id, role, joined_at, invited_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, user_id) DO UPDATE
            SET role = CASE
                WHEN tenant_role_rank(EXCLUDED.role) > tenant_role_rank(tenant_members.role)
                THEN EXCLUDED.role
                ELSE tenant_members.role
            END
            RETURNING {MEMBER_COLUMNS}
            "#
        ))
        .bind(member.id)
        .bind(member.tenant_id)
        .bind(member.user_id)
        .bind(member.role.as_str())
        .bind(member.joined_at)
        .bind(member.invited_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("creating membership from invite", e))?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing invite acceptance", e))?;
        Ok(row.into())
    }

    async fn revoke_invite(
        &self,
        actor: Uuid,
        invite_id: Uuid,
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;

        let result = sqlx::query(
            "UPDATE tenant_invites SET status = 'revoked' WHERE id = $1 AND status = 'pending'",
        )
        .bind(invite_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("revoking invite", e))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::InviteNotFound(invite_id));
        }

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing invite revocation", e))?;
        Ok(())
    }

    async fn list_invites(&self, tenant_id: Uuid) -> Result<Vec<TenantInvite>, DomainError> {
        let rows: Vec<InviteRow> = sqlx::query_as(&format!(
            r#"
            SELECT {INVITE_COLUMNS} FROM tenant_invites
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("listing invites", e))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}
