// ============================================================================
// Tenancy Infrastructure - PostgreSQL Tenant Repository
// File: crates/tenancy-infrastructure/src/database/postgres/tenant_repo_impl.rs
// ============================================================================
//! Materialized-path storage for the tenant tree.
//!
//! `path` is a `UUID[]` column under a GIN index: descendant queries are
//! `path @> ARRAY[id]` containment, structural rewrites are array splices
//! applied to the whole subtree in one statement. Writes that change tree
//! shape take an advisory lock on the subtree root before touching rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{error, info};
use uuid::Uuid;

use tenancy_core::domain::{AuditEvent, Tenant, TenantFilter, TenantStatus, TenantType};
use tenancy_core::error::DomainError;
use tenancy_core::repositories::{ParentLink, PathUpdate, TenantRepository};
use tenancy_shared::constants::DEFAULT_STATEMENT_TIMEOUT_MS;
use tenancy_shared::types::Pagination;

use crate::database::connection::{is_unique_violation, lock_subtree, map_sqlx_err, open_tx};
use crate::database::postgres::audit_repo_impl::insert_audit_event;

const COLUMNS: &str = r#"
    id, parent_id, root_id, level, path, max_depth,
    name, slug, tenant_type, settings, status,
    created_at, created_by, updated_at, archived_at
"#;

pub struct PgTenantRepository {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PgTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS }
    }

    pub fn with_timeout(pool: PgPool, statement_timeout_ms: u64) -> Self {
        Self { pool, statement_timeout_ms }
    }
}

// Internal row type for SQLx mapping
#[derive(Debug, FromRow)]
struct TenantRow {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub root_id: Uuid,
    pub level: i32,
    pub path: Vec<Uuid>,
    pub max_depth: i32,
    pub name: String,
    pub slug: String,
    pub tenant_type: String,
    pub settings: serde_json::Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Tenant {
            id: row.id,
            parent_id: row.parent_id,
            root_id: row.root_id,
            level: row.level,
            path: row.path,
            max_depth: row.max_depth,
            name: row.name,
            slug: row.slug,
            tenant_type: TenantType::from_str(&row.tenant_type).unwrap_or_default(),
            settings: row.settings,
            status: TenantStatus::from_str(&row.status).unwrap_or(TenantStatus::Active),
            created_at: row.created_at,
            created_by: row.created_by,
            updated_at: row.updated_at,
            archived_at: row.archived_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct LinkRow {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
}

#[async_trait]
impl TenantRepository for PgTenantRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, DomainError> {
        let row: Option<TenantRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM tenants WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("finding tenant by id", e))?;

        Ok(row.map(|r| r.into()))
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Tenant>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<TenantRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM tenants WHERE id = ANY($1) ORDER BY level"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("finding tenants by ids", e))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn find_child_by_slug(
        &self,
        parent_id: Option<Uuid>,
        slug: &str,
    ) -> Result<Option<Tenant>, DomainError> {
        let row: Option<TenantRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM tenants
            WHERE parent_id IS NOT DISTINCT FROM $1 AND LOWER(slug) = LOWER($2)
            "#
        ))
        .bind(parent_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("finding tenant by sibling slug", e))?;

        Ok(row.map(|r| r.into()))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, DomainError> {
        let row: Option<TenantRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM tenants WHERE LOWER(slug) = LOWER($1) LIMIT 1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("finding tenant by slug", e))?;

        Ok(row.map(|r| r.into()))
    }

    async fn find_children(&self, parent_id: Uuid) -> Result<Vec<Tenant>, DomainError> {
        let rows: Vec<TenantRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM tenants WHERE parent_id = $1 ORDER BY name"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("finding children", e))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn find_descendants(
        &self,
        tenant_id: Uuid,
        max_level: Option<i32>,
    ) -> Result<Vec<Tenant>, DomainError> {
        let rows: Vec<TenantRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM tenants
            WHERE path @> ARRAY[$1]::uuid[]
              AND ($2::int IS NULL OR level <= $2)
            ORDER BY level, name
            "#
        ))
        .bind(tenant_id)
        .bind(max_level)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("finding descendants", e))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn find_at_level(&self, level: i32) -> Result<Vec<Tenant>, DomainError> {
        let rows: Vec<TenantRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM tenants WHERE level = $1 ORDER BY name"
        ))
        .bind(level)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("finding tenants at level", e))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn count_children(&self, parent_id: Uuid) -> Result<i64, DomainError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants WHERE parent_id = $1")
            .bind(parent_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_err("counting children", e))?;
        Ok(count)
    }

    async fn count_descendants(&self, tenant_id: Uuid) -> Result<i64, DomainError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tenants WHERE path @> ARRAY[$1]::uuid[]")
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_err("counting descendants", e))?;
        Ok(count)
    }

    async fn max_subtree_level(&self, tenant_id: Uuid) -> Result<i32, DomainError> {
        let level: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(level) FROM tenants WHERE id = $1 OR path @> ARRAY[$1]::uuid[]",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("finding max subtree level", e))?;

        level.ok_or(DomainError::TenantNotFound(tenant_id))
    }

    async fn list(
        &self,
        filter: &TenantFilter,
        page: &Pagination,
    ) -> Result<Vec<Tenant>, DomainError> {
        let rows: Vec<TenantRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM tenants
            WHERE ($1::uuid IS NULL OR parent_id = $1)
              AND ($2::uuid IS NULL OR root_id = $2)
              AND ($3::text IS NULL OR tenant_type = $3)
              AND ($4::text IS NULL OR status = $4)
              AND ($5 OR status <> 'archived')
            ORDER BY level, name
            LIMIT $6 OFFSET $7
            "#
        ))
        .bind(filter.parent_id)
        .bind(filter.root_id)
        .bind(filter.tenant_type.map(|t| t.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.include_archived)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("listing tenants", e))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn search(&self, query: &str, page: &Pagination) -> Result<Vec<Tenant>, DomainError> {
        let rows: Vec<TenantRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM tenants
            WHERE (name ILIKE '%' || $1 || '%' OR slug ILIKE '%' || $1 || '%')
              AND status <> 'archived'
            ORDER BY name
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(query)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("searching tenants", e))?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn load_parent_links(&self, root_id: Uuid) -> Result<Vec<ParentLink>, DomainError> {
        let rows: Vec<LinkRow> = sqlx::query_as(
            "SELECT id, parent_id FROM tenants WHERE path @> ARRAY[$1]::uuid[] ORDER BY level",
        )
        .bind(root_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_err("loading parent links", e))?;

        Ok(rows
            .into_iter()
            .map(|r| ParentLink { id: r.id, parent_id: r.parent_id })
            .collect())
    }

    async fn insert(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        audit: Option<AuditEvent>,
    ) -> Result<Tenant, DomainError> {
        info!("Creating tenant: {}", tenant.slug);
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;

        let row: TenantRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO tenants (
                id, parent_id, root_id, level, path, max_depth,
                name, slug, tenant_type, settings, status,
                created_at, created_by, updated_at, archived_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(tenant.id)
        .bind(tenant.parent_id)
        .bind(tenant.root_id)
        .bind(tenant.level)
        .bind(&tenant.path)
        .bind(tenant.max_depth)
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(tenant.tenant_type.as_str())
        .bind(&tenant.settings)
        .bind(tenant.status.as_str())
        .bind(tenant.created_at)
        .bind(tenant.created_by)
        .bind(tenant.updated_at)
        .bind(tenant.archived_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error creating tenant: {}", e);
            if is_unique_violation(&e) {
                DomainError::DuplicateSlug { slug: tenant.slug.clone() }
            } else {
                map_sqlx_err("creating tenant", e)
            }
        })?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing tenant insert", e))?;

        info!("Tenant created successfully: {}", row.id);
        Ok(row.into())
    }

    async fn insert_subtree(
        &self,
        actor: Uuid,
        tenants: &[Tenant],
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError> {
        let Some(first) = tenants.first() else {
            return Ok(());
        };
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;
        lock_subtree(&mut tx, first.root_id).await?;

        for tenant in tenants {
            sqlx::query(
                r#"
                INSERT INTO tenants (
                    id, parent_id, root_id, level, path, max_depth,
                    name, slug, tenant_type, settings, status,
                    created_at, created_by, updated_at, archived_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(tenant.id)
            .bind(tenant.parent_id)
            .bind(tenant.root_id)
            .bind(tenant.level)
            .bind(&tenant.path)
            .bind(tenant.max_depth)
            .bind(&tenant.name)
            .bind(&tenant.slug)
            .bind(tenant.tenant_type.as_str())
            .bind(&tenant.settings)
            .bind(tenant.status.as_str())
            .bind(tenant.created_at)
            .bind(tenant.created_by)
            .bind(tenant.updated_at)
            .bind(tenant.archived_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DomainError::DuplicateSlug { slug: tenant.slug.clone() }
                } else {
                    map_sqlx_err("inserting subtree node", e)
                }
            })?;
        }

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing subtree insert", e))?;
        info!("Inserted subtree of {} tenants", tenants.len());
        Ok(())
    }

    async fn update(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        audit: Option<AuditEvent>,
    ) -> Result<Tenant, DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;

        let row: TenantRow = sqlx::query_as(&format!(
            r#"
            UPDATE tenants
            SET name = $2,
                slug = $3,
                tenant_type = $4,
                settings = $5,
                status = $6,
                updated_at = $7,
                archived_at = $8
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(tenant.tenant_type.as_str())
        .bind(&tenant.settings)
        .bind(tenant.status.as_str())
        .bind(tenant.updated_at)
        .bind(tenant.archived_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error updating tenant: {}", e);
            if is_unique_violation(&e) {
                DomainError::DuplicateSlug { slug: tenant.slug.clone() }
            } else {
                map_sqlx_err("updating tenant", e)
            }
        })?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing tenant update", e))?;
        Ok(row.into())
    }

    async fn move_subtree(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        new_parent: &Tenant,
        audit: Option<AuditEvent>,
    ) -> Result<u64, DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;
        // Lock both trees in a stable order to avoid deadlocks between
        // concurrent cross-tree moves.
        let (first, second) = if tenant.root_id <= new_parent.root_id {
            (tenant.root_id, new_parent.root_id)
        } else {
            (new_parent.root_id, tenant.root_id)
        };
        lock_subtree(&mut tx, first).await?;
        if second != first {
            lock_subtree(&mut tx, second).await?;
        }

        // One splice over the whole subtree: drop the old ancestor prefix,
        // prepend the destination's, shift levels by the delta.
        let new_prefix = new_parent.subtree_prefix();
        let old_prefix_len = tenant.path.len() as i32;
        let level_delta = (new_parent.level + 1) - tenant.level;

        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET path = $2::uuid[] || COALESCE(path[($3::int + 1):], '{}'::uuid[]),
                level = level + $4,
                root_id = $5,
                parent_id = CASE WHEN id = $1 THEN $6 ELSE parent_id END,
                max_depth = $7,
                updated_at = now()
            WHERE id = $1 OR path @> ARRAY[$1]::uuid[]
            "#,
        )
        .bind(tenant.id)
        .bind(&new_prefix)
        .bind(old_prefix_len)
        .bind(level_delta)
        .bind(new_parent.root_id)
        .bind(new_parent.id)
        .bind(new_parent.max_depth)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("moving subtree", e))?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing subtree move", e))?;

        info!(
            "Moved subtree {} under {} ({} rows)",
            tenant.id,
            new_parent.id,
            result.rows_affected()
        );
        Ok(result.rows_affected())
    }

    async fn convert_to_root(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        new_max_depth: i32,
        audit: Option<AuditEvent>,
    ) -> Result<u64, DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;
        lock_subtree(&mut tx, tenant.root_id).await?;

        let old_prefix_len = tenant.path.len() as i32;

        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET path = COALESCE(path[($2::int + 1):], '{}'::uuid[]),
                level = level - $3,
                root_id = $1,
                parent_id = CASE WHEN id = $1 THEN NULL ELSE parent_id END,
                max_depth = $4,
                updated_at = now()
            WHERE id = $1 OR path @> ARRAY[$1]::uuid[]
            "#,
        )
        .bind(tenant.id)
        .bind(old_prefix_len)
        .bind(tenant.level)
        .bind(new_max_depth)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("converting to root", e))?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing root conversion", e))?;
        Ok(result.rows_affected())
    }

    async fn archive_subtree(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        cascade: bool,
        audit: Option<AuditEvent>,
    ) -> Result<u64, DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;
        lock_subtree(&mut tx, tenant.root_id).await?;

        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET status = 'archived', archived_at = now(), updated_at = now()
            WHERE (id = $1 OR ($2 AND path @> ARRAY[$1]::uuid[]))
              AND status = 'active'
            "#,
        )
        .bind(tenant.id)
        .bind(cascade)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("archiving subtree", e))?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing archive", e))?;
        Ok(result.rows_affected())
    }

    async fn restore_subtree(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        cascade: bool,
        audit: Option<AuditEvent>,
    ) -> Result<u64, DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;
        lock_subtree(&mut tx, tenant.root_id).await?;

        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET status = 'active', archived_at = NULL, updated_at = now()
            WHERE (id = $1 OR ($2 AND path @> ARRAY[$1]::uuid[]))
              AND status = 'archived'
            "#,
        )
        .bind(tenant.id)
        .bind(cascade)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("restoring subtree", e))?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing restore", e))?;
        Ok(result.rows_affected())
    }

    async fn delete_subtree(
        &self,
        actor: Uuid,
        tenant: &Tenant,
        cascade: bool,
        audit: Option<AuditEvent>,
    ) -> Result<u64, DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;
        lock_subtree(&mut tx, tenant.root_id).await?;

        // Memberships, invites, permissions and access rows go with the
        // tenants via ON DELETE CASCADE.
        let result = sqlx::query(
            "DELETE FROM tenants WHERE id = $1 OR ($2 AND path @> ARRAY[$1]::uuid[])",
        )
        .bind(tenant.id)
        .bind(cascade)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("deleting subtree", e))?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing delete", e))?;

        info!("Deleted tenant {} ({} rows)", tenant.id, result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn merge_into(
        &self,
        actor: Uuid,
        source: &Tenant,
        target: &Tenant,
        merged_settings: &serde_json::Value,
        audit: Option<AuditEvent>,
    ) -> Result<(), DomainError> {
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;
        let (first, second) = if source.root_id <= target.root_id {
            (source.root_id, target.root_id)
        } else {
            (target.root_id, source.root_id)
        };
        lock_subtree(&mut tx, first).await?;
        if second != first {
            lock_subtree(&mut tx, second).await?;
        }

        // Members: copy over, keeping the higher role on conflict.
        sqlx::query(
            r#"
            INSERT INTO tenant_members (id, tenant_id, user_id, role, joined_at, invited_by)
            SELECT gen_random_uuid(), $2, user_id, role, joined_at, invited_by
            FROM tenant_members
            WHERE tenant_id = $1
            ON CONFLICT (tenant_id, user_id) DO UPDATE
            SET role = CASE
                WHEN tenant_role_rank(EXCLUDED.role) > tenant_role_rank(tenant_members.role)
                THEN EXCLUDED.role
                ELSE tenant_members.role
            END
            "#,
        )
        .bind(source.id)
        .bind(target.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("merging members", e))?;

        // Permissions and pending invites follow the members.
        sqlx::query("UPDATE permissions SET tenant_id = $2 WHERE tenant_id = $1")
            .bind(source.id)
            .bind(target.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_err("merging permissions", e))?;

        sqlx::query(
            "UPDATE tenant_invites SET tenant_id = $2 WHERE tenant_id = $1 AND status = 'pending'",
        )
        .bind(source.id)
        .bind(target.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("merging invites", e))?;

        // Reparent the source's descendants under the target: strip the
        // source's prefix plus the source itself, prepend the target's.
        let new_prefix = target.subtree_prefix();
        let old_prefix_len = source.path.len() as i32 + 1;
        let level_delta = target.level - source.level;

        sqlx::query(
            r#"
            UPDATE tenants
            SET path = $3::uuid[] || COALESCE(path[($4::int + 1):], '{}'::uuid[]),
                level = level + $5,
                root_id = $6,
                parent_id = CASE WHEN parent_id = $1 THEN $2 ELSE parent_id END,
                max_depth = $7,
                updated_at = now()
            WHERE path @> ARRAY[$1]::uuid[]
            "#,
        )
        .bind(source.id)
        .bind(target.id)
        .bind(&new_prefix)
        .bind(old_prefix_len)
        .bind(level_delta)
        .bind(target.root_id)
        .bind(target.max_depth)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("merging children", e))?;

        sqlx::query("UPDATE tenants SET settings = $2, updated_at = now() WHERE id = $1")
            .bind(target.id)
            .bind(merged_settings)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_err("applying merged settings", e))?;

        // Source rows in dependent tables fall away via cascade.
        sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(source.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_err("removing merged source", e))?;

        if let Some(event) = &audit {
            insert_audit_event(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing merge", e))?;

        info!("Merged tenant {} into {}", source.id, target.id);
        Ok(())
    }

    async fn apply_path_updates(
        &self,
        actor: Uuid,
        root_id: Uuid,
        updates: &[PathUpdate],
    ) -> Result<u64, DomainError> {
        if updates.is_empty() {
            return Ok(0);
        }
        let mut tx = open_tx(&self.pool, actor, self.statement_timeout_ms).await?;
        lock_subtree(&mut tx, root_id).await?;

        let mut touched = 0u64;
        for update in updates {
            let result = sqlx::query(
                r#"
                UPDATE tenants
                SET path = $2, level = $3, root_id = $4, updated_at = now()
                WHERE id = $1
                  AND (path <> $2 OR level <> $3 OR root_id <> $4)
                "#,
            )
            .bind(update.id)
            .bind(&update.path)
            .bind(update.level)
            .bind(update.root_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_err("applying path update", e))?;
            touched += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_err("committing path rebuild", e))?;

        info!("Rebuilt paths under {} ({} rows changed)", root_id, touched);
        Ok(touched)
    }
}
