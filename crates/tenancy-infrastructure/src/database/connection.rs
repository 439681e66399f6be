//! Database connection pool and transaction discipline
//!
//! Every mutating repository call opens its transaction through `open_tx`,
//! which applies a `SET LOCAL statement_timeout` and binds the acting user
//! to `app.current_user_id` for the row-level-security policies. Subtree
//! writes that change tree shape additionally serialize on the root id via
//! `lock_subtree` so overlapping structural changes cannot both commit.

use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

use tenancy_core::error::DomainError;

pub async fn create_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(url)
        .await
}

/// Map a driver error onto the domain taxonomy. Timeouts and lock
/// conflicts keep their own variants so callers can distinguish them from
/// plain failures.
pub fn map_sqlx_err(context: &str, e: sqlx::Error) -> DomainError {
    error!("Database error {}: {}", context, e);
    let msg = e.to_string();
    if msg.contains("statement timeout") || msg.contains("canceling statement") {
        return DomainError::Timeout;
    }
    DomainError::Database(msg)
}

/// Unique-violation sniffing for insert/update paths.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    let msg = e.to_string();
    msg.contains("unique") || msg.contains("duplicate")
}

/// Open a transaction with the statement timeout and RLS user applied.
pub async fn open_tx(
    pool: &PgPool,
    actor: Uuid,
    statement_timeout_ms: u64,
) -> Result<Transaction<'_, Postgres>, DomainError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| map_sqlx_err("beginning transaction", e))?;

    sqlx::query(&format!("SET LOCAL statement_timeout = {statement_timeout_ms}"))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("setting statement timeout", e))?;

    sqlx::query("SELECT set_config('app.current_user_id', $1, true)")
        .bind(actor.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("binding session user", e))?;

    Ok(tx)
}

/// Transaction for maintenance work that runs outside any user session
/// (access-map rebuilds). Timeout applies, no RLS user is bound.
pub async fn open_system_tx(
    pool: &PgPool,
    statement_timeout_ms: u64,
) -> Result<Transaction<'_, Postgres>, DomainError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| map_sqlx_err("beginning transaction", e))?;

    sqlx::query(&format!("SET LOCAL statement_timeout = {statement_timeout_ms}"))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_err("setting statement timeout", e))?;

    Ok(tx)
}

/// Transaction-scoped advisory lock keyed on the subtree root. Blocks
/// until the competing structural change commits or rolls back; released
/// automatically at transaction end.
pub async fn lock_subtree(
    tx: &mut Transaction<'_, Postgres>,
    root_id: Uuid,
) -> Result<(), DomainError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(root_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.message().contains("canceling statement")) {
                DomainError::Conflict { root_id }
            } else {
                map_sqlx_err("locking subtree", e)
            }
        })?;
    Ok(())
}
