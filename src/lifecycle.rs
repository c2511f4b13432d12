//! Soft-delete record lifecycle, generic over any business record type.
//!
//! Records are never physically removed by ordinary deletes: `soft_delete`
//! marks them with `del_flag` plus deletion metadata, `restore` clears those
//! fields, and `purge` is the separately-gated permanent removal. Default
//! queries elsewhere in the crate always filter `del_flag = 0`; the deleted
//! set is reachable only through `list_deleted`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqlitePool};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::events::RequestContext;
use crate::utils::utc_now;

/// A record type that participates in the soft-delete lifecycle.
///
/// Implementors are the raw row types; `TABLE` names the backing table and
/// `COLUMNS` its select list (tables differ in their business columns, so the
/// list cannot be shared).
pub trait Trashable: for<'r> FromRow<'r, SqliteRow> + Send + Unpin {
    const TABLE: &'static str;
    const COLUMNS: &'static str;
}

/// Context captured alongside a soft delete for the audit trail.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DeletionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Point-in-time copy of the record as it was deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub snapshot: Option<Value>,
}

impl DeletionMetadata {
    pub fn from_request(ctx: &RequestContext, snapshot: Option<Value>) -> Self {
        Self {
            ip_address: ctx.ip.clone(),
            user_agent: ctx.user_agent.clone(),
            snapshot,
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Pagination for the deleted set. Sort order is fixed: most recently
/// deleted first.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TrashPage {
    #[serde(default = "TrashPage::default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub skip: i64,
}

impl TrashPage {
    const fn default_limit() -> i64 {
        50
    }
}

impl Default for TrashPage {
    fn default() -> Self {
        Self {
            limit: Self::default_limit(),
            skip: 0,
        }
    }
}

/// Mark a record deleted and stamp the deletion metadata.
///
/// Returns the updated record, or `None` when the id does not exist in this
/// organization. Calling it again on an already-deleted record converges to
/// the same state (the stamps are overwritten); callers must not read a state
/// transition out of a `Some` return.
pub async fn soft_delete<T: Trashable>(
    pool: &SqlitePool,
    organization_id: Uuid,
    id: Uuid,
    actor_id: Uuid,
    reason: Option<&str>,
    metadata: Option<&DeletionMetadata>,
) -> AppResult<Option<T>> {
    let now = utc_now();
    let sql = format!(
        "UPDATE {table} SET del_flag = 1, deleted_at = ?, deleted_by = ?, deletion_reason = ?, \
         deletion_metadata = ?, updated_at = ? WHERE id = ? AND organization_id = ?",
        table = T::TABLE
    );

    sqlx::query(&sql)
        .bind(now)
        .bind(actor_id.to_string())
        .bind(reason)
        .bind(metadata.map(DeletionMetadata::to_json))
        .bind(now)
        .bind(id.to_string())
        .bind(organization_id.to_string())
        .execute(pool)
        .await?;

    find::<T>(pool, organization_id, id).await
}

/// Clear the deletion fields. Idempotent: restoring an already-active record
/// is a no-op that returns the current state. Field values from before the
/// delete are not rolled back (there is no versioning).
pub async fn restore<T: Trashable>(
    pool: &SqlitePool,
    organization_id: Uuid,
    id: Uuid,
) -> AppResult<Option<T>> {
    let sql = format!(
        "UPDATE {table} SET del_flag = 0, deleted_at = NULL, deleted_by = NULL, \
         deletion_reason = NULL, deletion_metadata = NULL, updated_at = ? \
         WHERE id = ? AND organization_id = ?",
        table = T::TABLE
    );

    sqlx::query(&sql)
        .bind(utc_now())
        .bind(id.to_string())
        .bind(organization_id.to_string())
        .execute(pool)
        .await?;

    find::<T>(pool, organization_id, id).await
}

/// List the deleted set for a tenant, newest deletion first, with the total
/// count for pagination.
pub async fn list_deleted<T: Trashable>(
    pool: &SqlitePool,
    organization_id: Uuid,
    page: TrashPage,
) -> AppResult<(Vec<T>, i64)> {
    let sql = format!(
        "SELECT {columns} FROM {table} WHERE organization_id = ? AND del_flag = 1 \
         ORDER BY deleted_at DESC LIMIT ? OFFSET ?",
        columns = T::COLUMNS,
        table = T::TABLE
    );

    let items = sqlx::query_as::<_, T>(&sql)
        .bind(organization_id.to_string())
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(pool)
        .await?;

    let count_sql = format!(
        "SELECT COUNT(*) FROM {table} WHERE organization_id = ? AND del_flag = 1",
        table = T::TABLE
    );
    let total: i64 = sqlx::query_scalar(&count_sql)
        .bind(organization_id.to_string())
        .fetch_one(pool)
        .await?;

    Ok((items, total))
}

/// Irreversibly remove a record. Returns whether a row was actually deleted.
pub async fn purge<T: Trashable>(
    pool: &SqlitePool,
    organization_id: Uuid,
    id: Uuid,
) -> AppResult<bool> {
    let sql = format!(
        "DELETE FROM {table} WHERE id = ? AND organization_id = ?",
        table = T::TABLE
    );

    let result = sqlx::query(&sql)
        .bind(id.to_string())
        .bind(organization_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Look up a record by id within a tenant, regardless of deletion state.
pub async fn find<T: Trashable>(
    pool: &SqlitePool,
    organization_id: Uuid,
    id: Uuid,
) -> AppResult<Option<T>> {
    let sql = format!(
        "SELECT {columns} FROM {table} WHERE id = ? AND organization_id = ?",
        columns = T::COLUMNS,
        table = T::TABLE
    );

    Ok(sqlx::query_as::<_, T>(&sql)
        .bind(id.to_string())
        .bind(organization_id.to_string())
        .fetch_optional(pool)
        .await?)
}
