use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{PageGuard, Permission};
use crate::errors::{AppError, AppResult};
use crate::jwt::MaybeAuthUser;
use crate::models::organization::{DbOrganization, Organization};

/// Where denied dashboard requests land.
const DASHBOARD_FALLBACK: &str = "/";

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardSummary {
    pub organization: Organization,
    pub customers: i64,
    pub invoices: i64,
    pub trashed: i64,
}

/// Page route: denial is a redirect to the fallback path, not an error body.
/// The guard returns a plain `Result`; the router turns the `Err` variant
/// into the redirect response.
#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "Dashboard",
    responses(
        (status = 200, description = "Tenant summary", body = DashboardSummary),
        (status = 303, description = "Denied, redirected to fallback")
    ),
    security(("bearerAuth" = []))
)]
pub async fn dashboard(
    State(state): State<AppState>,
    MaybeAuthUser(auth): MaybeAuthUser,
) -> Result<Json<DashboardSummary>, Response> {
    let principal = PageGuard::new()
        .permission(Permission::DashboardView)
        .redirect_to(DASHBOARD_FALLBACK)
        .evaluate(&state.pool, auth.as_ref())
        .await
        .map_err(IntoResponse::into_response)?;

    let org = principal.organization_id;
    let summary = DashboardSummary {
        organization: fetch_organization(&state.pool, org)
            .await
            .map_err(IntoResponse::into_response)?,
        customers: count_active(&state.pool, "customers", org)
            .await
            .map_err(IntoResponse::into_response)?,
        invoices: count_active(&state.pool, "invoices", org)
            .await
            .map_err(IntoResponse::into_response)?,
        trashed: count_trashed(&state.pool, org)
            .await
            .map_err(IntoResponse::into_response)?,
    };

    Ok(Json(summary))
}

async fn fetch_organization(pool: &SqlitePool, org: Uuid) -> AppResult<Organization> {
    sqlx::query_as::<_, DbOrganization>(
        "SELECT id, name, created_at, updated_at FROM organizations WHERE id = ?",
    )
    .bind(org.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Organization not found"))?
    .try_into()
}

async fn count_active(pool: &SqlitePool, table: &str, org: Uuid) -> AppResult<i64> {
    let sql =
        format!("SELECT COUNT(*) FROM {table} WHERE organization_id = ? AND del_flag = 0");
    Ok(sqlx::query_scalar(&sql)
        .bind(org.to_string())
        .fetch_one(pool)
        .await?)
}

async fn count_trashed(pool: &SqlitePool, org: Uuid) -> AppResult<i64> {
    let mut total = 0i64;
    for table in ["customers", "invoices"] {
        let sql =
            format!("SELECT COUNT(*) FROM {table} WHERE organization_id = ? AND del_flag = 1");
        total += sqlx::query_scalar::<_, i64>(&sql)
            .bind(org.to_string())
            .fetch_one(pool)
            .await?;
    }
    Ok(total)
}
