//! Trash endpoints: the only path to the deleted set.
//!
//! Restore clears the deletion stamps; purge is the permanent removal and is
//! gated by its own, stricter permission than ordinary delete.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{require_permission, Permission, Principal};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::lifecycle::{self, TrashPage};
use crate::models::customer::{Customer, DbCustomer};
use crate::models::invoice::{DbInvoice, Invoice};

/// Record types reachable through the trash API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrashEntity {
    Customers,
    Invoices,
}

impl TrashEntity {
    fn parse(raw: &str) -> AppResult<Self> {
        match raw {
            "customers" => Ok(TrashEntity::Customers),
            "invoices" => Ok(TrashEntity::Invoices),
            other => Err(AppError::bad_request(format!("unknown trash entity: {other}"))),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrashListResponse {
    /// Deleted records, newest deletion first.
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<Value>,
    pub total: i64,
}

#[utoipa::path(
    get,
    path = "/trash/{entity}",
    tag = "Trash",
    params(
        ("entity" = String, Path, description = "customers | invoices"),
        ("limit" = Option<i64>, Query, description = "Page size, default 50"),
        ("skip" = Option<i64>, Query, description = "Offset, default 0"),
    ),
    responses((status = 200, description = "Deleted records for the tenant", body = TrashListResponse)),
    security(("bearerAuth" = []))
)]
pub async fn list_trash(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(entity): Path<String>,
    Query(page): Query<TrashPage>,
) -> AppResult<Json<TrashListResponse>> {
    let principal = require_permission(&state.pool, &auth, Permission::TrashView).await?;
    let entity = TrashEntity::parse(&entity)?;
    let org = principal.organization_id;

    let (items, total) = match entity {
        TrashEntity::Customers => {
            let (rows, total) = lifecycle::list_deleted::<DbCustomer>(&state.pool, org, page).await?;
            (to_values::<DbCustomer, Customer>(rows)?, total)
        }
        TrashEntity::Invoices => {
            let (rows, total) = lifecycle::list_deleted::<DbInvoice>(&state.pool, org, page).await?;
            (to_values::<DbInvoice, Invoice>(rows)?, total)
        }
    };

    Ok(Json(TrashListResponse { items, total }))
}

#[utoipa::path(
    post,
    path = "/trash/{entity}/{id}/restore",
    tag = "Trash",
    params(
        ("entity" = String, Path, description = "customers | invoices"),
        ("id" = Uuid, Path, description = "Record id"),
    ),
    responses(
        (status = 200, description = "Record restored (idempotent)"),
        (status = 404, description = "Record not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn restore_item(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((entity, id)): Path<(String, Uuid)>,
) -> AppResult<Json<Value>> {
    let principal = require_permission(&state.pool, &auth, Permission::TrashRestore).await?;
    let entity = TrashEntity::parse(&entity)?;
    let ctx = RequestContext::from_headers(&headers);

    let restored = match entity {
        TrashEntity::Customers => {
            let row = lifecycle::restore::<DbCustomer>(&state.pool, principal.organization_id, id)
                .await?
                .ok_or_else(|| AppError::not_found("Customer not found"))?;
            let customer: Customer = row.try_into()?;
            log_activity_with_context(
                &state.event_bus,
                "restored",
                Some(auth.user_id),
                &customer,
                None,
                Some(ctx),
            );
            serde_json::to_value(&customer)
        }
        TrashEntity::Invoices => {
            let row = lifecycle::restore::<DbInvoice>(&state.pool, principal.organization_id, id)
                .await?
                .ok_or_else(|| AppError::not_found("Invoice not found"))?;
            let invoice: Invoice = row.try_into()?;
            log_activity_with_context(
                &state.event_bus,
                "restored",
                Some(auth.user_id),
                &invoice,
                None,
                Some(ctx),
            );
            serde_json::to_value(&invoice)
        }
    }
    .map_err(|err| AppError::internal(err.to_string()))?;

    Ok(Json(restored))
}

#[utoipa::path(
    delete,
    path = "/trash/{entity}/{id}",
    tag = "Trash",
    params(
        ("entity" = String, Path, description = "customers | invoices"),
        ("id" = Uuid, Path, description = "Record id"),
    ),
    responses(
        (status = 204, description = "Record permanently deleted"),
        (status = 404, description = "Record not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn purge_item(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((entity, id)): Path<(String, Uuid)>,
) -> AppResult<StatusCode> {
    let principal = require_permission(&state.pool, &auth, Permission::TrashPurge).await?;
    let entity = TrashEntity::parse(&entity)?;
    let ctx = RequestContext::from_headers(&headers);

    let removed = match entity {
        TrashEntity::Customers => {
            purge_logged::<DbCustomer, Customer>(&state, &principal, auth.user_id, id, ctx).await?
        }
        TrashEntity::Invoices => {
            purge_logged::<DbInvoice, Invoice>(&state, &principal, auth.user_id, id, ctx).await?
        }
    };

    if !removed {
        return Err(AppError::not_found("Record not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn purge_logged<Db, Domain>(
    state: &AppState,
    principal: &Principal,
    actor_id: Uuid,
    id: Uuid,
    ctx: RequestContext,
) -> AppResult<bool>
where
    Db: lifecycle::Trashable,
    Domain: TryFrom<Db, Error = AppError> + crate::events::Loggable,
{
    // Capture the record before it is gone so the audit trail keeps a copy.
    let record = lifecycle::find::<Db>(&state.pool, principal.organization_id, id).await?;

    let removed = lifecycle::purge::<Db>(&state.pool, principal.organization_id, id).await?;

    if removed {
        if let Some(row) = record {
            let domain: Domain = row.try_into()?;
            log_activity_with_context(
                &state.event_bus,
                "purged",
                Some(actor_id),
                &domain,
                None,
                Some(ctx),
            );
        }
    }

    Ok(removed)
}

fn to_values<Db, Domain>(rows: Vec<Db>) -> AppResult<Vec<Value>>
where
    Domain: TryFrom<Db, Error = AppError> + Serialize,
{
    rows.into_iter()
        .map(|row| {
            let domain: Domain = row.try_into()?;
            serde_json::to_value(&domain).map_err(|err| AppError::internal(err.to_string()))
        })
        .collect()
}
