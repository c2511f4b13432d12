use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{require_permission, Permission};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::lifecycle::{self, DeletionMetadata, Trashable};
use crate::models::customer::{
    Customer, CustomerCreateRequest, CustomerUpdateRequest, DbCustomer, DeleteRequest,
};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/customers",
    tag = "Customers",
    responses((status = 200, description = "List active customers", body = [Customer])),
    security(("bearerAuth" = []))
)]
pub async fn list_customers(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Customer>>> {
    let principal = require_permission(&state.pool, &auth, Permission::CustomersView).await?;

    let sql = format!(
        "SELECT {} FROM customers WHERE organization_id = ? AND del_flag = 0 ORDER BY created_at DESC",
        DbCustomer::COLUMNS
    );
    let customers = sqlx::query_as::<_, DbCustomer>(&sql)
        .bind(principal.organization_id.to_string())
        .fetch_all(&state.pool)
        .await?;

    let customers: Vec<Customer> = customers
        .into_iter()
        .map(Customer::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(customers))
}

#[utoipa::path(
    post,
    path = "/customers",
    tag = "Customers",
    request_body = CustomerCreateRequest,
    responses((status = 201, description = "Customer created", body = Customer)),
    security(("bearerAuth" = []))
)]
pub async fn create_customer(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<CustomerCreateRequest>,
) -> AppResult<(StatusCode, Json<Customer>)> {
    let principal = require_permission(&state.pool, &auth, Permission::CustomersCreate).await?;

    let now = utc_now();
    let customer_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO customers (id, organization_id, name, email, phone, address, notes, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(customer_id.to_string())
    .bind(principal.organization_id.to_string())
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.address)
    .bind(&payload.notes)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let customer: Customer =
        fetch_customer(&state.pool, principal.organization_id, customer_id)
            .await?
            .try_into()?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &customer,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(customer)))
}

#[utoipa::path(
    get,
    path = "/customers/{id}",
    tag = "Customers",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses((status = 200, description = "Customer detail", body = Customer)),
    security(("bearerAuth" = []))
)]
pub async fn get_customer(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Customer>> {
    let principal = require_permission(&state.pool, &auth, Permission::CustomersView).await?;
    let customer: Customer = fetch_customer(&state.pool, principal.organization_id, id)
        .await?
        .try_into()?;
    Ok(Json(customer))
}

#[utoipa::path(
    put,
    path = "/customers/{id}",
    tag = "Customers",
    params(("id" = Uuid, Path, description = "Customer id")),
    request_body = CustomerUpdateRequest,
    responses((status = 200, description = "Customer updated", body = Customer)),
    security(("bearerAuth" = []))
)]
pub async fn update_customer(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<CustomerUpdateRequest>,
) -> AppResult<Json<Customer>> {
    let principal = require_permission(&state.pool, &auth, Permission::CustomersUpdate).await?;

    let before: Customer = fetch_customer(&state.pool, principal.organization_id, id)
        .await?
        .try_into()?;

    let mut after = before.clone();
    if let Some(name) = payload.name.as_ref() {
        after.name = name.clone();
    }
    if payload.email.is_some() {
        after.email = payload.email.clone();
    }
    if payload.phone.is_some() {
        after.phone = payload.phone.clone();
    }
    if payload.address.is_some() {
        after.address = payload.address.clone();
    }
    if payload.notes.is_some() {
        after.notes = payload.notes.clone();
    }

    let now = utc_now();

    sqlx::query(
        "UPDATE customers SET name = ?, email = ?, phone = ?, address = ?, notes = ?, modified_by = ?, mod_flag = 1, updated_at = ? WHERE id = ? AND organization_id = ? AND del_flag = 0",
    )
    .bind(&after.name)
    .bind(&after.email)
    .bind(&after.phone)
    .bind(&after.address)
    .bind(&after.notes)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(id.to_string())
    .bind(principal.organization_id.to_string())
    .execute(&state.pool)
    .await?;

    after.modified_by = Some(auth.user_id);
    after.mod_flag = true;
    after.updated_at = now;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &after,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(after))
}

#[utoipa::path(
    delete,
    path = "/customers/{id}",
    tag = "Customers",
    params(("id" = Uuid, Path, description = "Customer id")),
    request_body = DeleteRequest,
    responses(
        (status = 200, description = "Customer moved to trash", body = Customer),
        (status = 404, description = "Customer not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_customer(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Option<Json<DeleteRequest>>,
) -> AppResult<Json<Customer>> {
    let principal = require_permission(&state.pool, &auth, Permission::CustomersDelete).await?;

    let before: Customer = fetch_customer(&state.pool, principal.organization_id, id)
        .await?
        .try_into()?;

    let ctx = RequestContext::from_headers(&headers);
    let snapshot = serde_json::to_value(&before).ok();
    let metadata = DeletionMetadata::from_request(&ctx, snapshot);
    let reason = payload.as_ref().and_then(|p| p.reason.clone());

    let deleted = lifecycle::soft_delete::<DbCustomer>(
        &state.pool,
        principal.organization_id,
        id,
        auth.user_id,
        reason.as_deref(),
        Some(&metadata),
    )
    .await?
    .ok_or_else(|| AppError::not_found("Customer not found"))?;

    let deleted: Customer = deleted.try_into()?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &deleted,
        Some(&before),
        Some(ctx),
    );

    Ok(Json(deleted))
}

async fn fetch_customer(
    pool: &SqlitePool,
    organization_id: Uuid,
    customer_id: Uuid,
) -> AppResult<DbCustomer> {
    let sql = format!(
        "SELECT {} FROM customers WHERE id = ? AND organization_id = ? AND del_flag = 0",
        DbCustomer::COLUMNS
    );
    sqlx::query_as::<_, DbCustomer>(&sql)
        .bind(customer_id.to_string())
        .bind(organization_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Customer not found"))
}
