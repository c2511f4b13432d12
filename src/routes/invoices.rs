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
use crate::models::customer::DeleteRequest;
use crate::models::invoice::{
    DbInvoice, Invoice, InvoiceCreateRequest, InvoiceUpdateRequest, INVOICE_STATUSES,
};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/invoices",
    tag = "Invoices",
    responses((status = 200, description = "List active invoices", body = [Invoice])),
    security(("bearerAuth" = []))
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Invoice>>> {
    let principal = require_permission(&state.pool, &auth, Permission::InvoicesView).await?;

    let sql = format!(
        "SELECT {} FROM invoices WHERE organization_id = ? AND del_flag = 0 ORDER BY created_at DESC",
        DbInvoice::COLUMNS
    );
    let invoices = sqlx::query_as::<_, DbInvoice>(&sql)
        .bind(principal.organization_id.to_string())
        .fetch_all(&state.pool)
        .await?;

    let invoices: Vec<Invoice> = invoices
        .into_iter()
        .map(Invoice::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(invoices))
}

#[utoipa::path(
    post,
    path = "/invoices",
    tag = "Invoices",
    request_body = InvoiceCreateRequest,
    responses(
        (status = 201, description = "Invoice created", body = Invoice),
        (status = 404, description = "Customer not found"),
        (status = 409, description = "Invoice number already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<InvoiceCreateRequest>,
) -> AppResult<(StatusCode, Json<Invoice>)> {
    let principal = require_permission(&state.pool, &auth, Permission::InvoicesCreate).await?;
    let org = principal.organization_id;

    // Invoices can only reference an active customer in the same tenant.
    let customer_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM customers WHERE id = ? AND organization_id = ? AND del_flag = 0",
    )
    .bind(payload.customer_id.to_string())
    .bind(org.to_string())
    .fetch_one(&state.pool)
    .await?;
    if customer_exists == 0 {
        return Err(AppError::not_found("Customer not found"));
    }

    let duplicate: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM invoices WHERE organization_id = ? AND invoice_number = ?",
    )
    .bind(org.to_string())
    .bind(&payload.invoice_number)
    .fetch_one(&state.pool)
    .await?;
    if duplicate > 0 {
        return Err(AppError::conflict("invoice number already in use"));
    }

    let now = utc_now();
    let invoice_id = Uuid::new_v4();
    let issue_date = payload.issue_date.unwrap_or(now);
    let currency = payload.currency.unwrap_or_else(|| "USD".to_string());
    let tax_rate = payload.tax_rate.unwrap_or(0.0);
    let (tax_amount, total) = Invoice::compute_totals(payload.subtotal, tax_rate);

    sqlx::query(
        "INSERT INTO invoices (id, organization_id, customer_id, invoice_number, status, issue_date, due_date, currency, subtotal, tax_rate, tax_amount, total, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 'draft', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(invoice_id.to_string())
    .bind(org.to_string())
    .bind(payload.customer_id.to_string())
    .bind(&payload.invoice_number)
    .bind(issue_date)
    .bind(payload.due_date)
    .bind(&currency)
    .bind(payload.subtotal)
    .bind(tax_rate)
    .bind(tax_amount)
    .bind(total)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let invoice: Invoice = fetch_invoice(&state.pool, org, invoice_id).await?.try_into()?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &invoice,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(invoice)))
}

#[utoipa::path(
    get,
    path = "/invoices/{id}",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses((status = 200, description = "Invoice detail", body = Invoice)),
    security(("bearerAuth" = []))
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Invoice>> {
    let principal = require_permission(&state.pool, &auth, Permission::InvoicesView).await?;
    let invoice: Invoice = fetch_invoice(&state.pool, principal.organization_id, id)
        .await?
        .try_into()?;
    Ok(Json(invoice))
}

#[utoipa::path(
    put,
    path = "/invoices/{id}",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = InvoiceUpdateRequest,
    responses((status = 200, description = "Invoice updated", body = Invoice)),
    security(("bearerAuth" = []))
)]
pub async fn update_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<InvoiceUpdateRequest>,
) -> AppResult<Json<Invoice>> {
    let principal = require_permission(&state.pool, &auth, Permission::InvoicesUpdate).await?;

    let before: Invoice = fetch_invoice(&state.pool, principal.organization_id, id)
        .await?
        .try_into()?;

    let mut after = before.clone();
    if let Some(status) = payload.status.as_ref() {
        if !INVOICE_STATUSES.contains(&status.as_str()) {
            return Err(AppError::bad_request(format!("invalid status: {status}")));
        }
        after.status = status.clone();
    }
    if payload.due_date.is_some() {
        after.due_date = payload.due_date;
    }
    if let Some(subtotal) = payload.subtotal {
        after.subtotal = subtotal;
    }
    if let Some(tax_rate) = payload.tax_rate {
        after.tax_rate = tax_rate;
    }
    let (tax_amount, total) = Invoice::compute_totals(after.subtotal, after.tax_rate);
    after.tax_amount = tax_amount;
    after.total = total;

    let now = utc_now();

    sqlx::query(
        "UPDATE invoices SET status = ?, due_date = ?, subtotal = ?, tax_rate = ?, tax_amount = ?, total = ?, modified_by = ?, mod_flag = 1, updated_at = ? \
         WHERE id = ? AND organization_id = ? AND del_flag = 0",
    )
    .bind(&after.status)
    .bind(after.due_date)
    .bind(after.subtotal)
    .bind(after.tax_rate)
    .bind(after.tax_amount)
    .bind(after.total)
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
    path = "/invoices/{id}",
    tag = "Invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = DeleteRequest,
    responses(
        (status = 200, description = "Invoice moved to trash", body = Invoice),
        (status = 404, description = "Invoice not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Option<Json<DeleteRequest>>,
) -> AppResult<Json<Invoice>> {
    let principal = require_permission(&state.pool, &auth, Permission::InvoicesDelete).await?;

    let before: Invoice = fetch_invoice(&state.pool, principal.organization_id, id)
        .await?
        .try_into()?;

    let ctx = RequestContext::from_headers(&headers);
    let snapshot = serde_json::to_value(&before).ok();
    let metadata = DeletionMetadata::from_request(&ctx, snapshot);
    let reason = payload.as_ref().and_then(|p| p.reason.clone());

    let deleted = lifecycle::soft_delete::<DbInvoice>(
        &state.pool,
        principal.organization_id,
        id,
        auth.user_id,
        reason.as_deref(),
        Some(&metadata),
    )
    .await?
    .ok_or_else(|| AppError::not_found("Invoice not found"))?;

    let deleted: Invoice = deleted.try_into()?;

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

async fn fetch_invoice(
    pool: &SqlitePool,
    organization_id: Uuid,
    invoice_id: Uuid,
) -> AppResult<DbInvoice> {
    let sql = format!(
        "SELECT {} FROM invoices WHERE id = ? AND organization_id = ? AND del_flag = 0",
        DbInvoice::COLUMNS
    );
    sqlx::query_as::<_, DbInvoice>(&sql)
        .bind(invoice_id.to_string())
        .bind(organization_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Invoice not found"))
}
