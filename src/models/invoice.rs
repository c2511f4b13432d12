use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::Loggable;
use crate::lifecycle::{DeletionMetadata, Trashable};

use super::{parse_uuid, parse_uuid_opt};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Invoice {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub invoice_number: String,
    /// draft | sent | paid | void
    pub status: String,
    pub issue_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub currency: String,
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<Uuid>,
    pub mod_flag: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub del_flag: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_metadata: Option<DeletionMetadata>,
}

impl Invoice {
    /// Closed-form tax arithmetic, rounded to cents.
    pub fn compute_totals(subtotal: f64, tax_rate: f64) -> (f64, f64) {
        let tax_amount = (subtotal * tax_rate * 100.0).round() / 100.0;
        let total = ((subtotal + tax_amount) * 100.0).round() / 100.0;
        (tax_amount, total)
    }
}

impl Loggable for Invoice {
    fn entity_type() -> &'static str {
        "invoice"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbInvoice {
    pub id: String,
    pub organization_id: String,
    pub customer_id: String,
    pub invoice_number: String,
    pub status: String,
    pub issue_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub currency: String,
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub total: f64,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
    pub mod_flag: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub del_flag: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub deletion_reason: Option<String>,
    pub deletion_metadata: Option<String>,
}

impl Trashable for DbInvoice {
    const TABLE: &'static str = "invoices";
    const COLUMNS: &'static str = "id, organization_id, customer_id, invoice_number, status, \
        issue_date, due_date, currency, subtotal, tax_rate, tax_amount, total, created_by, \
        modified_by, mod_flag, created_at, updated_at, del_flag, deleted_at, deleted_by, \
        deletion_reason, deletion_metadata";
}

impl TryFrom<DbInvoice> for Invoice {
    type Error = AppError;

    fn try_from(value: DbInvoice) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: parse_uuid(&value.id, "invoices.id")?,
            organization_id: parse_uuid(&value.organization_id, "invoices.organization_id")?,
            customer_id: parse_uuid(&value.customer_id, "invoices.customer_id")?,
            invoice_number: value.invoice_number,
            status: value.status,
            issue_date: value.issue_date,
            due_date: value.due_date,
            currency: value.currency,
            subtotal: value.subtotal,
            tax_rate: value.tax_rate,
            tax_amount: value.tax_amount,
            total: value.total,
            created_by: parse_uuid_opt(value.created_by.as_deref(), "invoices.created_by")?,
            modified_by: parse_uuid_opt(value.modified_by.as_deref(), "invoices.modified_by")?,
            mod_flag: value.mod_flag,
            created_at: value.created_at,
            updated_at: value.updated_at,
            del_flag: value.del_flag,
            deleted_at: value.deleted_at,
            deleted_by: parse_uuid_opt(value.deleted_by.as_deref(), "invoices.deleted_by")?,
            deletion_reason: value.deletion_reason,
            deletion_metadata: value
                .deletion_metadata
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InvoiceCreateRequest {
    pub customer_id: Uuid,
    #[schema(example = "INV-2026-0001")]
    pub invoice_number: String,
    pub issue_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    #[schema(example = "USD")]
    pub currency: Option<String>,
    pub subtotal: f64,
    /// Fractional rate, e.g. 0.075 for 7.5% VAT.
    pub tax_rate: Option<f64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InvoiceUpdateRequest {
    pub status: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub subtotal: Option<f64>,
    pub tax_rate: Option<f64>,
}

pub const INVOICE_STATUSES: &[&str] = &["draft", "sent", "paid", "void"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_round_to_cents() {
        let (tax, total) = Invoice::compute_totals(100.0, 0.075);
        assert_eq!(tax, 7.5);
        assert_eq!(total, 107.5);

        let (tax, total) = Invoice::compute_totals(19.99, 0.0725);
        assert_eq!(tax, 1.45);
        assert_eq!(total, 21.44);
    }

    #[test]
    fn zero_rate_means_no_tax() {
        let (tax, total) = Invoice::compute_totals(250.0, 0.0);
        assert_eq!(tax, 0.0);
        assert_eq!(total, 250.0);
    }
}
