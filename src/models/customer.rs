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
pub struct Customer {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
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

impl Loggable for Customer {
    fn entity_type() -> &'static str {
        "customer"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCustomer {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
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

impl Trashable for DbCustomer {
    const TABLE: &'static str = "customers";
    const COLUMNS: &'static str = "id, organization_id, name, email, phone, address, notes, \
        created_by, modified_by, mod_flag, created_at, updated_at, del_flag, deleted_at, \
        deleted_by, deletion_reason, deletion_metadata";
}

impl TryFrom<DbCustomer> for Customer {
    type Error = AppError;

    fn try_from(value: DbCustomer) -> Result<Self, Self::Error> {
        Ok(Customer {
            id: parse_uuid(&value.id, "customers.id")?,
            organization_id: parse_uuid(&value.organization_id, "customers.organization_id")?,
            name: value.name,
            email: value.email,
            phone: value.phone,
            address: value.address,
            notes: value.notes,
            created_by: parse_uuid_opt(value.created_by.as_deref(), "customers.created_by")?,
            modified_by: parse_uuid_opt(value.modified_by.as_deref(), "customers.modified_by")?,
            mod_flag: value.mod_flag,
            created_at: value.created_at,
            updated_at: value.updated_at,
            del_flag: value.del_flag,
            deleted_at: value.deleted_at,
            deleted_by: parse_uuid_opt(value.deleted_by.as_deref(), "customers.deleted_by")?,
            deletion_reason: value.deletion_reason,
            deletion_metadata: value
                .deletion_metadata
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok()),
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomerCreateRequest {
    #[schema(example = "Globex Ltd")]
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomerUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

/// Body for a soft delete; everything is optional.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DeleteRequest {
    #[schema(example = "duplicate")]
    pub reason: Option<String>,
}
