use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

use super::parse_uuid;

/// The tenant. Every other record is partitioned by `Organization::id` and
/// that partition is immutable: nothing in the API ever rewrites an
/// `organization_id` column.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbOrganization {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbOrganization> for Organization {
    type Error = AppError;

    fn try_from(value: DbOrganization) -> Result<Self, Self::Error> {
        Ok(Organization {
            id: parse_uuid(&value.id, "organizations.id")?,
            name: value.name,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}
