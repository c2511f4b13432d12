use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::PermissionSet;
use crate::errors::AppError;
use crate::events::{Loggable, Severity};

use super::parse_uuid;

/// A named bundle of permission flags, scoped to one organization.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub display_name: String,
    /// Permission key -> granted. Absent keys deny.
    #[schema(value_type = Object)]
    pub permissions: PermissionSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Role {
    fn entity_type() -> &'static str {
        "role"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub display_name: String,
    pub permissions: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbRole> for Role {
    type Error = AppError;

    fn try_from(value: DbRole) -> Result<Self, Self::Error> {
        Ok(Role {
            id: parse_uuid(&value.id, "roles.id")?,
            organization_id: parse_uuid(&value.organization_id, "roles.organization_id")?,
            name: value.name,
            display_name: value.display_name,
            permissions: PermissionSet::from_json(&value.permissions),
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "accountant")]
    pub name: String,
    #[schema(example = "Accountant")]
    pub display_name: String,
    /// Initial permission map; omitted means deny-everything.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub permissions: Option<PermissionSet>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub display_name: Option<String>,
    /// Replaces the whole map when present.
    #[schema(value_type = Object)]
    pub permissions: Option<PermissionSet>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role_id: Uuid,
}

/// Computed view of what a user can currently do.
#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermissions {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[schema(value_type = Object)]
    pub permissions: PermissionSet,
}
