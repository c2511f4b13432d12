use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

use super::{parse_uuid, parse_uuid_opt};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub organization_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    /// `active` or `inactive`; inactive users fail principal resolution.
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for User {
    fn entity_type() -> &'static str {
        "user"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: String,
    pub organization_id: String,
    pub role_id: Option<String>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub del_flag: bool,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(value: DbUser) -> Result<Self, Self::Error> {
        Ok(User {
            id: parse_uuid(&value.id, "users.id")?,
            organization_id: parse_uuid(&value.organization_id, "users.organization_id")?,
            role_id: parse_uuid_opt(value.role_id.as_deref(), "users.role_id")?,
            name: value.name,
            email: value.email,
            status: value.status,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Registration bootstraps a tenant: the organization, its `owner` role with
/// every permission, and the first user holding that role.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Acme Accounting")]
    pub organization_name: String,
    #[schema(example = "Jane Smith")]
    pub name: String,
    #[schema(example = "jane@acme.test")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Invite a colleague into the caller's organization with an existing role.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InviteUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role_id: Option<Uuid>,
}
