use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::jwt::AuthUser;

use super::permission::{Permission, PermissionSet};

/// A fully resolved principal: the authenticated user plus the permission map
/// of their role, loaded fresh from storage.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role_id: Option<Uuid>,
    pub role_name: Option<String>,
    pub permissions: PermissionSet,
}

impl Principal {
    /// Resolve the principal for the current request.
    ///
    /// Returns `None` (fail closed) when the user does not exist in the
    /// token's organization, is inactive or soft-deleted, or when the lookup
    /// itself fails. A user without a role resolves with an empty permission
    /// map, which denies everything.
    pub async fn resolve(pool: &SqlitePool, auth: &AuthUser) -> Option<Principal> {
        let row = sqlx::query(
            r#"
            SELECT u.role_id, r.name AS role_name, r.permissions
            FROM users u
            LEFT JOIN roles r ON r.id = u.role_id AND r.organization_id = u.organization_id
            WHERE u.id = ? AND u.organization_id = ? AND u.status = 'active' AND u.del_flag = 0
            "#,
        )
        .bind(auth.user_id.to_string())
        .bind(auth.organization_id.to_string())
        .fetch_optional(pool)
        .await;

        let row = match row {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(user_id = %auth.user_id, error = %err, "principal lookup failed");
                return None;
            }
        };

        let role_id: Option<String> = row.get("role_id");
        let role_name: Option<String> = row.get("role_name");
        let permissions_raw: Option<String> = row.get("permissions");

        Some(Principal {
            user_id: auth.user_id,
            organization_id: auth.organization_id,
            role_id: role_id.and_then(|id| Uuid::parse_str(&id).ok()),
            role_name,
            permissions: permissions_raw
                .map(|raw| PermissionSet::from_json(&raw))
                .unwrap_or_default(),
        })
    }

    pub fn has_permission(&self, perm: Permission) -> bool {
        self.permissions.allows(perm)
    }

    pub fn has_any_permission(&self, perms: &[Permission]) -> bool {
        self.permissions.allows_any(perms)
    }
}
