use sqlx::SqlitePool;

use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;

use super::permission::Permission;
use super::principal::Principal;

/// Boolean permission check. Never errors: an unresolved principal or a
/// failed lookup yields `false`.
pub async fn check_permission(pool: &SqlitePool, auth: &AuthUser, perm: Permission) -> bool {
    match Principal::resolve(pool, auth).await {
        Some(principal) => principal.has_permission(perm),
        None => false,
    }
}

/// True if any of the listed permissions is granted.
pub async fn check_any_permission(pool: &SqlitePool, auth: &AuthUser, perms: &[Permission]) -> bool {
    match Principal::resolve(pool, auth).await {
        Some(principal) => principal.has_any_permission(perms),
        None => false,
    }
}

/// Action guard: resolve the principal and demand a single permission.
///
/// Handlers call this first and only reach their data access on `Ok`. The
/// two failure shapes are the ones surfaced to the UI verbatim.
pub async fn require_permission(
    pool: &SqlitePool,
    auth: &AuthUser,
    perm: Permission,
) -> AppResult<Principal> {
    let principal = Principal::resolve(pool, auth)
        .await
        .ok_or_else(|| AppError::unauthorized("Unauthorized"))?;

    if !principal.has_permission(perm) {
        tracing::debug!(user_id = %auth.user_id, permission = %perm, "permission denied");
        return Err(AppError::forbidden("Permission denied"));
    }

    Ok(principal)
}

/// Action guard accepting any one of the listed permissions.
pub async fn require_any_permission(
    pool: &SqlitePool,
    auth: &AuthUser,
    perms: &[Permission],
) -> AppResult<Principal> {
    let principal = Principal::resolve(pool, auth)
        .await
        .ok_or_else(|| AppError::unauthorized("Unauthorized"))?;

    if !principal.has_any_permission(perms) {
        tracing::debug!(user_id = %auth.user_id, permissions = ?perms, "permission denied");
        return Err(AppError::forbidden("Permission denied"));
    }

    Ok(principal)
}
