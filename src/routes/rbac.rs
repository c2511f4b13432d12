//! RBAC admin endpoints: roles and their permission maps, plus role
//! assignment. All changes are logged with Critical severity; a permission
//! edit takes effect on the very next check because checks are uncached.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, require_permission, Permission, PermissionSet};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::role::{
    AssignRoleRequest, DbRole, EffectivePermissions, Role, RoleCreateRequest, RoleUpdateRequest,
};
use crate::utils::utc_now;

const ROLE_COLUMNS: &str =
    "id, organization_id, name, display_name, permissions, created_at, updated_at";

#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    responses((status = 200, description = "List of roles", body = Vec<Role>)),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Role>>> {
    let principal = require_permission(&state.pool, &auth, Permission::RolesView).await?;

    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE organization_id = ? ORDER BY name");
    let roles = sqlx::query_as::<_, DbRole>(&sql)
        .bind(principal.organization_id.to_string())
        .fetch_all(&state.pool)
        .await?;

    let roles: Vec<Role> = roles.into_iter().map(Role::try_from).collect::<Result<_, _>>()?;

    Ok(Json(roles))
}

#[utoipa::path(
    post,
    path = "/rbac/roles",
    tag = "RBAC",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 409, description = "Role name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(req): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    let principal = require_permission(&state.pool, &auth, Permission::RolesManage).await?;
    let org = principal.organization_id;

    let duplicate: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM roles WHERE organization_id = ? AND name = ?")
            .bind(org.to_string())
            .bind(&req.name)
            .fetch_one(&state.pool)
            .await?;
    if duplicate > 0 {
        return Err(AppError::conflict("role name already exists"));
    }

    let id = Uuid::new_v4();
    let now = utc_now();
    let permissions = req.permissions.unwrap_or_default();

    sqlx::query(
        "INSERT INTO roles (id, organization_id, name, display_name, permissions, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(org.to_string())
    .bind(&req.name)
    .bind(&req.display_name)
    .bind(permissions.to_json())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let role = Role {
        id,
        organization_id: org,
        name: req.name,
        display_name: req.display_name,
        permissions,
        created_at: now,
        updated_at: now,
    };

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role details", body = Role),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(role_id): Path<Uuid>,
) -> AppResult<Json<Role>> {
    let principal = require_permission(&state.pool, &auth, Permission::RolesView).await?;
    let role: Role = fetch_role(&state.pool, principal.organization_id, role_id)
        .await?
        .try_into()?;
    Ok(Json(role))
}

#[utoipa::path(
    put,
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
    Json(req): Json<RoleUpdateRequest>,
) -> AppResult<Json<Role>> {
    let principal = require_permission(&state.pool, &auth, Permission::RolesManage).await?;

    let before: Role = fetch_role(&state.pool, principal.organization_id, role_id)
        .await?
        .try_into()?;

    let mut after = before.clone();
    if let Some(display_name) = req.display_name.as_ref() {
        after.display_name = display_name.clone();
    }
    if let Some(permissions) = req.permissions {
        after.permissions = permissions;
    }

    let now = utc_now();

    sqlx::query(
        "UPDATE roles SET display_name = ?, permissions = ?, updated_at = ? WHERE id = ? AND organization_id = ?",
    )
    .bind(&after.display_name)
    .bind(after.permissions.to_json())
    .bind(now)
    .bind(role_id.to_string())
    .bind(principal.organization_id.to_string())
    .execute(&state.pool)
    .await?;

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
    path = "/rbac/roles/{role_id}",
    tag = "RBAC",
    params(("role_id" = Uuid, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role still assigned to users")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let principal = require_permission(&state.pool, &auth, Permission::RolesManage).await?;
    let org = principal.organization_id;

    let role: Role = fetch_role(&state.pool, org, role_id).await?.try_into()?;

    if role.name == authz::roles::OWNER {
        return Err(AppError::conflict("the owner role cannot be deleted"));
    }

    let assigned: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role_id = ? AND organization_id = ?")
            .bind(role_id.to_string())
            .bind(org.to_string())
            .fetch_one(&state.pool)
            .await?;
    if assigned > 0 {
        return Err(AppError::conflict("role is still assigned to users"));
    }

    sqlx::query("DELETE FROM roles WHERE id = ? AND organization_id = ?")
        .bind(role_id.to_string())
        .bind(org.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/rbac/users/{user_id}/role",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "User id")),
    request_body = AssignRoleRequest,
    responses(
        (status = 204, description = "Role assigned"),
        (status = 404, description = "User or role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AssignRoleRequest>,
) -> AppResult<StatusCode> {
    let principal = require_permission(&state.pool, &auth, Permission::UsersManage).await?;
    let org = principal.organization_id;

    let role: Role = fetch_role(&state.pool, org, req.role_id).await?.try_into()?;

    let updated = sqlx::query(
        "UPDATE users SET role_id = ?, updated_at = ? WHERE id = ? AND organization_id = ? AND del_flag = 0",
    )
    .bind(req.role_id.to_string())
    .bind(utc_now())
    .bind(user_id.to_string())
    .bind(org.to_string())
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::not_found("User not found"));
    }

    log_activity_with_context(
        &state.event_bus,
        "role_assigned",
        Some(auth.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/effective-permissions",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Effective permissions", body = EffectivePermissions),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn effective_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<EffectivePermissions>> {
    let principal = require_permission(&state.pool, &auth, Permission::RolesView).await?;

    let user_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE id = ? AND organization_id = ? AND del_flag = 0",
    )
    .bind(user_id.to_string())
    .bind(principal.organization_id.to_string())
    .fetch_one(&state.pool)
    .await?;
    if user_exists == 0 {
        return Err(AppError::not_found("User not found"));
    }

    let row = sqlx::query_as::<_, DbRole>(
        "SELECT r.id, r.organization_id, r.name, r.display_name, r.permissions, r.created_at, r.updated_at \
         FROM roles r INNER JOIN users u ON u.role_id = r.id \
         WHERE u.id = ? AND u.organization_id = ? AND u.del_flag = 0",
    )
    .bind(user_id.to_string())
    .bind(principal.organization_id.to_string())
    .fetch_optional(&state.pool)
    .await?;

    let (role, permissions) = match row {
        Some(db_role) => {
            let role: Role = db_role.try_into()?;
            (Some(role.name), role.permissions)
        }
        // A user without a role has no permissions at all.
        None => (None, PermissionSet::new()),
    };

    Ok(Json(EffectivePermissions {
        user_id,
        role,
        permissions,
    }))
}

async fn fetch_role(pool: &SqlitePool, organization_id: Uuid, role_id: Uuid) -> AppResult<DbRole> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ? AND organization_id = ?");
    sqlx::query_as::<_, DbRole>(&sql)
        .bind(role_id.to_string())
        .bind(organization_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Role not found"))
}
