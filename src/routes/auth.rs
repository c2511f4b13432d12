use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, require_permission, Permission, PermissionSet};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::user::{
    AuthResponse, DbUser, InviteUserRequest, LoginRequest, RegisterRequest, User,
};
use crate::utils::{hash_password, utc_now, verify_password};

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Organization and owner registered", body = AuthResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    ensure_email_available(&state.pool, &payload.email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let organization_id = Uuid::new_v4();
    let role_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    sqlx::query("INSERT INTO organizations (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(organization_id.to_string())
        .bind(&payload.organization_name)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    // The first user owns the tenant; the owner role grants every permission.
    sqlx::query(
        "INSERT INTO roles (id, organization_id, name, display_name, permissions, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(role_id.to_string())
    .bind(organization_id.to_string())
    .bind(authz::roles::OWNER)
    .bind("Owner")
    .bind(PermissionSet::all().to_json())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO users (id, organization_id, role_id, name, email, password_hash, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, 'active', ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(organization_id.to_string())
    .bind(role_id.to_string())
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let db_user = fetch_user_by_id(&state.pool, user_id).await?;
    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id, user.organization_id)?;

    log_activity_with_context(
        &state.event_bus,
        "registered",
        Some(user.id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = sqlx::query_as::<_, DbUser>(
        "SELECT id, organization_id, role_id, name, email, password_hash, status, created_at, updated_at, del_flag FROM users WHERE email = ? AND del_flag = 0",
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid credentials"));
    }
    if db_user.status != "active" {
        return Err(AppError::unauthorized("account is inactive"));
    }

    let user: User = db_user.try_into()?;
    let token = state.jwt.encode(user.id, user.organization_id)?;

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let db_user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    let user: User = db_user.try_into()?;
    Ok(Json(user))
}

/// Add a user to the caller's organization. The new user's tenant is fixed to
/// the caller's; there is no way to create a cross-tenant account.
#[utoipa::path(
    post,
    path = "/auth/invite",
    tag = "Auth",
    request_body = InviteUserRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 403, description = "Permission denied"),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn invite(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<InviteUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let principal = require_permission(&state.pool, &auth, Permission::UsersManage).await?;

    ensure_email_available(&state.pool, &payload.email).await?;

    if let Some(role_id) = payload.role_id {
        let exists: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM roles WHERE id = ? AND organization_id = ?")
                .bind(role_id.to_string())
                .bind(principal.organization_id.to_string())
                .fetch_one(&state.pool)
                .await?;
        if exists == 0 {
            return Err(AppError::not_found("Role not found"));
        }
    }

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO users (id, organization_id, role_id, name, email, password_hash, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, 'active', ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(principal.organization_id.to_string())
    .bind(payload.role_id.map(|id| id.to_string()))
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let user: User = fetch_user_by_id(&state.pool, user_id).await?.try_into()?;

    log_activity_with_context(
        &state.event_bus,
        "registered",
        Some(auth.user_id),
        &user,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(user)))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if existing > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

async fn fetch_user_by_id(pool: &SqlitePool, user_id: Uuid) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(
        "SELECT id, organization_id, role_id, name, email, password_hash, status, created_at, updated_at, del_flag FROM users WHERE id = ? AND del_flag = 0",
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("User not found"))
}
