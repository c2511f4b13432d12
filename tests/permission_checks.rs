use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt; // for `oneshot`

use ledgerkeep::authz::{check_any_permission, check_permission, require_any_permission, Permission};
use ledgerkeep::create_app;
use ledgerkeep::jwt::AuthUser;
use uuid::Uuid;

async fn setup() -> Result<(Router, SqlitePool, tempfile::TempDir)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;

    Ok((app, pool, dir))
}

async fn send(app: &Router, req: Request<Body>) -> Result<(StatusCode, serde_json::Value)> {
    let resp: Response = app.clone().oneshot(req).await?;
    let status = resp.status();
    let body_bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes)
            .with_context(|| format!("non-json body: {}", String::from_utf8_lossy(&body_bytes)))?
    };
    Ok((status, value))
}

fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn register_owner(app: &Router) -> Result<String> {
    let (status, auth_res) = send(
        app,
        json_request(
            "POST",
            "/auth/register",
            None,
            json!({
                "organization_name": "Acme Accounting",
                "name": "Jane Smith",
                "email": "jane@acme.test",
                "password": "password123"
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "register failed: {auth_res}");
    Ok(auth_res
        .get("token")
        .and_then(|v| v.as_str())
        .context("missing token")?
        .to_string())
}

#[tokio::test]
async fn grants_are_not_implied_and_edits_apply_immediately() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let owner_token = register_owner(&app).await?;

    // a role that may create invoices but not view them
    let (status, role_res) = send(
        &app,
        json_request(
            "POST",
            "/rbac/roles",
            Some(&owner_token),
            json!({
                "name": "clerk",
                "display_name": "Billing Clerk",
                "permissions": {"invoices_create": true}
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "role create failed: {role_res}");
    let role_id = role_res
        .get("id")
        .and_then(|v| v.as_str())
        .context("missing role id")?
        .to_string();

    let (status, invite_res) = send(
        &app,
        json_request(
            "POST",
            "/auth/invite",
            Some(&owner_token),
            json!({
                "name": "Sam Jones",
                "email": "sam@acme.test",
                "password": "password456",
                "role_id": role_id
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "invite failed: {invite_res}");
    let clerk_id = invite_res
        .get("id")
        .and_then(|v| v.as_str())
        .context("missing invited user id")?
        .to_string();

    let (status, login_res) = send(
        &app,
        json_request(
            "POST",
            "/auth/login",
            None,
            json!({"email": "sam@acme.test", "password": "password456"}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "clerk login failed: {login_res}");
    let clerk_token = login_res
        .get("token")
        .and_then(|v| v.as_str())
        .context("missing clerk token")?
        .to_string();

    // the clerk can exercise the granted permission
    let (status, customer_res) = send(
        &app,
        json_request(
            "POST",
            "/customers",
            Some(&owner_token),
            json!({"name": "Globex Ltd"}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let customer_id = customer_res
        .get("id")
        .and_then(|v| v.as_str())
        .context("missing customer id")?
        .to_string();

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/invoices",
            Some(&clerk_token),
            json!({
                "customer_id": customer_id,
                "invoice_number": "INV-2026-0002",
                "subtotal": 40.0
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    // create does not imply view
    let (status, denied) = send(&app, get_request("/invoices", &clerk_token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        denied.get("message").and_then(|v| v.as_str()),
        Some("Permission denied")
    );

    // nor anything in another module
    let (status, _) = send(&app, get_request("/customers", &clerk_token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // the boolean check API agrees with the guards and never errors
    let org_id: String = sqlx::query_scalar("SELECT organization_id FROM users WHERE id = ?")
        .bind(&clerk_id)
        .fetch_one(&pool)
        .await?;
    let clerk_auth = AuthUser {
        user_id: Uuid::parse_str(&clerk_id)?,
        organization_id: Uuid::parse_str(&org_id)?,
    };
    assert!(check_permission(&pool, &clerk_auth, Permission::InvoicesCreate).await);
    assert!(!check_permission(&pool, &clerk_auth, Permission::InvoicesView).await);
    assert!(
        check_any_permission(
            &pool,
            &clerk_auth,
            &[Permission::InvoicesView, Permission::InvoicesCreate]
        )
        .await
    );
    assert!(
        require_any_permission(&pool, &clerk_auth, &[Permission::InvoicesCreate])
            .await
            .is_ok()
    );

    // an unknown user resolves to no principal, so every check is false
    let ghost = AuthUser {
        user_id: Uuid::new_v4(),
        organization_id: clerk_auth.organization_id,
    };
    assert!(!check_permission(&pool, &ghost, Permission::InvoicesCreate).await);

    // effective permissions reflect the role as stored
    let (status, effective) = send(
        &app,
        get_request(
            &format!("/rbac/users/{}/effective-permissions", clerk_id),
            &owner_token,
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(effective.get("role").and_then(|v| v.as_str()), Some("clerk"));
    assert_eq!(
        effective.pointer("/permissions/invoices_create").and_then(|v| v.as_bool()),
        Some(true)
    );
    assert!(effective.pointer("/permissions/invoices_view").is_none());

    // widen the role; the next check sees the new map, no re-login needed
    let (status, _) = send(
        &app,
        json_request(
            "PUT",
            &format!("/rbac/roles/{}", role_id),
            Some(&owner_token),
            json!({"permissions": {"invoices_create": true, "invoices_view": true}}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, list) = send(&app, get_request("/invoices", &clerk_token)).await?;
    assert_eq!(status, StatusCode::OK, "clerk list after grant failed: {list}");
    assert!(list.as_array().unwrap().len() >= 1);

    Ok(())
}

#[tokio::test]
async fn owner_role_is_protected() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let owner_token = register_owner(&app).await?;

    let owner_role_id: String =
        sqlx::query_scalar("SELECT id FROM roles WHERE name = 'owner'")
            .fetch_one(&pool)
            .await?;

    // cannot delete the owner role
    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/rbac/roles/{}", owner_role_id))
        .header("authorization", format!("Bearer {}", owner_token))
        .body(Body::empty())?;
    let (status, _) = send(&app, req).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn roles_are_tenant_scoped() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let first_token = register_owner(&app).await?;

    let (status, auth_res) = send(
        &app,
        json_request(
            "POST",
            "/auth/register",
            None,
            json!({
                "organization_name": "Other Org",
                "name": "Pat Doe",
                "email": "pat@other.test",
                "password": "password789"
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let second_token = auth_res
        .get("token")
        .and_then(|v| v.as_str())
        .context("missing token")?
        .to_string();

    let (status, role_res) = send(
        &app,
        json_request(
            "POST",
            "/rbac/roles",
            Some(&first_token),
            json!({"name": "auditor", "display_name": "Auditor"}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let role_id = role_res
        .get("id")
        .and_then(|v| v.as_str())
        .context("missing role id")?
        .to_string();

    // the other tenant cannot see the role
    let (status, _) = send(
        &app,
        get_request(&format!("/rbac/roles/{}", role_id), &second_token),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
