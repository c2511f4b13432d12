use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt; // for `oneshot`

use ledgerkeep::create_app;

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

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn register(app: &Router, email: &str) -> Result<String> {
    let (status, auth_res) = send(
        app,
        json_request(
            "POST",
            "/auth/register",
            json!({
                "organization_name": "Acme Accounting",
                "name": "Jane Smith",
                "email": email,
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
async fn register_rejects_short_passwords() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/auth/register",
            json!({
                "organization_name": "Acme Accounting",
                "name": "Jane Smith",
                "email": "jane@acme.test",
                "password": "short"
            }),
        ),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST, "unexpected: {body}");
    Ok(())
}

#[tokio::test]
async fn register_rejects_duplicate_email() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    register(&app, "jane@acme.test").await?;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/register",
            json!({
                "organization_name": "Second Org",
                "name": "Jane Again",
                "email": "jane@acme.test",
                "password": "password123"
            }),
        ),
    )
    .await?;

    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn login_rejects_wrong_password() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    register(&app, "jane@acme.test").await?;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/login",
            json!({"email": "jane@acme.test", "password": "not-the-password"}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/auth/login",
            json!({"email": "nobody@acme.test", "password": "password123"}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    register(&app, "jane@acme.test").await?;

    // no token at all
    let req = Request::builder()
        .method("GET")
        .uri("/customers")
        .body(Body::empty())?;
    let (status, body) = send(&app, req).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.get("message").and_then(|v| v.as_str()), Some("Unauthorized"));

    // garbage token
    let req = Request::builder()
        .method("GET")
        .uri("/customers")
        .header("authorization", "Bearer not.a.jwt")
        .body(Body::empty())?;
    let (status, _) = send(&app, req).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn dashboard_redirects_unauthenticated_visitors() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let token = register(&app, "jane@acme.test").await?;

    // a page route answers denial with a redirect, not an error body
    let req = Request::builder()
        .method("GET")
        .uri("/dashboard")
        .body(Body::empty())?;
    let resp: Response = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        resp.headers()
            .get(axum::http::header::LOCATION)
            .and_then(|v| v.to_str().ok()),
        Some("/")
    );

    // the owner sees the summary
    let req = Request::builder()
        .method("GET")
        .uri("/dashboard")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())?;
    let (status, summary) = send(&app, req).await?;
    assert_eq!(status, StatusCode::OK, "dashboard failed: {summary}");
    assert_eq!(
        summary.pointer("/organization/name").and_then(|v| v.as_str()),
        Some("Acme Accounting")
    );
    assert_eq!(summary.get("customers").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(summary.get("invoices").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(summary.get("trashed").and_then(|v| v.as_i64()), Some(0));

    Ok(())
}
