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

fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
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

#[tokio::test]
async fn full_api_flow() -> Result<()> {
    let (app, pool, _dir) = setup().await?;

    // -- register bootstraps the tenant with an owner account
    let (status, auth_res) = send(
        &app,
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
    let token = auth_res
        .get("token")
        .and_then(|v| v.as_str())
        .context("missing token")?
        .to_string();
    let owner_id = auth_res
        .pointer("/user/id")
        .and_then(|v| v.as_str())
        .context("missing user id")?
        .to_string();

    // -- /auth/me
    let (status, me_res) = send(&app, get_request("/auth/me", &token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me_res.get("email").and_then(|v| v.as_str()), Some("jane@acme.test"));

    // -- create customer
    let (status, customer_res) = send(
        &app,
        json_request(
            "POST",
            "/customers",
            Some(&token),
            json!({
                "name": "Globex Ltd",
                "email": "billing@globex.test"
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "customer create failed: {customer_res}");
    let customer_id = customer_res
        .get("id")
        .and_then(|v| v.as_str())
        .context("missing customer id")?
        .to_string();

    // -- create invoice, totals computed server-side
    let (status, invoice_res) = send(
        &app,
        json_request(
            "POST",
            "/invoices",
            Some(&token),
            json!({
                "customer_id": customer_id,
                "invoice_number": "INV-2026-0001",
                "subtotal": 100.0,
                "tax_rate": 0.075
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "invoice create failed: {invoice_res}");
    assert_eq!(invoice_res.get("tax_amount").and_then(|v| v.as_f64()), Some(7.5));
    assert_eq!(invoice_res.get("total").and_then(|v| v.as_f64()), Some(107.5));
    assert_eq!(invoice_res.get("status").and_then(|v| v.as_str()), Some("draft"));

    // duplicate invoice number within the tenant is rejected
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/invoices",
            Some(&token),
            json!({
                "customer_id": customer_id,
                "invoice_number": "INV-2026-0001",
                "subtotal": 5.0
            }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // -- update customer sets the modification stamps
    let (status, updated) = send(
        &app,
        json_request(
            "PUT",
            &format!("/customers/{}", customer_id),
            Some(&token),
            json!({"phone": "+1-555-0100"}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "customer update failed: {updated}");
    assert_eq!(updated.get("phone").and_then(|v| v.as_str()), Some("+1-555-0100"));
    assert_eq!(updated.get("mod_flag").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(updated.get("modified_by").and_then(|v| v.as_str()), Some(owner_id.as_str()));

    // -- soft delete with a reason
    let (status, deleted) = send(
        &app,
        json_request(
            "DELETE",
            &format!("/customers/{}", customer_id),
            Some(&token),
            json!({"reason": "duplicate"}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "customer delete failed: {deleted}");
    assert_eq!(deleted.get("del_flag").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(deleted.get("deleted_by").and_then(|v| v.as_str()), Some(owner_id.as_str()));
    assert_eq!(
        deleted.get("deletion_reason").and_then(|v| v.as_str()),
        Some("duplicate")
    );
    assert!(deleted.get("deleted_at").and_then(|v| v.as_str()).is_some());

    // the row is still in the table, only flagged
    let del_flag: bool =
        sqlx::query_scalar("SELECT del_flag FROM customers WHERE id = ?")
            .bind(&customer_id)
            .fetch_one(&pool)
            .await?;
    assert!(del_flag);

    // -- default list excludes the deleted record
    let (status, list) = send(&app, get_request("/customers", &token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(!list
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c.get("id").and_then(|v| v.as_str()) == Some(customer_id.as_str())));

    // -- and the trash list includes it
    let (status, trash) = send(&app, get_request("/trash/customers", &token)).await?;
    assert_eq!(status, StatusCode::OK, "trash list failed: {trash}");
    assert!(trash.get("total").and_then(|v| v.as_i64()).unwrap_or(0) >= 1);
    assert!(trash
        .get("items")
        .and_then(|v| v.as_array())
        .unwrap()
        .iter()
        .any(|c| c.get("id").and_then(|v| v.as_str()) == Some(customer_id.as_str())));

    Ok(())
}

#[tokio::test]
async fn health_endpoint_reports_db() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;

    let req = Request::builder()
        .method("GET")
        .uri("/api/health")
        .body(Body::empty())?;
    let (status, body) = send(&app, req).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert_eq!(body.get("db_ok").and_then(|v| v.as_bool()), Some(true));

    Ok(())
}
