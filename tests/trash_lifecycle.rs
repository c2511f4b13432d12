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

fn request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn register_and_create_customer(app: &Router) -> Result<(String, String)> {
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
    let token = auth_res
        .get("token")
        .and_then(|v| v.as_str())
        .context("missing token")?
        .to_string();

    let (status, customer_res) = send(
        app,
        json_request("POST", "/customers", Some(&token), json!({"name": "Globex Ltd"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "customer create failed: {customer_res}");
    let customer_id = customer_res
        .get("id")
        .and_then(|v| v.as_str())
        .context("missing customer id")?
        .to_string();

    Ok((token, customer_id))
}

#[tokio::test]
async fn restore_brings_a_record_back_and_is_idempotent() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let (token, customer_id) = register_and_create_customer(&app).await?;

    let (status, _) = send(
        &app,
        json_request(
            "DELETE",
            &format!("/customers/{}", customer_id),
            Some(&token),
            json!({"reason": "mistake"}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // gone from the default list, visible in trash
    let (_, list) = send(&app, request("GET", "/customers", &token)).await?;
    assert!(list.as_array().unwrap().is_empty());

    let (_, trash) = send(&app, request("GET", "/trash/customers", &token)).await?;
    assert_eq!(trash.get("total").and_then(|v| v.as_i64()), Some(1));

    // restore clears the stamps
    let (status, restored) = send(
        &app,
        request(
            "POST",
            &format!("/trash/customers/{}/restore", customer_id),
            &token,
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "restore failed: {restored}");
    assert_eq!(restored.get("del_flag").and_then(|v| v.as_bool()), Some(false));
    assert!(restored.get("deleted_at").and_then(|v| v.as_str()).is_none());
    assert!(restored.get("deletion_reason").is_none());

    // restoring an already-active record converges, it does not error
    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/trash/customers/{}/restore", customer_id),
            &token,
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // back in the default list, out of the trash
    let (_, list) = send(&app, request("GET", "/customers", &token)).await?;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (_, trash) = send(&app, request("GET", "/trash/customers", &token)).await?;
    assert_eq!(trash.get("total").and_then(|v| v.as_i64()), Some(0));

    Ok(())
}

#[tokio::test]
async fn purge_removes_the_row_for_good() -> Result<()> {
    let (app, pool, _dir) = setup().await?;
    let (token, customer_id) = register_and_create_customer(&app).await?;

    let (status, _) = send(
        &app,
        json_request(
            "DELETE",
            &format!("/customers/{}", customer_id),
            Some(&token),
            json!({}),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/trash/customers/{}", customer_id), &token),
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // no row left behind
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers WHERE id = ?")
        .bind(&customer_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(remaining, 0);

    // neither restore nor a second purge can find it
    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/trash/customers/{}/restore", customer_id),
            &token,
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/trash/customers/{}", customer_id), &token),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn trash_rejects_unknown_entities() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let (token, _customer_id) = register_and_create_customer(&app).await?;

    let (status, body) = send(&app, request("GET", "/trash/ledgers", &token)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "unexpected: {body}");

    Ok(())
}

#[tokio::test]
async fn trash_lists_newest_deletion_first() -> Result<()> {
    let (app, _pool, _dir) = setup().await?;
    let (token, first_id) = register_and_create_customer(&app).await?;

    let (status, second) = send(
        &app,
        json_request("POST", "/customers", Some(&token), json!({"name": "Initech"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let second_id = second
        .get("id")
        .and_then(|v| v.as_str())
        .context("missing id")?
        .to_string();

    for id in [&first_id, &second_id] {
        let (status, _) = send(
            &app,
            json_request("DELETE", &format!("/customers/{}", id), Some(&token), json!({})),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        // deleted_at has millisecond precision; keep the two deletions apart
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let (status, trash) = send(&app, request("GET", "/trash/customers", &token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trash.get("total").and_then(|v| v.as_i64()), Some(2));

    let items = trash.get("items").and_then(|v| v.as_array()).unwrap();
    assert_eq!(
        items[0].get("id").and_then(|v| v.as_str()),
        Some(second_id.as_str())
    );
    assert_eq!(
        items[1].get("id").and_then(|v| v.as_str()),
        Some(first_id.as_str())
    );

    // pagination caps the page
    let (status, page) = send(
        &app,
        request("GET", "/trash/customers?limit=1&skip=0", &token),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page.get("items").and_then(|v| v.as_array()).unwrap().len(), 1);
    assert_eq!(page.get("total").and_then(|v| v.as_i64()), Some(2));

    Ok(())
}
