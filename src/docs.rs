use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::lifecycle;
use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::invite,
        routes::customers::list_customers,
        routes::customers::create_customer,
        routes::customers::get_customer,
        routes::customers::update_customer,
        routes::customers::delete_customer,
        routes::invoices::list_invoices,
        routes::invoices::create_invoice,
        routes::invoices::get_invoice,
        routes::invoices::update_invoice,
        routes::invoices::delete_invoice,
        routes::rbac::list_roles,
        routes::rbac::create_role,
        routes::rbac::get_role,
        routes::rbac::update_role,
        routes::rbac::delete_role,
        routes::rbac::assign_role,
        routes::rbac::effective_permissions,
        routes::trash::list_trash,
        routes::trash::restore_item,
        routes::trash::purge_item,
        routes::dashboard::dashboard,
        routes::health::health
    ),
    components(
        schemas(
            models::organization::Organization,
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::user::InviteUserRequest,
            models::role::Role,
            models::role::RoleCreateRequest,
            models::role::RoleUpdateRequest,
            models::role::AssignRoleRequest,
            models::role::EffectivePermissions,
            models::customer::Customer,
            models::customer::CustomerCreateRequest,
            models::customer::CustomerUpdateRequest,
            models::customer::DeleteRequest,
            models::invoice::Invoice,
            models::invoice::InvoiceCreateRequest,
            models::invoice::InvoiceUpdateRequest,
            lifecycle::DeletionMetadata,
            routes::trash::TrashListResponse,
            routes::dashboard::DashboardSummary,
            routes::health::HealthResponse
        )
    ),
    tags(
        (name = "Auth", description = "Authentication and user onboarding"),
        (name = "Customers", description = "Customer records"),
        (name = "Invoices", description = "Invoice records"),
        (name = "RBAC", description = "Roles and permission maps"),
        (name = "Trash", description = "Soft-deleted records: list, restore, purge"),
        (name = "Dashboard", description = "Tenant overview page"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
    let mut doc = serde_json::to_value(ApiDoc::openapi())?;

    normalize_path_operations(&mut doc);
    ensure_security_components(&mut doc);
    ensure_openapi_version(&mut doc);
    add_examples(&mut doc);
    ensure_servers(&mut doc, port);

    Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .with_credentials(true)
        .persist_authorization(true);

    // Serve the already-sanitized JSON directly so the UI never re-serializes
    // generator-internal structures.
    let doc_json = Arc::new(serde_json::to_value(&doc)?);

    let json_route = {
        let doc_json = Arc::clone(&doc_json);
        get(move || {
            let doc_json = Arc::clone(&doc_json);
            async move { Json((*doc_json).clone()) }
        })
    };

    Ok(Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config)))
}

/// Lowercase and dedupe method keys per path. Duplicate mapping keys break
/// Swagger's parser.
fn normalize_path_operations(doc: &mut Value) {
    if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
        let snapshot = paths.clone();
        for (path, item) in snapshot {
            if let Some(ops) = item.as_object() {
                let mut normalized = Map::new();
                for (method, val) in ops {
                    let key = method.to_lowercase();
                    if let Some(existing) = normalized.get_mut(&key) {
                        merge_values(existing, val);
                    } else {
                        normalized.insert(key, val.clone());
                    }
                }
                paths.insert(path, Value::Object(normalized));
            }
        }
    }
}

fn ensure_security_components(doc: &mut Value) {
    let Some(root) = doc.as_object_mut() else { return };

    let components = root
        .entry("components")
        .or_insert_with(|| Value::Object(Map::new()));

    if let Some(schemes) = components
        .as_object_mut()
        .map(|c| c.entry("securitySchemes").or_insert_with(|| Value::Object(Map::new())))
        .and_then(Value::as_object_mut)
    {
        schemes.insert(
            "bearerAuth".to_string(),
            json!({
                "type": "http",
                "scheme": "bearer",
                "bearerFormat": "JWT"
            }),
        );
    }
}

fn ensure_openapi_version(doc: &mut Value) {
    if let Some(root) = doc.as_object_mut() {
        root.entry("openapi")
            .or_insert_with(|| Value::String("3.1.0".to_string()));
    }
}

/// Seed request-body examples so Swagger UI's Try-it-out shows usable
/// payloads.
fn add_examples(doc: &mut Value) {
    if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
        for item in paths.values_mut() {
            if let Some(operations) = item.as_object_mut() {
                for operation in operations.values_mut() {
                    apply_parameter_examples(operation);
                    apply_request_examples(operation);
                }
            }
        }
    }
}

fn apply_parameter_examples(operation: &mut Value) {
    if let Some(parameters) = operation.get_mut("parameters").and_then(Value::as_array_mut) {
        for parameter in parameters.iter_mut() {
            if let Some(name) = parameter.get("name").and_then(Value::as_str) {
                if name == "id" || name.ends_with("_id") {
                    if let Some(obj) = parameter.as_object_mut() {
                        obj.entry("example")
                            .or_insert_with(|| json!("00000000-0000-0000-0000-000000000000"));
                    }
                }
            }
        }
    }
}

fn apply_request_examples(operation: &mut Value) {
    let Some(request_body) = operation.get_mut("requestBody") else { return };
    let Some(content) = request_body.get_mut("content").and_then(Value::as_object_mut) else {
        return;
    };
    let Some(app_json) = content.get_mut("application/json").and_then(Value::as_object_mut) else {
        return;
    };
    let Some(schema) = app_json.get("schema").and_then(Value::as_object) else { return };
    let Some(reference) = schema.get("$ref").and_then(Value::as_str) else { return };

    let example = match reference {
        "#/components/schemas/RegisterRequest" => Some(json!({
            "organization_name": "Acme Accounting",
            "name": "Jane Smith",
            "email": "jane@acme.test",
            "password": "S3cureP@ssw0rd"
        })),
        "#/components/schemas/LoginRequest" => Some(json!({
            "email": "jane@acme.test",
            "password": "S3cureP@ssw0rd"
        })),
        "#/components/schemas/InviteUserRequest" => Some(json!({
            "name": "Sam Jones",
            "email": "sam@acme.test",
            "password": "S3cureP@ssw0rd",
            "role_id": "00000000-0000-0000-0000-000000000000"
        })),
        "#/components/schemas/CustomerCreateRequest" => Some(json!({
            "name": "Globex Ltd",
            "email": "billing@globex.test",
            "phone": "+1-555-0100"
        })),
        "#/components/schemas/InvoiceCreateRequest" => Some(json!({
            "customer_id": "00000000-0000-0000-0000-000000000000",
            "invoice_number": "INV-2026-0001",
            "currency": "USD",
            "subtotal": 100.0,
            "tax_rate": 0.075
        })),
        "#/components/schemas/RoleCreateRequest" => Some(json!({
            "name": "accountant",
            "display_name": "Accountant",
            "permissions": {
                "customers_view": true,
                "invoices_view": true,
                "invoices_create": true
            }
        })),
        "#/components/schemas/DeleteRequest" => Some(json!({
            "reason": "duplicate"
        })),
        _ => None,
    };

    if let Some(example) = example {
        app_json.insert("example".to_string(), example);
    }
}

/// Point Try-it-out at the running backend.
fn ensure_servers(doc: &mut Value, port: u16) {
    let server_url = format!("http://localhost:{port}");

    match doc.get_mut("servers") {
        Some(Value::Array(arr)) => {
            let has = arr
                .iter()
                .any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
            if !has {
                arr.push(json!({ "url": server_url }));
            }
        }
        _ => {
            doc["servers"] = json!([{ "url": server_url }]);
        }
    }
}

fn merge_values(target: &mut Value, addition: &Value) {
    match (target, addition) {
        (Value::Object(dest), Value::Object(src)) => {
            for (key, value) in src {
                if let Some(existing) = dest.get_mut(key) {
                    merge_values(existing, value);
                } else {
                    dest.insert(key.clone(), value.clone());
                }
            }
        }
        (Value::Array(dest), Value::Array(src)) => {
            for item in src {
                if !dest.contains(item) {
                    dest.push(item.clone());
                }
            }
        }
        _ => {}
    }
}
