use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, customers, dashboard, health, invoices, rbac, trash};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/invite", post(auth::invite));

    let customer_routes = Router::new()
        .route("/", get(customers::list_customers))
        .route("/", post(customers::create_customer))
        .route("/:id", get(customers::get_customer))
        .route("/:id", put(customers::update_customer))
        .route("/:id", delete(customers::delete_customer));

    let invoice_routes = Router::new()
        .route("/", get(invoices::list_invoices))
        .route("/", post(invoices::create_invoice))
        .route("/:id", get(invoices::get_invoice))
        .route("/:id", put(invoices::update_invoice))
        .route("/:id", delete(invoices::delete_invoice));

    let rbac_routes = Router::new()
        .route("/roles", get(rbac::list_roles).post(rbac::create_role))
        .route(
            "/roles/:role_id",
            get(rbac::get_role).put(rbac::update_role).delete(rbac::delete_role),
        )
        .route("/users/:user_id/role", put(rbac::assign_role))
        .route(
            "/users/:user_id/effective-permissions",
            get(rbac::effective_permissions),
        );

    let trash_routes = Router::new()
        .route("/:entity", get(trash::list_trash))
        .route("/:entity/:id/restore", post(trash::restore_item))
        .route("/:entity/:id", delete(trash::purge_item));

    let router = Router::new()
        .nest("/auth", auth_routes)
        .nest("/customers", customer_routes)
        .nest("/invoices", invoice_routes)
        .nest("/rbac", rbac_routes)
        .nest("/trash", trash_routes)
        .route("/dashboard", get(dashboard::dashboard))
        .route("/api/health", get(health::health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
