//! Sklad API Library
//!
//! Production-floor accounting for a small manufacturer: manufacturing orders
//! built from tech processes, piecework and hourly pay, salary and order
//! reports, and a sync with the external inventory catalog.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod lifecycle;
pub mod middleware_helpers;
pub mod migrator;
pub mod services;
pub mod tracing;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::auth::{AuthRouterExt, AuthService};
use crate::entities::user::Role;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

/// All `/api/v1` routes. Admin-only catalog writes are gated by role at the
/// router; everything else checks ownership inside the services.
pub fn api_v1_routes(auth: Arc<AuthService>) -> Router<AppState> {
    let public = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/status", get(handlers::health::api_status));

    // Services decide per call what the actor may do
    let authenticated = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/register", post(handlers::auth::register))
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/users/:id",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route(
            "/users/:id/change-password",
            put(handlers::users::change_password),
        )
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route(
            "/orders/:id",
            get(handlers::orders::get_order)
                .put(handlers::orders::update_order)
                .delete(handlers::orders::delete_order),
        )
        .route("/orders/:id/branch", post(handlers::orders::branch_order))
        .route(
            "/orders/:id/operations/:operation_id",
            patch(handlers::orders::update_operation),
        )
        .route(
            "/orders/:id/operations/:operation_id/assign",
            patch(handlers::orders::assign_operation),
        )
        .route(
            "/work-times",
            get(handlers::work_times::list_entries).post(handlers::work_times::create_entry),
        )
        .route(
            "/work-times/:id",
            get(handlers::work_times::get_entry)
                .put(handlers::work_times::update_entry)
                .delete(handlers::work_times::delete_entry),
        )
        .route(
            "/work-times/:id/approve",
            patch(handlers::work_times::approve_entry),
        )
        .route(
            "/work-times/:id/unapprove",
            patch(handlers::work_times::unapprove_entry),
        )
        .route("/reports/salary", get(handlers::reports::salary_report))
        .route("/reports/orders", get(handlers::reports::order_report))
        .route("/operations", get(handlers::operations::list_operations))
        .route("/operations/:id", get(handlers::operations::get_operation))
        .route("/materials", get(handlers::materials::list_materials))
        .route("/materials/:id", get(handlers::materials::get_material))
        .route(
            "/tech-processes",
            get(handlers::tech_processes::list_tech_processes),
        )
        .route(
            "/tech-processes/:id",
            get(handlers::tech_processes::get_tech_process),
        )
        .route(
            "/tech-processes/article/:article_number",
            get(handlers::tech_processes::get_by_article_number),
        )
        .route("/catalog/products", get(handlers::catalog::list_products))
        .with_auth(auth.clone());

    let admin = Router::new()
        .route("/operations", post(handlers::operations::create_operation))
        .route(
            "/operations/:id",
            put(handlers::operations::update_operation)
                .delete(handlers::operations::delete_operation),
        )
        .route(
            "/operations/:id/rates",
            get(handlers::operations::list_user_rates),
        )
        .route(
            "/operations/rates",
            post(handlers::operations::upsert_user_rate),
        )
        .route(
            "/operations/rates/:id",
            axum::routing::delete(handlers::operations::delete_user_rate),
        )
        .route("/materials", post(handlers::materials::create_material))
        .route(
            "/materials/:id",
            put(handlers::materials::update_material)
                .delete(handlers::materials::delete_material),
        )
        .route("/materials/:id/stock", patch(handlers::materials::set_stock))
        .route(
            "/tech-processes",
            post(handlers::tech_processes::create_tech_process),
        )
        .route(
            "/tech-processes/:id",
            put(handlers::tech_processes::update_tech_process)
                .delete(handlers::tech_processes::delete_tech_process),
        )
        .route(
            "/catalog/check-connection",
            get(handlers::catalog::check_connection),
        )
        .route(
            "/catalog/import/products",
            post(handlers::catalog::import_products),
        )
        .route("/catalog/sync/stock", post(handlers::catalog::sync_stock))
        .with_role(Role::Admin, auth);

    public.merge(authenticated).merge(admin)
}

/// Application router without the deployment-specific layers (CORS, timeout).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", api_v1_routes(state.auth.clone()))
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
