#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use sklad_api::{
    auth::{Actor, AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::{
        material, operation,
        tech_process::{self, TechProcessMaterial, TechProcessOperation},
        user::{self, Role},
    },
    handlers::AppServices,
    services::{
        catalog_sync::CatalogSyncService, materials::CreateMaterialInput,
        operations::CreateOperationInput, tech_processes::CreateTechProcessInput,
        users::CreateUserInput,
    },
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "integration_suite_signing_key_7f3a9c2e5b8d1f4a";

/// Application state and router over a fresh, migrated SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin: user::Model,
    pub worker: user::Model,
    admin_token: String,
    worker_token: String,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller tweak the configuration
    /// (e.g. point the catalog at a mock server).
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let db_path = dir.path().join("sklad_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // one connection keeps SQLite writes serialized
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        adjust(&mut cfg);

        let mut db_cfg = db::DbConfig::from(&cfg);
        db_cfg.sqlx_logging = false;
        let pool = db::establish_connection_with_config(&db_cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let auth = Arc::new(AuthService::new(
            AuthConfig::new(
                cfg.jwt_secret.clone(),
                cfg.auth_audience.clone(),
                cfg.auth_issuer.clone(),
                Duration::from_secs(3600),
            ),
            db_arc.clone(),
        ));
        let catalog = CatalogSyncService::from_config(db_arc.clone(), &cfg.catalog)
            .expect("catalog service for tests");
        let services = AppServices::with_catalog(db_arc.clone(), catalog);

        let admin = services
            .users
            .register(user_input("admin", "Admin Adminov", Role::Admin, None))
            .await
            .expect("seed admin");
        let worker = services
            .users
            .register(user_input(
                "worker",
                "Ivan Petrov",
                Role::Worker,
                Some(dec!(200)),
            ))
            .await
            .expect("seed worker");

        let admin_token = auth.generate_token(admin.id, Role::Admin).unwrap();
        let worker_token = auth.generate_token(worker.id, Role::Worker).unwrap();

        let state = AppState {
            db: db_arc,
            config: cfg,
            services,
            auth,
        };
        let router = sklad_api::build_router(state.clone());

        Self {
            router,
            state,
            admin,
            worker,
            admin_token,
            worker_token,
            _dir: dir,
        }
    }

    pub fn admin_actor(&self) -> Actor {
        Actor::admin(self.admin.id)
    }

    pub fn worker_actor(&self) -> Actor {
        Actor::worker(self.worker.id)
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    pub fn worker_token(&self) -> &str {
        &self.worker_token
    }

    /// Registers another worker and returns it with a bearer token.
    pub async fn add_worker(&self, username: &str, hourly_rate: Option<Decimal>) -> (user::Model, String) {
        let created = self
            .state
            .services
            .users
            .register(user_input(username, username, Role::Worker, hourly_rate))
            .await
            .expect("seed extra worker");
        let token = self
            .state
            .auth
            .generate_token(created.id, Role::Worker)
            .unwrap();
        (created, token)
    }

    /// Operation "Cut" (rate 100), material "M1" (price 50) and tech process
    /// "TP1" consuming 2 units of M1 per piece.
    pub async fn seed_tp1(&self) -> Catalog {
        let services = &self.state.services;
        let cut = services
            .operations
            .create_operation(CreateOperationInput {
                name: "Cut".into(),
                description: None,
                default_rate: dec!(100),
            })
            .await
            .expect("seed operation");
        let m1 = services
            .materials
            .create_material(CreateMaterialInput {
                name: "M1".into(),
                code: "M1".into(),
                unit: Some("kg".into()),
                description: None,
                price: Some(dec!(50)),
                quantity: Some(dec!(100)),
                external_id: None,
            })
            .await
            .expect("seed material");
        let tp1 = services
            .tech_processes
            .create_tech_process(CreateTechProcessInput {
                name: "Bracket".into(),
                article_number: "TP1".into(),
                description: None,
                operations: vec![TechProcessOperation {
                    operation_id: cut.id,
                    sequence: 1,
                    description: None,
                }],
                materials: vec![TechProcessMaterial {
                    material_id: m1.id,
                    quantity_per_unit: dec!(2),
                    unit: "kg".into(),
                    is_optional: false,
                }],
                is_active: Some(true),
            })
            .await
            .expect("seed tech process");

        Catalog { cut, m1, tp1 }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn as_admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(self.admin_token())).await
    }

    pub async fn as_worker(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(self.worker_token())).await
    }
}

pub struct Catalog {
    pub cut: operation::Model,
    pub m1: material::Model,
    pub tp1: tech_process::Model,
}

pub fn user_input(
    username: &str,
    full_name: &str,
    role: Role,
    hourly_rate: Option<Decimal>,
) -> CreateUserInput {
    CreateUserInput {
        username: username.to_string(),
        password: "secret-password".to_string(),
        full_name: full_name.to_string(),
        role: Some(role),
        hourly_rate,
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Decimals travel as strings on the wire.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}
