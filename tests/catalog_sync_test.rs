mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{body_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use sklad_api::{entities::material, errors::ServiceError};
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

// base64("user:pass")
const BASIC_AUTH: &str = "Basic dXNlcjpwYXNz";

async fn app_against(server: &MockServer) -> TestApp {
    let uri = server.uri();
    TestApp::with_config(move |cfg| {
        cfg.catalog.api_url = uri;
        cfg.catalog.login = "user".into();
        cfg.catalog.password = "pass".into();
        cfg.catalog.import_page_size = 50;
    })
    .await
}

async fn material_by_external_id(app: &TestApp, external_id: &str) -> Option<material::Model> {
    material::Entity::find()
        .filter(material::Column::ExternalId.eq(external_id))
        .one(&*app.state.db)
        .await
        .unwrap()
}

fn products_page() -> serde_json::Value {
    json!({
        "rows": [
            {
                "id": "a1b2c3d4e5f6a7b8",
                "name": "Steel sheet 2mm",
                "code": "SH-2",
                "price": 1250.5,
                "uom": "sheet"
            },
            {
                "id": "ffeeddccbbaa99887766",
                "name": "Bolt M8"
            }
        ]
    })
}

#[tokio::test]
async fn import_creates_then_updates_materials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/entity/product"))
        .and(query_param("limit", "50"))
        .and(query_param("offset", "0"))
        .and(header("authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(products_page()))
        .expect(2)
        .mount(&server)
        .await;

    let app = app_against(&server).await;
    let catalog = &app.state.services.catalog;

    let first = catalog.import_products().await.unwrap();
    assert_eq!(first.total, 2);
    assert_eq!(first.created, 2);
    assert_eq!(first.updated, 0);
    assert_eq!(first.errors, 0);

    let sheet = material_by_external_id(&app, "a1b2c3d4e5f6a7b8")
        .await
        .expect("sheet imported");
    assert_eq!(sheet.code, "SH-2");
    assert_eq!(sheet.unit, "sheet");
    assert_eq!(sheet.price, Some(dec!(1250.5)));
    assert_eq!(sheet.quantity, Some(dec!(0)));

    // no code upstream: the first ten characters of the id stand in
    let bolt = material_by_external_id(&app, "ffeeddccbbaa99887766")
        .await
        .expect("bolt imported");
    assert_eq!(bolt.code, "ffeeddccbb");
    assert_eq!(bolt.price, Some(dec!(0)));

    let second = catalog.import_products().await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 2);
}

#[tokio::test]
async fn stock_sync_updates_matched_materials_and_reports_the_rest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/entity/product"))
        .respond_with(ResponseTemplate::new(200).set_body_json(products_page()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/report/stock/all"))
        .and(header("authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [
                { "id": "a1b2c3d4e5f6a7b8", "name": "Steel sheet 2mm", "stock": 42 },
                { "id": "unknown-id", "name": "Ghost", "stock": 3 }
            ]
        })))
        .mount(&server)
        .await;

    let app = app_against(&server).await;
    let catalog = &app.state.services.catalog;
    catalog.import_products().await.unwrap();

    let result = catalog.sync_stock().await.unwrap();
    assert_eq!(result.total, 2);
    assert_eq!(result.updated, 1);
    assert_eq!(result.errors, 1);
    assert_eq!(
        result.details,
        vec!["Material with external ID unknown-id not found".to_string()]
    );

    let sheet = material_by_external_id(&app, "a1b2c3d4e5f6a7b8")
        .await
        .unwrap();
    assert_eq!(sheet.quantity, Some(dec!(42)));
}

#[tokio::test]
async fn upstream_failure_is_an_external_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/entity/product"))
        .respond_with(ResponseTemplate::new(500).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let app = app_against(&server).await;
    let result = app.state.services.catalog.import_products().await;
    assert_matches!(result, Err(ServiceError::ExternalServiceError(msg)) if msg.contains("500"));

    let response = app
        .as_admin(Method::POST, "/api/v1/catalog/import/products", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "external_service_error");
}

#[tokio::test]
async fn catalog_endpoints_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/entity/organization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rows": [] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/entity/product"))
        .and(query_param("limit", "1"))
        .and(query_param("offset", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [{ "id": "p1", "name": "Paint", "code": "PNT" }]
        })))
        .mount(&server)
        .await;

    let app = app_against(&server).await;

    let response = app
        .as_admin(Method::GET, "/api/v1/catalog/check-connection", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["connected"], true);

    let response = app
        .as_worker(Method::GET, "/api/v1/catalog/products?limit=1&offset=5", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let products = body_json(response).await;
    assert_eq!(products[0]["id"], "p1");
    assert_eq!(products[0]["code"], "PNT");
    assert_eq!(products[0]["unit"], material::DEFAULT_UNIT);

    let response = app
        .as_worker(Method::POST, "/api/v1/catalog/sync/stock", None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unconfigured_catalog_reports_bad_gateway() {
    let app = TestApp::new().await;

    assert_matches!(
        app.state.services.catalog.check_connection().await,
        Err(ServiceError::ExternalServiceError(_))
    );
    let response = app
        .as_admin(Method::GET, "/api/v1/catalog/check-connection", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
