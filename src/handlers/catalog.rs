use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use super::common::success_response;
use crate::{errors::ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ProductsQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn check_connection(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.services.catalog.check_connection().await?;
    Ok(success_response(json!({ "connected": true })))
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .list_products(query.limit, query.offset)
        .await?;
    Ok(success_response(products))
}

pub async fn import_products(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let result = state.services.catalog.import_products().await?;
    Ok(success_response(result))
}

pub async fn sync_stock(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let result = state.services.catalog.sync_stock().await?;
    Ok(success_response(result))
}
