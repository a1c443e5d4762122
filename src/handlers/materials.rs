use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use super::common::{created_response, no_content_response, success_response};
use crate::{
    errors::ApiError,
    services::materials::{CreateMaterialInput, SetStockInput, UpdateMaterialInput},
    AppState,
};

pub async fn list_materials(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let materials = state.services.materials.list_materials().await?;
    Ok(success_response(materials))
}

pub async fn get_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let material = state.services.materials.get_material(id).await?;
    Ok(success_response(material))
}

pub async fn create_material(
    State(state): State<AppState>,
    Json(payload): Json<CreateMaterialInput>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.services.materials.create_material(payload).await?;
    Ok(created_response(created))
}

pub async fn update_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateMaterialInput>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.services.materials.update_material(id, payload).await?;
    Ok(success_response(updated))
}

pub async fn set_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetStockInput>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.services.materials.set_stock(id, payload).await?;
    Ok(success_response(updated))
}

pub async fn delete_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.materials.delete_material(id).await?;
    Ok(no_content_response())
}
