use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use super::common::{created_response, no_content_response, success_response};
use crate::{
    errors::ApiError,
    services::operations::{CreateOperationInput, UpdateOperationInput, UpsertUserRateInput},
    AppState,
};

pub async fn list_operations(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let operations = state.services.operations.list_operations().await?;
    Ok(success_response(operations))
}

pub async fn get_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let operation = state.services.operations.get_operation(id).await?;
    Ok(success_response(operation))
}

pub async fn create_operation(
    State(state): State<AppState>,
    Json(payload): Json<CreateOperationInput>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.services.operations.create_operation(payload).await?;
    Ok(created_response(created))
}

pub async fn update_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOperationInput>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.services.operations.update_operation(id, payload).await?;
    Ok(success_response(updated))
}

/// Also removes every user rate attached to the operation
pub async fn delete_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.operations.delete_operation(id).await?;
    Ok(no_content_response())
}

pub async fn list_user_rates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let rates = state.services.operations.list_user_rates(id).await?;
    Ok(success_response(rates))
}

pub async fn upsert_user_rate(
    State(state): State<AppState>,
    Json(payload): Json<UpsertUserRateInput>,
) -> Result<impl IntoResponse, ApiError> {
    let rate = state.services.operations.upsert_user_rate(payload).await?;
    Ok(success_response(rate))
}

pub async fn delete_user_rate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.operations.delete_user_rate(id).await?;
    Ok(no_content_response())
}
