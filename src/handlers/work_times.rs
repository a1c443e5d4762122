use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use super::common::{actor, created_response, no_content_response, success_response};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::work_time::{CreateWorkTimeInput, UpdateWorkTimeInput, WorkTimeFilter},
    AppState,
};

pub async fn list_entries(
    State(state): State<AppState>,
    Query(filter): Query<WorkTimeFilter>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .services
        .work_time
        .list_entries(actor(&user), filter)
        .await?;
    Ok(success_response(entries))
}

pub async fn create_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateWorkTimeInput>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .services
        .work_time
        .create_entry(actor(&user), payload)
        .await?;
    Ok(created_response(created))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.services.work_time.get_entry(actor(&user), id).await?;
    Ok(success_response(entry))
}

pub async fn update_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
    Json(payload): Json<UpdateWorkTimeInput>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .services
        .work_time
        .update_entry(actor(&user), id, payload)
        .await?;
    Ok(success_response(updated))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .work_time
        .delete_entry(actor(&user), id)
        .await?;
    Ok(no_content_response())
}

pub async fn approve_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .services
        .work_time
        .approve_entry(actor(&user), id)
        .await?;
    Ok(success_response(entry))
}

pub async fn unapprove_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .services
        .work_time
        .unapprove_entry(actor(&user), id)
        .await?;
    Ok(success_response(entry))
}
