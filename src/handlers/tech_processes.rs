use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use super::common::{created_response, no_content_response, success_response};
use crate::{
    errors::ApiError,
    services::tech_processes::{CreateTechProcessInput, UpdateTechProcessInput},
    AppState,
};

pub async fn list_tech_processes(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let processes = state.services.tech_processes.list_tech_processes().await?;
    Ok(success_response(processes))
}

pub async fn get_tech_process(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let process = state.services.tech_processes.get_tech_process(id).await?;
    Ok(success_response(process))
}

pub async fn get_by_article_number(
    State(state): State<AppState>,
    Path(article_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let process = state
        .services
        .tech_processes
        .get_by_article_number(&article_number)
        .await?;
    Ok(success_response(process))
}

pub async fn create_tech_process(
    State(state): State<AppState>,
    Json(payload): Json<CreateTechProcessInput>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .services
        .tech_processes
        .create_tech_process(payload)
        .await?;
    Ok(created_response(created))
}

pub async fn update_tech_process(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTechProcessInput>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .services
        .tech_processes
        .update_tech_process(id, payload)
        .await?;
    Ok(success_response(updated))
}

pub async fn delete_tech_process(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.tech_processes.delete_tech_process(id).await?;
    Ok(no_content_response())
}
