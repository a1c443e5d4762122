use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use super::common::{actor, created_response, no_content_response, success_response};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::users::{ChangePasswordInput, CreateUserInput, UpdateUserInput},
    AppState,
};

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.services.users.list_users(actor(&user)).await?;
    Ok(success_response(users))
}

pub async fn create_user(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.services.users.create_user(actor(&user), payload).await?;
    Ok(created_response(created))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let found = state.services.users.get_user(actor(&user), id).await?;
    Ok(success_response(found))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
    Json(payload): Json<UpdateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .services
        .users
        .update_user(actor(&user), id, payload)
        .await?;
    Ok(success_response(updated))
}

pub async fn change_password(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordInput>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .users
        .change_password(actor(&user), id, payload)
        .await?;
    Ok(no_content_response())
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    state.services.users.delete_user(actor(&user), id).await?;
    Ok(no_content_response())
}
