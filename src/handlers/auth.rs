use axum::{
    extract::{Json, State},
    response::IntoResponse,
};
use tracing::info;

use super::common::{actor, created_response, success_response};
use crate::{
    auth::{AuthError, AuthUser, LoginCredentials},
    errors::ApiError,
    services::users::CreateUserInput,
    AppState,
};

/// Exchanges username and password for a bearer token
pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<LoginCredentials>,
) -> Result<impl IntoResponse, AuthError> {
    let response = state.auth.login(&credentials).await?;
    info!(user_id = %response.user.id, "User logged in");
    Ok(success_response(response))
}

/// Admin-only account registration
pub async fn register(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.services.users.create_user(actor(&user), payload).await?;
    Ok(created_response(created))
}

/// Profile of the authenticated caller
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .services
        .users
        .get_user(actor(&user), user.user_id)
        .await?;
    Ok(success_response(profile))
}
