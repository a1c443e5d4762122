use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use super::common::{actor, created_response, no_content_response, success_response};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::orders::{
        AssignOperationInput, BranchOrderInput, CreateOrderInput, OperationProgressInput,
        OrderFilter, UpdateOrderInput,
    },
    AppState,
};

/// Workers only get orders they have an operation assigned in
pub async fn list_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state.services.orders.list_orders(actor(&user), filter).await?;
    Ok(success_response(orders))
}

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .services
        .orders
        .create_order(actor(&user), payload)
        .await?;
    Ok(created_response(created))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let order = state.services.orders.get_order(actor(&user), id).await?;
    Ok(success_response(order))
}

pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
    Json(payload): Json<UpdateOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .services
        .orders
        .update_order(actor(&user), id, payload)
        .await?;
    Ok(success_response(updated))
}

pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    state.services.orders.delete_order(actor(&user), id).await?;
    Ok(no_content_response())
}

/// Splits part of the order's quantity into a child order
pub async fn branch_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    user: AuthUser,
    Json(payload): Json<BranchOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let child = state
        .services
        .orders
        .branch_order(actor(&user), id, payload)
        .await?;
    Ok(created_response(child))
}

pub async fn update_operation(
    State(state): State<AppState>,
    Path((id, operation_id)): Path<(Uuid, Uuid)>,
    user: AuthUser,
    Json(payload): Json<OperationProgressInput>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .update_operation_progress(actor(&user), id, operation_id, payload)
        .await?;
    Ok(success_response(order))
}

pub async fn assign_operation(
    State(state): State<AppState>,
    Path((id, operation_id)): Path<(Uuid, Uuid)>,
    user: AuthUser,
    Json(payload): Json<AssignOperationInput>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .assign_operation(actor(&user), id, operation_id, payload)
        .await?;
    Ok(success_response(order))
}
