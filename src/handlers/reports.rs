use axum::{
    extract::{Query, State},
    response::IntoResponse,
};

use super::common::{actor, success_response};
use crate::{
    auth::AuthUser,
    errors::ApiError,
    services::reports::{OrderReportQuery, SalaryReportQuery},
    AppState,
};

/// `GET /reports/salary?userId&startDate&endDate`
pub async fn salary_report(
    State(state): State<AppState>,
    Query(query): Query<SalaryReportQuery>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .services
        .reports
        .salary_report(actor(&user), query)
        .await?;
    Ok(success_response(report))
}

/// `GET /reports/orders?startDate&endDate&status`
pub async fn order_report(
    State(state): State<AppState>,
    Query(query): Query<OrderReportQuery>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .services
        .reports
        .order_report(actor(&user), query)
        .await?;
    Ok(success_response(report))
}
