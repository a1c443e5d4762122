use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use futures::try_join;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    auth::Actor,
    entities::{
        material::{self, Entity as MaterialEntity},
        operation::{self, Entity as OperationEntity},
        order::{self, Entity as OrderEntity, OrderStatus},
        user::Entity as UserEntity,
        work_time::{self, Entity as WorkTimeEntity},
    },
    errors::ServiceError,
    lifecycle::{
        completion_percentage, order_statistics, piecework_lines, OrderStatistics, PieceworkLine,
    },
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryReportQuery {
    /// Defaults to the caller
    pub user_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReportQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ReportPeriod {
    fn from_bounds(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, ServiceError> {
        match (start, end) {
            (Some(start_date), Some(end_date)) if start_date <= end_date => Ok(Self {
                start_date,
                end_date,
            }),
            (Some(_), Some(_)) => Err(ServiceError::ValidationError(
                "startDate must not be after endDate".to_string(),
            )),
            _ => Err(ServiceError::ValidationError(
                "Both startDate and endDate are required".to_string(),
            )),
        }
    }

    fn starts_at(&self) -> DateTime<Utc> {
        self.start_date.and_time(NaiveTime::MIN).and_utc()
    }

    /// First instant after the period
    fn ends_before(&self) -> DateTime<Utc> {
        self.end_date.and_time(NaiveTime::MIN).and_utc() + Duration::days(1)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkTimeLine {
    pub date: NaiveDate,
    pub hours: Decimal,
    pub rate: Decimal,
    pub total: Decimal,
    pub description: String,
    pub order_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryReport {
    pub user_id: Uuid,
    pub user_name: String,
    pub period: ReportPeriod,
    pub piecework_salary: Decimal,
    pub hourly_salary: Decimal,
    pub total_salary: Decimal,
    pub operations: Vec<PieceworkLine>,
    pub work_time: Vec<WorkTimeLine>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReportRow {
    pub id: Uuid,
    pub order_number: String,
    pub article_number: String,
    pub quantity: i32,
    pub status: OrderStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub completion_percentage: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReport {
    pub period: ReportPeriod,
    pub statistics: OrderStatistics,
    pub orders: Vec<OrderReportRow>,
}

/// Read-only aggregations over orders and work time
#[derive(Clone)]
pub struct ReportService {
    db: Arc<DatabaseConnection>,
}

impl ReportService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Piecework plus approved hourly pay of one worker over `[startDate, endDate]`.
    #[instrument(skip(self), err)]
    pub async fn salary_report(
        &self,
        actor: Actor,
        query: SalaryReportQuery,
    ) -> Result<SalaryReport, ServiceError> {
        let period = ReportPeriod::from_bounds(query.start_date, query.end_date)?;
        let user_id = query.user_id.unwrap_or(actor.user_id);
        actor.require_self_or_admin(user_id)?;

        let db = &*self.db;
        let user = UserEntity::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;

        // Operations finish after their order starts, so later orders cannot contribute.
        let orders = OrderEntity::find()
            .filter(order::Column::StartDate.lt(period.ends_before()))
            .all(db)
            .await
            .map_err(|e| {
                error!("Failed to load orders for salary report: {}", e);
                ServiceError::db_error(e)
            })?;

        let operation_ids: Vec<Uuid> = orders
            .iter()
            .flat_map(|o| o.operations.0.iter())
            .filter(|op| op.assigned_to == Some(user_id))
            .map(|op| op.operation_id)
            .collect();
        let operation_rows = OperationEntity::find()
            .filter(operation::Column::Id.is_in(operation_ids))
            .all(db);
        let approved_entries = WorkTimeEntity::find()
            .filter(work_time::Column::UserId.eq(user_id))
            .filter(work_time::Column::Date.gte(period.start_date))
            .filter(work_time::Column::Date.lte(period.end_date))
            .filter(work_time::Column::Approved.eq(true))
            .order_by_asc(work_time::Column::Date)
            .all(db);
        let (operation_rows, entries) = try_join!(operation_rows, approved_entries)?;

        let names: HashMap<Uuid, String> = operation_rows
            .into_iter()
            .map(|op| (op.id, op.name))
            .collect();
        let operations =
            piecework_lines(&orders, user_id, period.start_date, period.end_date, &names);
        let piecework_salary: Decimal = operations.iter().map(|line| line.total).sum();

        let linked_orders: Vec<Uuid> = entries.iter().filter_map(|e| e.order_id).collect();
        let order_numbers: HashMap<Uuid, String> = OrderEntity::find()
            .filter(order::Column::Id.is_in(linked_orders))
            .all(db)
            .await?
            .into_iter()
            .map(|o| (o.id, o.order_number))
            .collect();
        let work_time: Vec<WorkTimeLine> = entries
            .iter()
            .map(|entry| WorkTimeLine {
                date: entry.date,
                hours: entry.hours,
                rate: entry.hourly_rate,
                total: entry.total(),
                description: entry.description.clone(),
                order_number: entry
                    .order_id
                    .and_then(|id| order_numbers.get(&id).cloned()),
            })
            .collect();
        let hourly_salary: Decimal = work_time.iter().map(|line| line.total).sum();

        info!(
            %user_id,
            %piecework_salary,
            %hourly_salary,
            "Salary report generated"
        );

        Ok(SalaryReport {
            user_id,
            user_name: user.full_name,
            period,
            piecework_salary,
            hourly_salary,
            total_salary: piecework_salary + hourly_salary,
            operations,
            work_time,
        })
    }

    /// Admin-only summary of orders started within the period.
    #[instrument(skip(self), err)]
    pub async fn order_report(
        &self,
        actor: Actor,
        query: OrderReportQuery,
    ) -> Result<OrderReport, ServiceError> {
        actor.require_admin()?;
        let period = ReportPeriod::from_bounds(query.start_date, query.end_date)?;
        let db = &*self.db;

        let mut select = OrderEntity::find()
            .filter(order::Column::StartDate.gte(period.starts_at()))
            .filter(order::Column::StartDate.lt(period.ends_before()));
        if let Some(status) = query.status {
            select = select.filter(order::Column::Status.eq(status));
        }
        let orders = select
            .order_by_desc(order::Column::StartDate)
            .all(db)
            .await
            .map_err(|e| {
                error!("Failed to load orders for order report: {}", e);
                ServiceError::db_error(e)
            })?;

        // Materials deleted since the order was created simply have no price.
        let material_ids: Vec<Uuid> = orders
            .iter()
            .flat_map(|o| o.materials.0.iter())
            .map(|m| m.material_id)
            .collect();
        let prices: HashMap<Uuid, Decimal> = MaterialEntity::find()
            .filter(material::Column::Id.is_in(material_ids))
            .all(db)
            .await?
            .into_iter()
            .filter_map(|m| m.price.map(|price| (m.id, price)))
            .collect();

        let statistics = order_statistics(&orders, &prices);
        let rows = orders
            .iter()
            .map(|o| OrderReportRow {
                id: o.id,
                order_number: o.order_number.clone(),
                article_number: o.article_number.clone(),
                quantity: o.quantity,
                status: o.status,
                start_date: o.start_date,
                end_date: o.end_date,
                completion_percentage: completion_percentage(o),
            })
            .collect();

        info!(
            total_orders = statistics.total_orders,
            total_cost = %statistics.total_cost,
            "Order report generated"
        );

        Ok(OrderReport {
            period,
            statistics,
            orders: rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn period_requires_both_bounds() {
        assert_matches!(
            ReportPeriod::from_bounds(Some(day(1)), None),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            ReportPeriod::from_bounds(None, None),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn reversed_period_is_rejected() {
        assert_matches!(
            ReportPeriod::from_bounds(Some(day(10)), Some(day(1))),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn period_covers_whole_end_day() {
        let period = ReportPeriod::from_bounds(Some(day(1)), Some(day(1))).unwrap();
        assert_eq!(period.ends_before() - period.starts_at(), Duration::days(1));
    }
}
