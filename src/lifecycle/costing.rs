use crate::entities::order::{self, OperationStatus, OrderMaterial, OrderOperation, OrderStatus};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Totals for the order report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatistics {
    pub total_orders: usize,
    pub completed_orders: usize,
    pub in_progress_orders: usize,
    pub cancelled_orders: usize,
    pub total_quantity: i64,
    pub total_material_cost: Decimal,
    pub total_work_cost: Decimal,
    pub total_cost: Decimal,
}

/// Piecework earnings for one catalog operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceworkLine {
    pub operation_id: Uuid,
    pub operation_name: String,
    pub quantity: i64,
    pub rate: Decimal,
    pub total: Decimal,
}

/// Material cost; materials without a known price count as zero.
pub fn material_cost(materials: &[OrderMaterial], prices: &HashMap<Uuid, Decimal>) -> Decimal {
    materials
        .iter()
        .filter_map(|m| prices.get(&m.material_id).map(|price| m.quantity * price))
        .sum()
}

/// Labor cost of completed operations only.
pub fn work_cost(operations: &[OrderOperation]) -> Decimal {
    operations
        .iter()
        .filter(|op| op.status == OperationStatus::Completed)
        .map(OrderOperation::earned)
        .sum()
}

/// Percentage of finished units, rounded half away from zero.
/// Completed orders report 100 and cancelled ones 0 regardless of their operations.
pub fn completion_percentage(order: &order::Model) -> u32 {
    match order.status {
        OrderStatus::Completed => return 100,
        OrderStatus::Cancelled => return 0,
        OrderStatus::Created | OrderStatus::InProgress => {}
    }

    let ops = &order.operations.0;
    let total: i64 = ops.iter().map(|op| i64::from(op.quantity)).sum();
    if ops.is_empty() || total <= 0 {
        return 0;
    }
    let done: i64 = ops.iter().map(|op| i64::from(op.completed_quantity)).sum();

    (Decimal::from(done) * Decimal::ONE_HUNDRED / Decimal::from(total))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(0)
}

pub fn order_statistics(
    orders: &[order::Model],
    prices: &HashMap<Uuid, Decimal>,
) -> OrderStatistics {
    let mut stats = OrderStatistics {
        total_orders: orders.len(),
        ..Default::default()
    };

    for order in orders {
        match order.status {
            OrderStatus::Completed => stats.completed_orders += 1,
            OrderStatus::InProgress => stats.in_progress_orders += 1,
            OrderStatus::Cancelled => stats.cancelled_orders += 1,
            OrderStatus::Created => {}
        }
        stats.total_quantity += i64::from(order.quantity);
        stats.total_material_cost += material_cost(&order.materials.0, prices);
        stats.total_work_cost += work_cost(&order.operations.0);
    }

    stats.total_cost = stats.total_material_cost + stats.total_work_cost;
    stats
}

/// Completed operations of `user_id` finished within `[start, end]` (whole days, inclusive),
/// grouped by catalog operation in first-seen order. The line rate is the first one seen.
pub fn piecework_lines(
    orders: &[order::Model],
    user_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
    operation_names: &HashMap<Uuid, String>,
) -> Vec<PieceworkLine> {
    let mut lines: Vec<PieceworkLine> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    let earned = orders
        .iter()
        .flat_map(|o| o.operations.0.iter())
        .filter(|op| op.assigned_to == Some(user_id) && op.status == OperationStatus::Completed)
        .filter(|op| {
            op.completion_date
                .map(|d| {
                    let day = d.date_naive();
                    day >= start && day <= end
                })
                .unwrap_or(false)
        });

    for op in earned {
        let slot = *index.entry(op.operation_id).or_insert_with(|| {
            lines.push(PieceworkLine {
                operation_id: op.operation_id,
                operation_name: operation_names
                    .get(&op.operation_id)
                    .cloned()
                    .unwrap_or_default(),
                quantity: 0,
                rate: op.rate,
                total: Decimal::ZERO,
            });
            lines.len() - 1
        });
        let line = &mut lines[slot];
        line.quantity += i64::from(op.completed_quantity);
        line.total += op.earned();
    }

    lines
}
