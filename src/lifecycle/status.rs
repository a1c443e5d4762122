use crate::entities::order::{OperationStatus, OrderOperation, OrderStatus};
use crate::errors::ServiceError;
use chrono::{DateTime, Utc};

/// Order-level state touched by the roll-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderProgress {
    pub status: OrderStatus,
    pub end_date: Option<DateTime<Utc>>,
}

/// Maps a completed count onto an operation status.
pub fn operation_status(completed: i32, quantity: i32) -> Result<OperationStatus, ServiceError> {
    if completed < 0 {
        return Err(ServiceError::ValidationError(
            "Completed quantity cannot be negative".to_string(),
        ));
    }
    if completed > quantity {
        return Err(ServiceError::ValidationError(format!(
            "Completed quantity cannot exceed the operation quantity ({})",
            quantity
        )));
    }

    Ok(if completed == 0 {
        OperationStatus::Pending
    } else if completed < quantity {
        OperationStatus::InProgress
    } else {
        OperationStatus::Completed
    })
}

/// Records progress on a single operation line. The line is untouched on error.
pub fn apply_completion(
    operation: &mut OrderOperation,
    completed: i32,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let status = operation_status(completed, operation.quantity)?;

    operation.completed_quantity = completed;
    operation.status = status;
    operation.completion_date = match status {
        OperationStatus::Completed => Some(now),
        OperationStatus::Pending | OperationStatus::InProgress => None,
    };
    Ok(())
}

/// Derives the order status from its operations.
///
/// Rules, first match wins:
/// 1. every operation completed and the order is not: completed, `end_date = now`
/// 2. some operation unfinished and the order is completed: back to in progress, `end_date` cleared
/// 3. order still `created` and some operation has progress: in progress
///
/// An order never returns to `created`. Applying the function to its own
/// output with the same operations yields the same value.
pub fn roll_up(
    current: OrderProgress,
    operations: &[OrderOperation],
    now: DateTime<Utc>,
) -> OrderProgress {
    let all_completed = operations
        .iter()
        .all(|op| op.status == OperationStatus::Completed);

    if all_completed && current.status != OrderStatus::Completed {
        OrderProgress {
            status: OrderStatus::Completed,
            end_date: Some(now),
        }
    } else if !all_completed && current.status == OrderStatus::Completed {
        OrderProgress {
            status: OrderStatus::InProgress,
            end_date: None,
        }
    } else if current.status == OrderStatus::Created
        && operations
            .iter()
            .any(|op| op.status != OperationStatus::Pending)
    {
        OrderProgress {
            status: OrderStatus::InProgress,
            end_date: current.end_date,
        }
    } else {
        current
    }
}
