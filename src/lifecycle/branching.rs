use crate::entities::order::{self, OrderMaterial, OrderOperation};
use crate::errors::ServiceError;
use rust_decimal::Decimal;

/// Operations and materials of a child order about to be split off.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchPlan {
    pub quantity: i32,
    pub operations: Vec<OrderOperation>,
    pub materials: Vec<OrderMaterial>,
}

/// Quantity not yet handed to child orders.
pub fn available_capacity(parent: &order::Model) -> i32 {
    parent.quantity - parent.branched_quantity()
}

/// Per-unit share of the parent's requirement times the branch size.
///
/// Divides by the parent's full quantity, not by what is left after earlier branches.
pub fn scale_material_quantity(
    parent_material_quantity: Decimal,
    parent_quantity: i32,
    branch_quantity: i32,
) -> Decimal {
    if parent_quantity <= 0 {
        return Decimal::ZERO;
    }
    parent_material_quantity / Decimal::from(parent_quantity) * Decimal::from(branch_quantity)
}

/// Builds the child order's contents. Fails without side effects when the
/// parent does not have `quantity` units left.
pub fn plan_branch(parent: &order::Model, quantity: i32) -> Result<BranchPlan, ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Branch quantity must be greater than zero".to_string(),
        ));
    }

    let available = available_capacity(parent);
    if quantity > available {
        return Err(ServiceError::CapacityExceeded {
            requested: quantity,
            available,
        });
    }

    let operations = parent
        .operations
        .0
        .iter()
        .map(|op| OrderOperation::new(op.operation_id, quantity, op.rate))
        .collect();

    let materials = parent
        .materials
        .0
        .iter()
        .map(|mat| OrderMaterial {
            material_id: mat.material_id,
            quantity: scale_material_quantity(mat.quantity, parent.quantity, quantity),
            unit: mat.unit.clone(),
        })
        .collect();

    Ok(BranchPlan {
        quantity,
        operations,
        materials,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::{
        ChildOrderLink, ChildOrderLinks, OperationStatus, OrderMaterials, OrderOperations,
        OrderStatus,
    };
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn parent(quantity: i32, children: &[i32]) -> order::Model {
        let now = Utc::now();
        let mut cut = OrderOperation::new(Uuid::new_v4(), quantity, dec!(100));
        cut.completed_quantity = 3;
        cut.status = OperationStatus::InProgress;
        cut.assigned_to = Some(Uuid::new_v4());

        order::Model {
            id: Uuid::new_v4(),
            order_number: "ORD1".into(),
            article_number: "TP1".into(),
            quantity,
            operations: OrderOperations(vec![cut]),
            materials: OrderMaterials(vec![OrderMaterial {
                material_id: Uuid::new_v4(),
                quantity: dec!(20),
                unit: "kg".into(),
            }]),
            status: OrderStatus::InProgress,
            start_date: now,
            end_date: None,
            comments: None,
            parent_order_id: None,
            child_orders: ChildOrderLinks(
                children
                    .iter()
                    .map(|&q| ChildOrderLink {
                        order_id: Uuid::new_v4(),
                        reason: "split".into(),
                        quantity: q,
                    })
                    .collect(),
            ),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn branch_scales_materials_and_resets_operations() {
        let plan = plan_branch(&parent(10, &[]), 4).unwrap();

        assert_eq!(plan.materials[0].quantity, dec!(8));
        assert_eq!(plan.materials[0].unit, "kg");

        let op = &plan.operations[0];
        assert_eq!(op.quantity, 4);
        assert_eq!(op.completed_quantity, 0);
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.rate, dec!(100));
        assert_eq!(op.assigned_to, None);
    }

    #[test]
    fn scaling_uses_full_parent_quantity_after_earlier_branches() {
        let plan = plan_branch(&parent(10, &[4]), 6).unwrap();
        assert_eq!(plan.materials[0].quantity, dec!(12));
    }

    #[test]
    fn capacity_exceeded_reports_remainder() {
        let result = plan_branch(&parent(10, &[4]), 7);
        assert_matches!(
            result,
            Err(ServiceError::CapacityExceeded {
                requested: 7,
                available: 6
            })
        );
    }

    #[test]
    fn exact_remainder_is_allowed() {
        let p = parent(10, &[4]);
        assert_eq!(available_capacity(&p), 6);
        assert!(plan_branch(&p, 6).is_ok());
    }

    #[test]
    fn zero_quantity_is_rejected() {
        assert_matches!(
            plan_branch(&parent(10, &[]), 0),
            Err(ServiceError::ValidationError(_))
        );
    }
}
