use crate::entities::order::{OrderMaterial, OrderOperation};
use crate::entities::tech_process;
use crate::errors::ServiceError;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

/// Catalog data needed to expand a tech process: default rates and material units.
#[derive(Debug, Default, Clone)]
pub struct CatalogSnapshot {
    pub operation_rates: HashMap<Uuid, Decimal>,
    pub material_units: HashMap<Uuid, String>,
}

/// Operation lines for an order of `quantity` units, in step order, at catalog default rates.
pub fn derive_operations(
    process: &tech_process::Model,
    quantity: i32,
    catalog: &CatalogSnapshot,
) -> Result<Vec<OrderOperation>, ServiceError> {
    process
        .operations
        .0
        .iter()
        .map(|step| {
            let rate = catalog
                .operation_rates
                .get(&step.operation_id)
                .copied()
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Operation {} not found", step.operation_id))
                })?;
            Ok(OrderOperation::new(step.operation_id, quantity, rate))
        })
        .collect()
}

/// Material needs for an order of `quantity` units, in the units of the material records.
pub fn derive_materials(
    process: &tech_process::Model,
    quantity: i32,
    catalog: &CatalogSnapshot,
) -> Result<Vec<OrderMaterial>, ServiceError> {
    process
        .materials
        .0
        .iter()
        .map(|item| {
            let unit = catalog
                .material_units
                .get(&item.material_id)
                .cloned()
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Material {} not found", item.material_id))
                })?;
            Ok(OrderMaterial {
                material_id: item.material_id,
                quantity: Decimal::from(quantity) * item.quantity_per_unit,
                unit,
            })
        })
        .collect()
}
