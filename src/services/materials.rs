use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{map_write_error, validate_non_negative};
use crate::{
    entities::material::{self, Entity as MaterialEntity, DEFAULT_UNIT},
    errors::ServiceError,
};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMaterialInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub code: String,
    pub unit: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_non_negative")]
    pub price: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub quantity: Option<Decimal>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMaterialInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub code: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_non_negative")]
    pub price: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub quantity: Option<Decimal>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SetStockInput {
    #[validate(custom = "validate_non_negative")]
    pub quantity: Decimal,
}

#[derive(Clone)]
pub struct MaterialService {
    db: Arc<DatabaseConnection>,
}

impl MaterialService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_materials(&self) -> Result<Vec<material::Model>, ServiceError> {
        MaterialEntity::find()
            .order_by_asc(material::Column::Name)
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to list materials: {}", e);
                ServiceError::db_error(e)
            })
    }

    #[instrument(skip(self))]
    pub async fn get_material(&self, id: Uuid) -> Result<material::Model, ServiceError> {
        MaterialEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Material {} not found", id)))
    }

    #[instrument(skip(self, input), fields(code = %input.code), err)]
    pub async fn create_material(
        &self,
        input: CreateMaterialInput,
    ) -> Result<material::Model, ServiceError> {
        input.validate()?;
        self.ensure_code_free(&input.code, None).await?;

        let code = input.code.clone();
        let created = material::ActiveModel {
            name: Set(input.name),
            code: Set(input.code),
            unit: Set(input.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string())),
            description: Set(input.description),
            price: Set(input.price),
            quantity: Set(input.quantity),
            external_id: Set(input.external_id),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| map_write_error(e, || format!("Material code '{}' already exists", code)))?;

        info!(material_id = %created.id, code = %created.code, "Material created");
        Ok(created)
    }

    #[instrument(skip(self, input), err)]
    pub async fn update_material(
        &self,
        id: Uuid,
        input: UpdateMaterialInput,
    ) -> Result<material::Model, ServiceError> {
        input.validate()?;

        let existing = self.get_material(id).await?;
        if let Some(code) = &input.code {
            if *code != existing.code {
                self.ensure_code_free(code, Some(id)).await?;
            }
        }

        let mut active = existing.into_active_model();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(code) = input.code {
            active.code = Set(code);
        }
        if let Some(unit) = input.unit {
            active.unit = Set(unit);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = input.price {
            active.price = Set(Some(price));
        }
        if let Some(quantity) = input.quantity {
            active.quantity = Set(Some(quantity));
        }
        if let Some(external_id) = input.external_id {
            active.external_id = Set(Some(external_id));
        }

        let updated = active
            .update(&*self.db)
            .await
            .map_err(|e| map_write_error(e, || "Material code already exists".to_string()))?;

        info!(material_id = %id, "Material updated");
        Ok(updated)
    }

    #[instrument(skip(self), err)]
    pub async fn set_stock(
        &self,
        id: Uuid,
        input: SetStockInput,
    ) -> Result<material::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_material(id).await?;
        let previous = existing.quantity;

        let mut active = existing.into_active_model();
        active.quantity = Set(Some(input.quantity));
        let updated = active.update(&*self.db).await?;

        info!(material_id = %id, ?previous, quantity = %input.quantity, "Stock updated");
        Ok(updated)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_material(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = MaterialEntity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Material {} not found", id)));
        }
        info!(material_id = %id, "Material deleted");
        Ok(())
    }

    async fn ensure_code_free(&self, code: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = MaterialEntity::find().filter(material::Column::Code.eq(code));
        if let Some(id) = except {
            query = query.filter(material::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Material code '{}' already exists",
                code
            )));
        }
        Ok(())
    }
}

/// Loads the referenced materials, failing with `NotFound` on the first unknown id.
pub(crate) async fn load_materials<C: ConnectionTrait>(
    conn: &C,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, material::Model>, ServiceError> {
    let mut wanted: Vec<Uuid> = ids.into_iter().collect();
    wanted.sort_unstable();
    wanted.dedup();
    if wanted.is_empty() {
        return Ok(HashMap::new());
    }

    let found: HashMap<Uuid, material::Model> = MaterialEntity::find()
        .filter(material::Column::Id.is_in(wanted.clone()))
        .all(conn)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();

    match wanted.iter().find(|id| !found.contains_key(id)) {
        Some(missing) => Err(ServiceError::NotFound(format!(
            "Material {} not found",
            missing
        ))),
        None => Ok(found),
    }
}
